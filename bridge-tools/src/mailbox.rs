//! File-backed mailbox capabilities: `email_list_inbox`, `email_read`,
//! `email_send`.
//!
//! The mailbox directory holds two JSON arrays, `inbox.json` and
//! `outbox.json`. A missing file reads as an empty mailbox.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bridge_primitives::{
    CapabilityDescriptor, CapabilityDescriptorBuilder, CapabilityName, ParamKind, ParamSpec,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::registry::{CapabilityError, CapabilityRegistry, CapabilityResult};

/// Registered name of the inbox listing capability.
pub const LIST_INBOX: &str = "email_list_inbox";
/// Registered name of the single-message capability.
pub const READ: &str = "email_read";
/// Registered name of the send capability.
pub const SEND: &str = "email_send";

const INBOX_FILE: &str = "inbox.json";
const OUTBOX_FILE: &str = "outbox.json";

/// One stored message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier.
    pub id: String,
    /// Sender address.
    #[serde(default)]
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Mailbox rooted at a directory.
#[derive(Debug)]
pub struct Mailbox {
    dir: PathBuf,
    sender: String,
    write_lock: Mutex<()>,
}

impl Mailbox {
    /// Opens the mailbox at `dir`, creating the directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Execution`] when the directory cannot be
    /// created.
    pub fn open(dir: impl Into<PathBuf>) -> CapabilityResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| {
            CapabilityError::execution(format!("cannot open mailbox {}: {err}", dir.display()))
        })?;
        Ok(Self {
            dir,
            sender: "agent@capbridge.local".to_owned(),
            write_lock: Mutex::new(()),
        })
    }

    /// Overrides the `from` address stamped on sent messages.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Returns the mailbox directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns up to `limit` inbox messages in file order.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Execution`] when the inbox cannot be read.
    pub fn list_inbox(&self, limit: Option<usize>) -> CapabilityResult<Vec<Message>> {
        let mut messages = self.load(INBOX_FILE)?;
        if let Some(limit) = limit {
            messages.truncate(limit);
        }
        Ok(messages)
    }

    /// Returns the inbox message with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Execution`] when no such message exists.
    pub fn read(&self, id: &str) -> CapabilityResult<Message> {
        self.load(INBOX_FILE)?
            .into_iter()
            .find(|message| message.id == id)
            .ok_or_else(|| CapabilityError::execution(format!("message `{id}` not found")))
    }

    /// Returns every sent message.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Execution`] when the outbox cannot be read.
    pub fn outbox(&self) -> CapabilityResult<Vec<Message>> {
        self.load(OUTBOX_FILE)
    }

    /// Appends a message to the outbox and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Execution`] when the outbox cannot be
    /// rewritten.
    pub fn send(&self, to: &str, subject: &str, body: &str) -> CapabilityResult<Message> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut outbox = self.load(OUTBOX_FILE)?;
        let message = Message {
            id: format!("out-{:04}", outbox.len() + 1),
            from: self.sender.clone(),
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        };
        outbox.push(message.clone());
        self.store(OUTBOX_FILE, &outbox)?;

        debug!(id = %message.id, to, "queued outbound message");
        Ok(message)
    }

    fn load(&self, file: &str) -> CapabilityResult<Vec<Message>> {
        let path = self.dir.join(file);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&path, &err)),
        };
        serde_json::from_slice(&raw).map_err(|err| {
            CapabilityError::execution(format!("malformed mailbox file {}: {err}", path.display()))
        })
    }

    // Readers see either the old or the new file, never a truncated one.
    fn store(&self, file: &str, messages: &[Message]) -> CapabilityResult<()> {
        let path = self.dir.join(file);
        let staging = self.dir.join(format!(".{file}.tmp"));
        let encoded = serde_json::to_vec_pretty(messages)
            .map_err(|err| CapabilityError::execution(err.to_string()))?;
        fs::write(&staging, encoded).map_err(|err| io_error(&staging, &err))?;
        fs::rename(&staging, &path).map_err(|err| io_error(&path, &err))
    }

    /// Registers the three mailbox capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Duplicate`] if any name is taken.
    pub fn register(mailbox: &Arc<Self>, registry: &CapabilityRegistry) -> CapabilityResult<()> {
        let descriptor = CapabilityDescriptor::builder(CapabilityName::new(LIST_INBOX)?)
            .description("List inbox messages")?
            .param(
                ParamSpec::optional("limit", ParamKind::Integer)?
                    .with_description("Maximum number of messages to return"),
            )
            .and_then(CapabilityDescriptorBuilder::build)?;
        let inbox = Arc::clone(mailbox);
        registry.register(
            descriptor,
            move |arguments: Value| -> CapabilityResult<Value> {
                let limit = match arguments.get("limit").and_then(Value::as_i64) {
                    Some(limit) if limit < 0 => {
                        return Err(CapabilityError::invalid_arguments(
                            "`limit` cannot be negative",
                        ));
                    }
                    Some(limit) => Some(usize::try_from(limit).unwrap_or(usize::MAX)),
                    None => None,
                };
                to_value(&inbox.list_inbox(limit)?)
            },
        )?;

        let descriptor = CapabilityDescriptor::builder(CapabilityName::new(READ)?)
            .description("Read one inbox message by id")?
            .param(ParamSpec::required("id", ParamKind::String)?)
            .and_then(CapabilityDescriptorBuilder::build)?;
        let reader = Arc::clone(mailbox);
        registry.register(
            descriptor,
            move |arguments: Value| -> CapabilityResult<Value> {
                let id = string_argument(&arguments, "id")?;
                to_value(&reader.read(id)?)
            },
        )?;

        let descriptor = CapabilityDescriptor::builder(CapabilityName::new(SEND)?)
            .description("Send a message through the outbox")?
            .param(ParamSpec::required("to", ParamKind::String)?)?
            .param(ParamSpec::required("subject", ParamKind::String)?)?
            .param(ParamSpec::required("body", ParamKind::String)?)
            .and_then(CapabilityDescriptorBuilder::build)?;
        let sender = Arc::clone(mailbox);
        registry.register(
            descriptor,
            move |arguments: Value| -> CapabilityResult<Value> {
                let message = sender.send(
                    string_argument(&arguments, "to")?,
                    string_argument(&arguments, "subject")?,
                    string_argument(&arguments, "body")?,
                )?;
                Ok(json!({ "id": message.id, "status": "sent" }))
            },
        )
    }
}

fn string_argument<'a>(arguments: &'a Value, name: &str) -> CapabilityResult<&'a str> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| CapabilityError::invalid_arguments(format!("`{name}` must be a string")))
}

fn to_value<T: Serialize>(value: &T) -> CapabilityResult<Value> {
    serde_json::to_value(value).map_err(|err| CapabilityError::execution(err.to_string()))
}

fn io_error(path: &Path, err: &std::io::Error) -> CapabilityError {
    CapabilityError::execution(format!("mailbox i/o on {}: {err}", path.display()))
}
