//! Input-shape descriptors for capability parameters.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

const MAX_PARAM_NAME_LEN: usize = 64;

/// JSON value kind accepted by a parameter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// UTF-8 string.
    String,
    /// Any JSON number.
    Number,
    /// Whole JSON number.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ParamKind {
    /// Returns the JSON-Schema type name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Returns `true` when `value` is of this kind.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl Display for ParamKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared parameter of a capability.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ParamSpec {
    /// Declares a parameter that callers must supply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParam`] if the name is empty or too long.
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Result<Self> {
        Self::new(name.into(), kind, true)
    }

    /// Declares a parameter that callers may omit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParam`] if the name is empty or too long.
    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Result<Self> {
        Self::new(name.into(), kind, false)
    }

    fn new(name: String, kind: ParamKind, required: bool) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::InvalidParam {
                name,
                reason: "name cannot be empty".into(),
            });
        }
        if name.len() > MAX_PARAM_NAME_LEN {
            return Err(Error::InvalidParam {
                name,
                reason: format!("name length must be <= {MAX_PARAM_NAME_LEN}"),
            });
        }
        Ok(Self {
            name,
            kind,
            required,
            description: None,
        })
    }

    /// Attaches a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the accepted value kind.
    #[must_use]
    pub const fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Returns `true` when callers must supply the parameter.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub(crate) fn schema(&self) -> Value {
        let mut property = Map::new();
        property.insert("type".into(), json!(self.kind.as_str()));
        if let Some(description) = &self.description {
            property.insert("description".into(), json!(description));
        }
        Value::Object(property)
    }

    pub(crate) fn check(&self, arguments: &Map<String, Value>) -> Result<()> {
        match arguments.get(&self.name) {
            None if self.required => Err(Error::invalid_arguments(format!(
                "missing required parameter `{}`",
                self.name
            ))),
            Some(Value::Null) if self.required => Err(Error::invalid_arguments(format!(
                "parameter `{}` cannot be null",
                self.name
            ))),
            None | Some(Value::Null) => Ok(()),
            Some(value) if self.kind.matches(value) => Ok(()),
            Some(_) => Err(Error::invalid_arguments(format!(
                "parameter `{}` must be of type {}",
                self.name, self.kind
            ))),
        }
    }
}
