//! Capability names and descriptors shared by both transports.

use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::params::ParamSpec;

const MAX_NAME_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 1024;

/// Name under which a capability is registered and invoked.
///
/// Names are stable across the sandbox boundary and the tool-call protocol, so
/// they are restricted to a conservative character set.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityName(String);

impl CapabilityName {
    /// Creates a capability name after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if the supplied name is empty, too long,
    /// does not start with a lowercase letter, or contains unsupported
    /// characters.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CapabilityName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CapabilityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CapabilityName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for CapabilityName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for CapabilityName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CapabilityName> for String {
    fn from(value: CapabilityName) -> Self {
        value.0
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: String::new(),
            reason: "name cannot be empty".into(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName {
            name: name.into(),
            reason: format!("name length must be <= {MAX_NAME_LEN}"),
        });
    }

    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(Error::InvalidName {
            name: name.into(),
            reason: "name must start with a lowercase letter".into(),
        });
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_' | '.'))
    {
        return Err(Error::InvalidName {
            name: name.into(),
            reason: "name must contain lowercase alphanumeric, dash, underscore, or dot".into(),
        });
    }

    Ok(())
}

/// Describes a capability: its name, what it does, and the arguments it takes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    name: CapabilityName,
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    params: Vec<ParamSpec>,
}

impl CapabilityDescriptor {
    /// Starts building a descriptor for the supplied name.
    #[must_use]
    pub fn builder(name: CapabilityName) -> CapabilityDescriptorBuilder {
        CapabilityDescriptorBuilder {
            name,
            description: None,
            params: Vec::new(),
        }
    }

    /// Returns the capability name.
    #[must_use]
    pub fn name(&self) -> &CapabilityName {
        &self.name
    }

    /// Returns the human-readable summary.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the declared parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Renders the input shape as a JSON-Schema style object.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|param| (param.name().to_owned(), param.schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.is_required())
            .map(ParamSpec::name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Checks call arguments against the declared input shape.
    ///
    /// Arguments must be a JSON object. Undeclared keys are ignored so callers
    /// can pass through extra context without breaking older capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the arguments are not an
    /// object, a required parameter is missing, or a parameter has the wrong
    /// type.
    pub fn validate_arguments(&self, arguments: &Value) -> Result<()> {
        let Some(arguments) = arguments.as_object() else {
            return Err(Error::invalid_arguments("arguments must be an object"));
        };
        self.params
            .iter()
            .try_for_each(|param| param.check(arguments))
    }
}

/// Builder for [`CapabilityDescriptor`].
#[derive(Debug)]
pub struct CapabilityDescriptorBuilder {
    name: CapabilityName,
    description: Option<String>,
    params: Vec<ParamSpec>,
}

impl CapabilityDescriptorBuilder {
    /// Sets the human-readable description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if the description is empty or
    /// exceeds the maximum supported length.
    pub fn description(mut self, description: impl Into<String>) -> Result<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(Error::InvalidDescriptor {
                reason: "description cannot be empty".into(),
            });
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(Error::InvalidDescriptor {
                reason: format!("description length must be <= {MAX_DESCRIPTION_LEN}"),
            });
        }
        self.description = Some(description);
        Ok(self)
    }

    /// Adds a parameter declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParam`] if a parameter with the same name was
    /// already declared.
    pub fn param(mut self, param: ParamSpec) -> Result<Self> {
        if self.params.iter().any(|p| p.name() == param.name()) {
            return Err(Error::InvalidParam {
                name: param.name().to_owned(),
                reason: "parameter declared twice".into(),
            });
        }
        self.params.push(param);
        Ok(self)
    }

    /// Finalises the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if no description was supplied.
    pub fn build(self) -> Result<CapabilityDescriptor> {
        let description = self
            .description
            .ok_or_else(|| Error::InvalidDescriptor {
                reason: "description must be provided".into(),
            })?;

        Ok(CapabilityDescriptor {
            name: self.name,
            description,
            params: self.params,
        })
    }
}
