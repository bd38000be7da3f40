//! Capability catalog advertised to tool-call clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::CapabilityDescriptor;

/// Wire form of a single catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Capability name.
    pub name: String,
    /// Human-readable summary.
    pub description: String,
    /// JSON-Schema style description of the accepted arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl From<&CapabilityDescriptor> for CatalogEntry {
    fn from(descriptor: &CapabilityDescriptor) -> Self {
        Self {
            name: descriptor.name().to_string(),
            description: descriptor.description().to_owned(),
            input_schema: descriptor.input_schema(),
        }
    }
}

/// Ordered list of capabilities available through a registry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    tools: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog from descriptors, keeping their order.
    #[must_use]
    pub fn from_descriptors<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a CapabilityDescriptor>,
    {
        Self {
            tools: descriptors.into_iter().map(CatalogEntry::from).collect(),
        }
    }

    /// Returns the catalog entries.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.tools
    }

    /// Returns the entry with the supplied name, if present.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&CatalogEntry> {
        self.tools.iter().find(|entry| entry.name == name)
    }

    /// Returns `true` when no capabilities are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the number of listed capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CapabilityName, ParamKind, ParamSpec};

    #[test]
    fn serializes_with_input_schema_key() {
        let descriptor = CapabilityDescriptor::builder(CapabilityName::new("echo").unwrap())
            .description("Echo text back")
            .unwrap()
            .param(ParamSpec::required("text", ParamKind::String).unwrap())
            .unwrap()
            .build()
            .unwrap();

        let catalog = Catalog::from_descriptors([&descriptor]);
        let wire = serde_json::to_value(&catalog).unwrap();

        assert_eq!(wire["tools"][0]["name"], "echo");
        assert_eq!(wire["tools"][0]["description"], "Echo text back");
        assert_eq!(wire["tools"][0]["inputSchema"]["required"][0], "text");
        assert_eq!(catalog.find("echo").map(|e| e.name.as_str()), Some("echo"));
        assert_eq!(catalog.len(), 1);
    }
}
