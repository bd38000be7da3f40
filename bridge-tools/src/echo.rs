//! The `echo` capability, used to smoke-test both transports.

use bridge_primitives::{
    CapabilityDescriptor, CapabilityDescriptorBuilder, CapabilityName, ParamKind, ParamSpec,
};
use serde_json::Value;

use crate::registry::{CapabilityError, CapabilityRegistry, CapabilityResult};

/// Registered name of the echo capability.
pub const NAME: &str = "echo";

/// Describes `echo`.
///
/// # Errors
///
/// Propagates descriptor validation failures.
pub fn descriptor() -> bridge_primitives::Result<CapabilityDescriptor> {
    CapabilityDescriptor::builder(CapabilityName::new(NAME)?)
        .description("Return the supplied text unchanged")?
        .param(ParamSpec::required("text", ParamKind::String)?)
        .and_then(CapabilityDescriptorBuilder::build)
}

/// Returns `arguments["text"]`.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidArguments`] when `text` is missing.
pub fn echo(arguments: Value) -> CapabilityResult<Value> {
    match arguments.get("text") {
        Some(text @ Value::String(_)) => Ok(text.clone()),
        _ => Err(CapabilityError::invalid_arguments("`text` must be a string")),
    }
}

/// Registers `echo`.
///
/// # Errors
///
/// Returns [`CapabilityError::Duplicate`] if the name is taken.
pub fn register(registry: &CapabilityRegistry) -> CapabilityResult<()> {
    registry.register(descriptor()?, echo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn echoes_text() {
        let registry = CapabilityRegistry::new();
        register(&registry).unwrap();
        assert_eq!(
            registry.call(NAME, json!({ "text": "hi" })).unwrap(),
            json!("hi")
        );
    }
}
