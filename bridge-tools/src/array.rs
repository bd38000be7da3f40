//! Array math capabilities: `array_sum`, `array_map`, `array_sort`.

use bridge_primitives::{
    CapabilityDescriptor, CapabilityDescriptorBuilder, CapabilityName, ParamKind, ParamSpec,
};
use serde_json::{Number, Value};

use crate::registry::{CapabilityError, CapabilityRegistry, CapabilityResult};

/// Registered name of the summing capability.
pub const SUM: &str = "array_sum";
/// Registered name of the element-wise transform capability.
pub const MAP: &str = "array_map";
/// Registered name of the sorting capability.
pub const SORT: &str = "array_sort";

/// Element-wise transform applied by `array_map`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MapOp {
    /// `x * 2`
    Double,
    /// `x * x`
    Square,
    /// `-x`
    Negate,
    /// `|x|`
    Abs,
}

impl MapOp {
    fn parse(op: &str) -> CapabilityResult<Self> {
        match op {
            "double" => Ok(Self::Double),
            "square" => Ok(Self::Square),
            "negate" => Ok(Self::Negate),
            "abs" => Ok(Self::Abs),
            other => Err(CapabilityError::invalid_arguments(format!(
                "unknown op `{other}`; expected double, square, negate, or abs"
            ))),
        }
    }

    fn apply(self, value: f64) -> f64 {
        match self {
            Self::Double => value * 2.0,
            Self::Square => value * value,
            Self::Negate => -value,
            Self::Abs => value.abs(),
        }
    }
}

fn values_param() -> bridge_primitives::Result<ParamSpec> {
    Ok(ParamSpec::required("values", ParamKind::Array)?.with_description("Array of numbers"))
}

fn numbers(arguments: &Value) -> CapabilityResult<Vec<f64>> {
    let values = arguments
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| CapabilityError::invalid_arguments("`values` must be an array"))?;

    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value.as_f64().ok_or_else(|| {
                CapabilityError::invalid_arguments(format!("values[{index}] is not a number"))
            })
        })
        .collect()
}

// Whole results stay integers on the wire so `[1, 2]` sums to `3`, not `3.0`.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number(value: f64) -> CapabilityResult<Value> {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(value as i64));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| CapabilityError::execution("result is not a finite number"))
}

fn numbers_to_value(values: impl IntoIterator<Item = f64>) -> CapabilityResult<Value> {
    values
        .into_iter()
        .map(number)
        .collect::<CapabilityResult<Vec<_>>>()
        .map(Value::Array)
}

/// Sums `values`.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidArguments`] for non-numeric elements.
pub fn sum(arguments: Value) -> CapabilityResult<Value> {
    number(numbers(&arguments)?.into_iter().sum())
}

/// Applies `op` to every element of `values`.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidArguments`] for non-numeric elements or an
/// unknown operation.
pub fn map(arguments: Value) -> CapabilityResult<Value> {
    let op = arguments
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| CapabilityError::invalid_arguments("`op` must be a string"))
        .and_then(MapOp::parse)?;
    numbers_to_value(numbers(&arguments)?.into_iter().map(|v| op.apply(v)))
}

/// Sorts `values`, ascending unless `descending` is `true`.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidArguments`] for non-numeric elements.
pub fn sort(arguments: Value) -> CapabilityResult<Value> {
    let mut values = numbers(&arguments)?;
    values.sort_by(f64::total_cmp);
    if arguments
        .get("descending")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        values.reverse();
    }
    numbers_to_value(values)
}

/// Registers the array capabilities.
///
/// # Errors
///
/// Returns [`CapabilityError::Duplicate`] if any name is taken.
pub fn register(registry: &CapabilityRegistry) -> CapabilityResult<()> {
    let descriptor = CapabilityDescriptor::builder(CapabilityName::new(SUM)?)
        .description("Sum an array of numbers")?
        .param(values_param()?)
        .and_then(CapabilityDescriptorBuilder::build)?;
    registry.register(descriptor, sum)?;

    let descriptor = CapabilityDescriptor::builder(CapabilityName::new(MAP)?)
        .description("Apply double, square, negate, or abs to every element")?
        .param(values_param()?)?
        .param(
            ParamSpec::required("op", ParamKind::String)?
                .with_description("double | square | negate | abs"),
        )
        .and_then(CapabilityDescriptorBuilder::build)?;
    registry.register(descriptor, map)?;

    let descriptor = CapabilityDescriptor::builder(CapabilityName::new(SORT)?)
        .description("Sort an array of numbers")?
        .param(values_param()?)?
        .param(ParamSpec::optional("descending", ParamKind::Boolean)?)
        .and_then(CapabilityDescriptorBuilder::build)?;
    registry.register(descriptor, sort)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> CapabilityRegistry {
        let registry = CapabilityRegistry::new();
        register(&registry).unwrap();
        registry
    }

    #[test]
    fn sums_integers_to_an_integer() {
        let out = registry()
            .call(SUM, json!({ "values": [1, 2, 3.5, -0.5] }))
            .unwrap();
        assert_eq!(out, json!(6));
    }

    #[test]
    fn maps_and_sorts() {
        let registry = registry();
        let out = registry
            .call(MAP, json!({ "values": [1, -2, 3], "op": "square" }))
            .unwrap();
        assert_eq!(out, json!([1, 4, 9]));

        let out = registry
            .call(SORT, json!({ "values": [3, 1.5, 2], "descending": true }))
            .unwrap();
        assert_eq!(out, json!([3, 2, 1.5]));
    }

    #[test]
    fn rejects_non_numeric_elements() {
        let err = registry()
            .call(SUM, json!({ "values": [1, "two"] }))
            .expect_err("non-numeric");
        assert!(
            matches!(err, CapabilityError::InvalidArguments { reason } if reason.contains("values[1]"))
        );
    }

    #[test]
    fn rejects_unknown_ops() {
        let err = registry()
            .call(MAP, json!({ "values": [1], "op": "cube" }))
            .expect_err("unknown op");
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));
    }
}
