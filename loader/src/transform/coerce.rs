//! Insistent assignment.
//!
//! Spreadsheet cells carry no reliable type, so assignment first tries the
//! value as is, then walks [`INSISTENT_CONVERSIONS`] in order and retries with
//! each converted form until the operator accepts one. A null value that no
//! conversion can place is a no-op; anything else is an [`AssignmentFailure`].

use crate::error::AssignmentFailure;
use crate::logs::log_debug;
use crate::models::{Record, Value};
use crate::registry::OperatorDescriptor;

/// One fallback representation of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    ToString,
    ToInteger,
    ToFloat,
    ToBoolean,
}

/// Fallback order, from the natural type to the lossiest form.
pub const INSISTENT_CONVERSIONS: [Conversion; 4] = [
    Conversion::ToString,
    Conversion::ToInteger,
    Conversion::ToFloat,
    Conversion::ToBoolean,
];

const TRUE_VALUES: &[&str] = &["true", "t", "yes", "y", "1", "oui", "o"];
const FALSE_VALUES: &[&str] = &["false", "f", "no", "n", "0", "non"];

impl Conversion {
    /// Convert `value`, or `None` when it has no such representation.
    pub fn convert(&self, value: &Value) -> Option<Value> {
        match self {
            Conversion::ToString => match value {
                Value::Null | Value::Records(_) => None,
                Value::String(_) => Some(value.clone()),
                other => Some(Value::String(other.to_string())),
            },
            Conversion::ToInteger => match value {
                Value::Integer(_) => Some(value.clone()),
                Value::Float(x) if x.is_finite() => Some(Value::Integer(x.trunc() as i64)),
                Value::Bool(b) => Some(Value::Integer(i64::from(*b))),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
                _ => None,
            },
            Conversion::ToFloat => match value {
                Value::Float(_) => Some(value.clone()),
                Value::Integer(i) => Some(Value::Float(*i as f64)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|x| x.is_finite())
                    .map(Value::Float),
                _ => None,
            },
            Conversion::ToBoolean => match value {
                Value::Bool(_) => Some(value.clone()),
                Value::Integer(0) => Some(Value::Bool(false)),
                Value::Integer(1) => Some(Value::Bool(true)),
                Value::String(s) => {
                    let lower = s.trim().to_lowercase();
                    if TRUE_VALUES.contains(&lower.as_str()) {
                        Some(Value::Bool(true))
                    } else if FALSE_VALUES.contains(&lower.as_str()) {
                        Some(Value::Bool(false))
                    } else {
                        None
                    }
                }
                _ => None,
            },
        }
    }
}

/// How a value ended up assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Accepted as is.
    Direct,
    /// Accepted after a conversion.
    Converted(Conversion),
    /// Null value, nothing assigned.
    Skipped,
}

/// Assign `value` to `operator` on `record`, falling back through conversions.
pub fn assign(
    record: &mut Record,
    operator: &OperatorDescriptor,
    value: Value,
) -> Result<Assignment, AssignmentFailure> {
    let mut reason = match operator.assign(record, value.clone()) {
        Ok(()) => return Ok(Assignment::Direct),
        Err(reason) => reason,
    };

    for conversion in INSISTENT_CONVERSIONS {
        let Some(converted) = conversion.convert(&value) else {
            log_debug(format!("{}: no {:?} form for [{}]", operator.name, conversion, value));
            continue;
        };

        match operator.assign(record, converted) {
            Ok(()) => {
                log_debug(format!("{}: assigned [{}] via {:?}", operator.name, value, conversion));
                return Ok(Assignment::Converted(conversion));
            }
            Err(e) => {
                log_debug(format!("{}: {:?} rejected: {}", operator.name, conversion, e));
                reason = e;
            }
        }
    }

    if value.is_null() {
        return Ok(Assignment::Skipped);
    }

    Err(AssignmentFailure {
        operator: operator.name.clone(),
        value: value.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordRef;
    use crate::registry::FieldType;

    #[test]
    fn test_direct_assignment() {
        let op = OperatorDescriptor::attribute("name", FieldType::String);
        let mut record = Record::new("Product");
        assert_eq!(assign(&mut record, &op, Value::from("Widget")), Ok(Assignment::Direct));
        assert_eq!(record.get("name"), Some(&Value::from("Widget")));
    }

    #[test]
    fn test_float_string_uses_float_conversion() {
        let op = OperatorDescriptor::attribute("price", FieldType::Float);
        let mut record = Record::new("Product");

        let result = assign(&mut record, &op, Value::from("3.14"));

        assert_eq!(result, Ok(Assignment::Converted(Conversion::ToFloat)));
        let expected: f64 = "3.14".parse().unwrap();
        assert_eq!(record.get("price"), Some(&Value::Float(expected)));
    }

    #[test]
    fn test_integer_string_to_float_field() {
        let op = OperatorDescriptor::attribute("price", FieldType::Float);
        let mut record = Record::new("Product");
        let result = assign(&mut record, &op, Value::from("3"));
        assert_eq!(result, Ok(Assignment::Converted(Conversion::ToInteger)));
        assert_eq!(record.get("price"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn test_number_to_string_field() {
        let op = OperatorDescriptor::attribute("code", FieldType::String);
        let mut record = Record::new("Product");
        let result = assign(&mut record, &op, Value::Integer(42));
        assert_eq!(result, Ok(Assignment::Converted(Conversion::ToString)));
        assert_eq!(record.get("code"), Some(&Value::from("42")));
    }

    #[test]
    fn test_boolean_is_last_resort() {
        let op = OperatorDescriptor::attribute("active", FieldType::Boolean);
        let mut record = Record::new("Product");
        let result = assign(&mut record, &op, Value::from("Yes"));
        assert_eq!(result, Ok(Assignment::Converted(Conversion::ToBoolean)));
        assert_eq!(record.get("active"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_null_is_a_no_op() {
        let op = OperatorDescriptor::attribute("price", FieldType::Float);
        let mut record = Record::new("Product");
        assert_eq!(assign(&mut record, &op, Value::Null), Ok(Assignment::Skipped));
        assert!(record.get("price").is_none());
    }

    #[test]
    fn test_failure_names_operator_and_value() {
        let op = OperatorDescriptor::attribute("price", FieldType::Float);
        let mut record = Record::new("Product");

        let err = assign(&mut record, &op, Value::from("cheap")).unwrap_err();

        assert_eq!(err.operator, "price");
        assert_eq!(err.value, "cheap");
        assert!(record.get("price").is_none());
    }

    #[test]
    fn test_association_accepts_records_only() {
        let op = OperatorDescriptor::association("category", "Category");
        let mut record = Record::new("Product");
        let found = Value::Records(vec![RecordRef { class: "Category".into(), id: 3 }]);

        assert_eq!(assign(&mut record, &op, found), Ok(Assignment::Direct));
        assert!(assign(&mut record, &op, Value::from("Tools")).is_err());
    }

    #[test]
    fn test_integer_conversion_is_strict_for_strings() {
        assert_eq!(Conversion::ToInteger.convert(&Value::from("3.14")), None);
        assert_eq!(Conversion::ToInteger.convert(&Value::Float(3.9)), Some(Value::Integer(3)));
    }
}
