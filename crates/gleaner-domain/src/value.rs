//! Typed field values
//!
//! The wire form of an extraction payload is JSON, but in memory each value
//! is coerced through the owning `FieldDefinition` so the merge rules and
//! validation operate on typed data instead of raw maps.

use crate::error::DomainError;
use crate::project::{FieldDefinition, FieldType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A field value tagged by its semantic type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean flag
    Bool(bool),
    /// Whole number
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// Free text or enum member
    Text(String),
    /// List of scalars or objects
    List(Vec<Value>),
}

impl FieldValue {
    /// Coerce a JSON value through a field definition
    ///
    /// Numbers arriving as strings and integers arriving as floats with a
    /// zero fraction are accepted; everything else must already match.
    pub fn from_json(def: &FieldDefinition, value: &Value) -> Result<Self, DomainError> {
        let mismatch = || DomainError::TypeMismatch {
            field: def.name.clone(),
            expected: def.field_type.as_str().to_string(),
            value: value.to_string(),
        };

        match def.field_type {
            FieldType::Boolean => value.as_bool().map(FieldValue::Bool).ok_or_else(mismatch),
            FieldType::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(FieldValue::Integer)
                    .ok_or_else(mismatch),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(FieldValue::Integer)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            FieldType::Float => match value {
                Value::Number(n) => n.as_f64().map(FieldValue::Float).ok_or_else(mismatch),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(FieldValue::Float)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            FieldType::Text => value
                .as_str()
                .map(|s| FieldValue::Text(s.to_string()))
                .ok_or_else(mismatch),
            FieldType::Enum => {
                let s = value.as_str().ok_or_else(mismatch)?;
                if let Some(allowed) = &def.enum_values {
                    if !allowed.iter().any(|v| v == s) {
                        return Err(DomainError::UnknownEnumValue {
                            field: def.name.clone(),
                            value: s.to_string(),
                        });
                    }
                }
                Ok(FieldValue::Text(s.to_string()))
            }
            FieldType::List => match value {
                Value::Array(items) => Ok(FieldValue::List(items.clone())),
                // A bare scalar is treated as a single-element list
                other => Ok(FieldValue::List(vec![other.clone()])),
            },
        }
    }

    /// Convert back to the JSON wire form
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(items.clone()),
        }
    }
}

/// Render a JSON value with recursively sorted object keys
///
/// Used wherever two payloads must compare or embed identically regardless
/// of key insertion order (list-of-object dedup, payload embedding text).
pub fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for key in keys {
                    out.insert(key.clone(), sort(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(field_type: FieldType) -> FieldDefinition {
        FieldDefinition {
            name: "f".to_string(),
            field_type,
            description: String::new(),
            required: false,
            default: None,
            enum_values: None,
        }
    }

    #[test]
    fn test_boolean_coercion() {
        let v = FieldValue::from_json(&def(FieldType::Boolean), &json!(true)).unwrap();
        assert_eq!(v, FieldValue::Bool(true));
        assert!(FieldValue::from_json(&def(FieldType::Boolean), &json!("yes")).is_err());
    }

    #[test]
    fn test_integer_accepts_string_and_whole_float() {
        let d = def(FieldType::Integer);
        assert_eq!(
            FieldValue::from_json(&d, &json!("42")).unwrap(),
            FieldValue::Integer(42)
        );
        assert_eq!(
            FieldValue::from_json(&d, &json!(42.0)).unwrap(),
            FieldValue::Integer(42)
        );
        assert!(FieldValue::from_json(&d, &json!(42.5)).is_err());
    }

    #[test]
    fn test_enum_checks_value_set() {
        let mut d = def(FieldType::Enum);
        d.enum_values = Some(vec!["small".to_string(), "large".to_string()]);
        assert!(FieldValue::from_json(&d, &json!("small")).is_ok());
        let err = FieldValue::from_json(&d, &json!("medium")).unwrap_err();
        assert!(matches!(err, DomainError::UnknownEnumValue { .. }));
    }

    #[test]
    fn test_scalar_promoted_to_list() {
        let v = FieldValue::from_json(&def(FieldType::List), &json!("repair")).unwrap();
        assert_eq!(v, FieldValue::List(vec![json!("repair")]));
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: canonicalisation is stable under re-parse
        #[test]
        fn test_canonical_json_idempotent(keys in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
            let mut map = serde_json::Map::new();
            for (i, key) in keys.iter().enumerate() {
                map.insert(key.clone(), Value::from(i as i64));
            }
            let value = Value::Object(map);
            let once = canonical_json(&value);
            let reparsed: Value = serde_json::from_str(&once).unwrap();
            prop_assert_eq!(once, canonical_json(&reparsed));
        }

        /// Property: integer strings coerce losslessly
        #[test]
        fn test_integer_string_coercion(n in -1_000_000i64..1_000_000i64) {
            let d = FieldDefinition {
                name: "f".to_string(),
                field_type: FieldType::Integer,
                description: String::new(),
                required: false,
                default: None,
                enum_values: None,
            };
            let v = FieldValue::from_json(&d, &Value::String(n.to_string())).unwrap();
            prop_assert_eq!(v, FieldValue::Integer(n));
        }
    }
}
