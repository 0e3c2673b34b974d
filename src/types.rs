//! YANG built-in types and value checks
//!
//! Types come from two places: the `type` statement of a consolidated
//! schema leaf, and the `type` field of a grammar companion item. Both
//! are mapped onto [`YangType`], which checks RFC 7951 JSON encodings.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use std::collections::HashMap;

use crate::schema::SchemaNode;

/// Represents YANG data types
#[derive(Debug, Clone, PartialEq)]
pub enum YangType {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Decimal64,
    Binary,
    Boolean,
    Empty,
    Identityref,
    Leafref,
    InstanceIdentifier,
    Bits,
    Uri,
    /// Enumeration with name-to-value mapping
    Enumeration(HashMap<String, i64>),
    /// Union of multiple types
    Union(Vec<YangType>),
    /// Base type restricted by a `range` statement
    Ranged(Box<YangType>, Range),
    /// Unknown/unrecognized type (typedefs are not resolved)
    Unknown(String),
}

impl YangType {
    /// Parse a type from the `type` field of a grammar item
    pub fn from_grammar(type_value: &Value) -> Self {
        match type_value {
            Value::String(s) => Self::from_name(s),
            Value::Object(map) => {
                // Enumeration: {"value": "name", ...}
                let enum_map: HashMap<String, i64> = map
                    .iter()
                    .filter_map(|(k, v)| {
                        v.as_str()
                            .map(|name| (name.to_string(), k.parse().unwrap_or(0)))
                    })
                    .collect();
                YangType::Enumeration(enum_map)
            }
            Value::Array(arr) => {
                let types: Vec<YangType> = arr.iter().map(Self::from_grammar).collect();
                YangType::Union(types)
            }
            _ => YangType::Unknown("invalid".to_string()),
        }
    }

    /// Build a type from a schema `type` statement
    pub fn from_schema(type_stmt: &SchemaNode) -> Self {
        let base = match type_stmt.name() {
            "enumeration" => {
                let mut next = 0;
                let mut enum_map = HashMap::new();
                for item in type_stmt.statements("enum") {
                    let value = item
                        .arg_of("value")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(next);
                    next = value + 1;
                    enum_map.insert(item.name().to_string(), value);
                }
                YangType::Enumeration(enum_map)
            }
            "union" => YangType::Union(type_stmt.statements("type").map(Self::from_schema).collect()),
            other => Self::from_name(other),
        };

        match type_stmt.arg_of("range").and_then(|r| Range::parse(r, &base)) {
            Some(range) => YangType::Ranged(Box::new(base), range),
            None => base,
        }
    }

    /// Map a built-in type name, with or without a module prefix
    pub fn from_name(s: &str) -> Self {
        if s == "inet:uri" {
            return YangType::Uri;
        }
        let name = s.rsplit_once(':').map_or(s, |(_, n)| n);
        match name {
            "string" => YangType::String,
            "int8" => YangType::Int8,
            "int16" => YangType::Int16,
            "int32" => YangType::Int32,
            "int64" => YangType::Int64,
            "uint8" => YangType::Uint8,
            "uint16" => YangType::Uint16,
            "uint32" => YangType::Uint32,
            "uint64" => YangType::Uint64,
            "decimal64" => YangType::Decimal64,
            "binary" => YangType::Binary,
            "boolean" => YangType::Boolean,
            "empty" => YangType::Empty,
            "identityref" => YangType::Identityref,
            "leafref" => YangType::Leafref,
            "instance-identifier" => YangType::InstanceIdentifier,
            "bits" => YangType::Bits,
            other => YangType::Unknown(other.to_string()),
        }
    }

    /// Value bounds of integer types
    fn bounds(&self) -> Option<(f64, f64)> {
        let bounds = match self {
            YangType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            YangType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            YangType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            YangType::Int64 => (i64::MIN as f64, i64::MAX as f64),
            YangType::Uint8 => (0.0, u8::MAX as f64),
            YangType::Uint16 => (0.0, u16::MAX as f64),
            YangType::Uint32 => (0.0, u32::MAX as f64),
            YangType::Uint64 => (0.0, u64::MAX as f64),
            YangType::Decimal64 => (f64::MIN, f64::MAX),
            YangType::Ranged(base, _) => return base.bounds(),
            _ => return None,
        };
        Some(bounds)
    }

    /// Check a JSON-encoded instance value against this type
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        match self {
            YangType::String | YangType::Uri | YangType::Identityref => match value {
                Value::String(_) => Ok(()),
                other => Err(format!("expected a string, found {other}")),
            },

            YangType::Int8
            | YangType::Int16
            | YangType::Int32
            | YangType::Uint8
            | YangType::Uint16
            | YangType::Uint32 => {
                let n = value_to_i128(value)?;
                self.check_bounds(n as f64)
            }

            YangType::Int64 | YangType::Uint64 => {
                let n = value_to_i128(value)?;
                let (min, max) = match self {
                    YangType::Int64 => (i64::MIN as i128, i64::MAX as i128),
                    _ => (0, u64::MAX as i128),
                };
                if n < min || n > max {
                    return Err(format!("{n} is out of range"));
                }
                Ok(())
            }

            YangType::Decimal64 => value_to_f64(value).map(|_| ()),

            YangType::Binary => {
                let s = value
                    .as_str()
                    .ok_or_else(|| format!("expected base64 text, found {value}"))?;
                BASE64
                    .decode(s)
                    .map(|_| ())
                    .map_err(|e| format!("base64 decode: {e}"))
            }

            YangType::Boolean => match value {
                Value::Bool(_) => Ok(()),
                Value::String(s) if s == "true" || s == "false" => Ok(()),
                other => Err(format!("expected a boolean, found {other}")),
            },

            YangType::Empty => match value {
                Value::Null => Ok(()),
                Value::Array(items) if items.len() == 1 && items[0].is_null() => Ok(()),
                other => Err(format!("expected [null] for empty type, found {other}")),
            },

            YangType::Enumeration(enum_map) => match value.as_str() {
                Some(s) if enum_map.contains_key(s) => Ok(()),
                _ => Err(format!("enumeration value not found: {value}")),
            },

            YangType::Union(types) => {
                if types.is_empty() || types.iter().any(|t| t.check(value).is_ok()) {
                    Ok(())
                } else {
                    Err(format!("{value} matches no member of the union"))
                }
            }

            YangType::Ranged(base, range) => {
                base.check(value)?;
                let n = value_to_f64(value)?;
                if range.contains(n) {
                    Ok(())
                } else {
                    Err(format!("{n} is outside the allowed range {}", range.text))
                }
            }

            YangType::Leafref | YangType::InstanceIdentifier | YangType::Bits => match value {
                Value::Object(_) | Value::Array(_) => {
                    Err(format!("expected a scalar value, found {value}"))
                }
                _ => Ok(()),
            },

            YangType::Unknown(_) => Ok(()),
        }
    }

    fn check_bounds(&self, n: f64) -> std::result::Result<(), String> {
        match self.bounds() {
            Some((min, max)) if n < min || n > max => Err(format!("{n} is out of range")),
            _ => Ok(()),
        }
    }

    /// Convert a schema default (always text) to its JSON encoding
    pub fn coerce_default(&self, text: &str) -> Value {
        match self {
            YangType::Int8
            | YangType::Int16
            | YangType::Int32
            | YangType::Uint8
            | YangType::Uint16
            | YangType::Uint32 => text
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .unwrap_or_else(|_| Value::String(text.to_string())),
            YangType::Boolean => match text {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(text.to_string()),
            },
            YangType::Empty => Value::Array(vec![Value::Null]),
            YangType::Ranged(base, _) => base.coerce_default(text),
            _ => Value::String(text.to_string()),
        }
    }
}

/// Allowed intervals from a `range` statement
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    parts: Vec<(f64, f64)>,
    text: String,
}

impl Range {
    /// Parse `"1..10 | 20..max"` for the given base type
    pub fn parse(text: &str, base: &YangType) -> Option<Self> {
        let (min, max) = base.bounds()?;
        let bound = |s: &str| match s.trim() {
            "min" => Some(min),
            "max" => Some(max),
            other => other.parse::<f64>().ok(),
        };

        let mut parts = Vec::new();
        for part in text.split('|') {
            let (lo, hi) = match part.split_once("..") {
                Some((lo, hi)) => (bound(lo)?, bound(hi)?),
                None => {
                    let v = bound(part)?;
                    (v, v)
                }
            };
            parts.push((lo, hi));
        }

        Some(Self {
            parts,
            text: text.trim().to_string(),
        })
    }

    pub fn contains(&self, n: f64) -> bool {
        self.parts.iter().any(|(lo, hi)| n >= *lo && n <= *hi)
    }
}

fn value_to_i128(value: &Value) -> std::result::Result<i128, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| format!("cannot convert {n} to an integer")),
        Value::String(s) => s
            .parse()
            .map_err(|_| format!("cannot parse '{s}' as an integer")),
        _ => Err(format!("cannot convert {value} to an integer")),
    }
}

fn value_to_f64(value: &Value) -> std::result::Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("cannot convert {n} to a decimal")),
        Value::String(s) => s
            .parse()
            .map_err(|_| format!("cannot parse '{s}' as a decimal")),
        _ => Err(format!("cannot convert {value} to a decimal")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_yang_type_from_name() {
        assert_eq!(YangType::from_name("string"), YangType::String);
        assert_eq!(YangType::from_name("uint8"), YangType::Uint8);
        assert_eq!(YangType::from_name("inet:uri"), YangType::Uri);
        assert_eq!(
            YangType::from_name("yang:counter32"),
            YangType::Unknown("counter32".into())
        );
    }

    #[test]
    fn test_integer_bounds() {
        assert!(YangType::Uint8.check(&json!(255)).is_ok());
        assert!(YangType::Uint8.check(&json!(256)).is_err());
        assert!(YangType::Int8.check(&json!(-129)).is_err());
        assert!(YangType::Uint32.check(&json!("12")).is_ok());
        assert!(YangType::Uint32.check(&json!("twelve")).is_err());
        assert!(YangType::Uint64.check(&json!("18446744073709551615")).is_ok());
        assert!(YangType::Uint64.check(&json!(-1)).is_err());
    }

    #[test]
    fn test_ranged_type_from_schema() {
        let mut ty = SchemaNode::new("type", Some("uint32".into()));
        ty.children.push(SchemaNode::new("range", Some("1..10".into())));
        let ranged = YangType::from_schema(&ty);

        assert!(ranged.check(&json!(5)).is_ok());
        assert!(ranged.check(&json!(0)).is_err());
        assert!(ranged.check(&json!(11)).is_err());
    }

    #[test]
    fn test_enumeration_from_schema() {
        let mut ty = SchemaNode::new("type", Some("enumeration".into()));
        for name in ["up", "down"] {
            ty.children.push(SchemaNode::new("enum", Some(name.into())));
        }
        let enumeration = YangType::from_schema(&ty);
        assert!(enumeration.check(&json!("up")).is_ok());
        assert!(enumeration.check(&json!("sideways")).is_err());
    }

    #[test]
    fn test_grammar_types() {
        let union = YangType::from_grammar(&json!(["boolean", "uint8"]));
        assert!(union.check(&json!(true)).is_ok());
        assert!(union.check(&json!(7)).is_ok());
        assert!(union.check(&json!("x")).is_err());

        let binary = YangType::from_grammar(&json!("binary"));
        assert!(binary.check(&json!("aGVsbG8=")).is_ok());
        assert!(binary.check(&json!("not base64!")).is_err());
    }

    #[test]
    fn test_coerce_default() {
        assert_eq!(YangType::Uint32.coerce_default("5"), json!(5));
        assert_eq!(YangType::Boolean.coerce_default("true"), json!(true));
        assert_eq!(YangType::Uint64.coerce_default("5"), json!("5"));
        assert_eq!(YangType::Empty.coerce_default(""), json!([null]));
    }
}
