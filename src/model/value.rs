use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{ScimError, ScimResult};
use crate::schema::DataType;

use super::attribute::ScimAttribute;

/// A single SCIM attribute value: a primitive, or a complex value holding
/// singular sub-attributes one level deep.
#[derive(Debug, Clone, PartialEq)]
pub enum ScimValue {
    Str(String),
    Bool(bool),
    Int(i64),
    DateTime(DateTime<Utc>),
    Binary(Vec<u8>),
    Complex(Vec<ScimAttribute>),
}

impl ScimValue {
    /// Parse a textual representation (XML text content, LDAP attribute
    /// value) according to the declared data type.
    pub fn parse_str(data_type: DataType, text: &str) -> ScimResult<ScimValue> {
        match data_type {
            DataType::String => Ok(ScimValue::Str(text.to_string())),
            DataType::Boolean => match text {
                "true" => Ok(ScimValue::Bool(true)),
                "false" => Ok(ScimValue::Bool(false)),
                other => Err(ScimError::SchemaViolation(format!(
                    "not a boolean: {}",
                    other
                ))),
            },
            DataType::Integer => text.parse::<i64>().map(ScimValue::Int).map_err(|_| {
                ScimError::SchemaViolation(format!("not an integer: {}", text))
            }),
            DataType::DateTime => DateTime::parse_from_rfc3339(text)
                .map(|dt| ScimValue::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| {
                    ScimError::SchemaViolation(format!("not an ISO-8601 datetime: {}", text))
                }),
            DataType::Binary => BASE64
                .decode(text.as_bytes())
                .map(ScimValue::Binary)
                .map_err(|_| ScimError::SchemaViolation("not valid base64".to_string())),
            DataType::Complex => Err(ScimError::SchemaViolation(
                "complex value has no textual representation".to_string(),
            )),
        }
    }

    /// The textual representation written to XML and LDAP: datetimes are
    /// ISO-8601 UTC with a `Z` suffix, binary values base64.
    pub fn render_str(&self) -> ScimResult<String> {
        match self {
            ScimValue::Str(s) => Ok(s.clone()),
            ScimValue::Bool(b) => Ok(b.to_string()),
            ScimValue::Int(i) => Ok(i.to_string()),
            ScimValue::DateTime(dt) => Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ScimValue::Binary(b) => Ok(BASE64.encode(b)),
            ScimValue::Complex(_) => Err(ScimError::SchemaViolation(
                "complex value has no textual representation".to_string(),
            )),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ScimValue::Str(_) => DataType::String,
            ScimValue::Bool(_) => DataType::Boolean,
            ScimValue::Int(_) => DataType::Integer,
            ScimValue::DateTime(_) => DataType::DateTime,
            ScimValue::Binary(_) => DataType::Binary,
            ScimValue::Complex(_) => DataType::Complex,
        }
    }

    pub fn as_string(&self) -> ScimResult<&str> {
        match self {
            ScimValue::Str(s) => Ok(s),
            other => Err(type_mismatch("string", other)),
        }
    }

    pub fn as_boolean(&self) -> ScimResult<bool> {
        match self {
            ScimValue::Bool(b) => Ok(*b),
            other => Err(type_mismatch("boolean", other)),
        }
    }

    pub fn as_integer(&self) -> ScimResult<i64> {
        match self {
            ScimValue::Int(i) => Ok(*i),
            other => Err(type_mismatch("integer", other)),
        }
    }

    pub fn as_datetime(&self) -> ScimResult<DateTime<Utc>> {
        match self {
            ScimValue::DateTime(dt) => Ok(*dt),
            other => Err(type_mismatch("datetime", other)),
        }
    }

    pub fn as_binary(&self) -> ScimResult<&[u8]> {
        match self {
            ScimValue::Binary(b) => Ok(b),
            other => Err(type_mismatch("binary", other)),
        }
    }

    pub fn as_complex(&self) -> ScimResult<&[ScimAttribute]> {
        match self {
            ScimValue::Complex(attrs) => Ok(attrs),
            other => Err(type_mismatch("complex", other)),
        }
    }

    /// For a complex value, the sub-attribute with the given name,
    /// case-insensitively.
    pub fn sub_attribute(&self, name: &str) -> Option<&ScimAttribute> {
        match self {
            ScimValue::Complex(attrs) => attrs
                .iter()
                .find(|a| a.descriptor().name().eq_ignore_ascii_case(name)),
            _ => None,
        }
    }
}

fn type_mismatch(wanted: &str, got: &ScimValue) -> ScimError {
    ScimError::InvalidAttributeValue(format!(
        "expected a {} value, found {:?}",
        wanted,
        got.data_type()
    ))
}
