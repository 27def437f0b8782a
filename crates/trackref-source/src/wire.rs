//! Raw wire records: one JSON object per backend row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use trackref_registry::RefKey;

/// A flat record as a backend returned it, before conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireRecord(Map<String, Value>);

/// A reference field, either a bare key or an inline object complete
/// enough to stand in for the entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Key(RefKey),
    Inline(WireRecord),
}

impl WireRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, WireError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(WireError::NotAnObject(json_type(&other))),
        }
    }

    /// Parse one JSON object from text.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| WireError::Json(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Field value; JSON `null` counts as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|value| !value.is_null())
    }

    pub fn kind(&self) -> Option<&str> {
        self.get("kind").and_then(Value::as_str)
    }

    /// An id-like field: a non-blank string, or a number rendered as text.
    pub fn key_field(&self, field: &'static str) -> Result<Option<String>, WireError> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(non_blank(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(WireError::Type {
                field,
                expected: "string or number",
            }),
        }
    }

    pub fn required_key(&self, field: &'static str) -> Result<String, WireError> {
        self.key_field(field)?.ok_or(WireError::Missing { field })
    }

    pub fn opt_str(&self, field: &'static str) -> Result<Option<String>, WireError> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(WireError::Type {
                field,
                expected: "string",
            }),
        }
    }

    pub fn str_field(&self, field: &'static str) -> Result<String, WireError> {
        Ok(self.opt_str(field)?.unwrap_or_default())
    }

    pub fn bool_field(&self, field: &'static str, default: bool) -> Result<bool, WireError> {
        match self.get(field) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(WireError::Type {
                field,
                expected: "boolean",
            }),
        }
    }

    pub fn i64_field(&self, field: &'static str) -> Result<i64, WireError> {
        match self.get(field) {
            None => Ok(0),
            Some(value) => value.as_i64().ok_or(WireError::Type {
                field,
                expected: "integer",
            }),
        }
    }

    pub fn u64_field(&self, field: &'static str) -> Result<u64, WireError> {
        match self.get(field) {
            None => Ok(0),
            Some(value) => value.as_u64().ok_or(WireError::Type {
                field,
                expected: "non-negative integer",
            }),
        }
    }

    /// RFC 3339 timestamp.
    pub fn timestamp(&self, field: &'static str) -> Result<Option<DateTime<Utc>>, WireError> {
        let Some(text) = self.opt_str(field)? else {
            return Ok(None);
        };
        DateTime::parse_from_rfc3339(&text)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| WireError::Timestamp {
                field,
                message: e.to_string(),
            })
    }

    pub fn str_list(&self, field: &'static str) -> Result<Vec<String>, WireError> {
        match self.get(field) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or(WireError::Type {
                        field,
                        expected: "array of strings",
                    })
                })
                .collect(),
            Some(_) => Err(WireError::Type {
                field,
                expected: "array of strings",
            }),
        }
    }

    /// Nested objects of an array field.
    pub fn records(&self, field: &'static str) -> Result<Vec<WireRecord>, WireError> {
        match self.get(field) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    WireRecord::from_value(item.clone()).map_err(|_| WireError::Type {
                        field,
                        expected: "array of objects",
                    })
                })
                .collect(),
            Some(_) => Err(WireError::Type {
                field,
                expected: "array of objects",
            }),
        }
    }

    /// Interpret a reference field.
    ///
    /// A string is a name, a number is an id. An object carrying only one of
    /// `id` / `name` is that key; one carrying both is an inline entity.
    pub fn reference(&self, field: &'static str) -> Result<Option<Reference>, WireError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => reference_value(field, value),
        }
    }

    /// A reference field reduced to its key, ignoring any inline payload.
    pub fn ref_key(&self, field: &'static str) -> Result<Option<RefKey>, WireError> {
        Ok(self.reference(field)?.and_then(|reference| match reference {
            Reference::Key(key) => Some(key),
            Reference::Inline(inline) => inline_key(&inline),
        }))
    }

    /// Every reference of an array field; blank entries are dropped.
    pub fn references(&self, field: &'static str) -> Result<Vec<Reference>, WireError> {
        match self.get(field) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(reference) = reference_value(field, item)? {
                        out.push(reference);
                    }
                }
                Ok(out)
            }
            Some(other) => Ok(reference_value(field, other)?.into_iter().collect()),
        }
    }
}

fn reference_value(field: &'static str, value: &Value) -> Result<Option<Reference>, WireError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(non_blank(s).map(|s| Reference::Key(RefKey::Name(s)))),
        Value::Number(n) => Ok(Some(Reference::Key(RefKey::Id(n.to_string())))),
        Value::Object(map) => {
            let record = WireRecord(map.clone());
            let id = record.key_field("id")?;
            let name = record.key_field("name")?;
            Ok(match (id, name) {
                (Some(_), Some(_)) => Some(Reference::Inline(record)),
                (Some(id), None) => Some(Reference::Key(RefKey::Id(id))),
                (None, Some(name)) => Some(Reference::Key(RefKey::Name(name))),
                (None, None) => None,
            })
        }
        _ => Err(WireError::Type {
            field,
            expected: "string, number or object",
        }),
    }
}

fn inline_key(record: &WireRecord) -> Option<RefKey> {
    let id = record.key_field("id").ok().flatten();
    let name = record.key_field("name").ok().flatten();
    id.map(RefKey::Id).or_else(|| name.map(RefKey::Name))
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Errors reading fields out of a wire record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("missing field `{field}`")]
    Missing { field: &'static str },

    #[error("field `{field}` must be {expected}")]
    Type {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{field}` is not an RFC 3339 timestamp: {message}")]
    Timestamp {
        field: &'static str,
        message: String,
    },

    #[error("no converter for `{0}` records")]
    UnknownKind(String),
}
