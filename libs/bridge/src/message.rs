//! Bridge Message Model
//!
//! A message is a JSON object with a string discriminant under `type` and any
//! number of additional fields. Fields are kept one level deep: primitives are
//! stored by value and nested objects/arrays are shared behind an `Arc`, whose
//! identity stands in for the object reference when two messages are compared
//! for caching purposes.

use crate::error::BridgeError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the discriminant field on the wire
pub const TYPE_FIELD: &str = "type";

/// Suffix appended to a request discriminant to form its reply discriminant
pub const DEFAULT_REPLY_SUFFIX: &str = "Response";

/// Build the paired reply discriminant for a request discriminant
pub fn reply_type(kind: &str, suffix: &str) -> String {
    format!("{}{}", kind, suffix)
}

/// A single top-level field of a message
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Object or array, compared by reference rather than by content
    Nested(Arc<Value>),
}

impl FieldValue {
    /// Wrap a nested JSON value in a fresh shared reference
    pub fn nested(value: Value) -> Self {
        Self::Nested(Arc::new(value))
    }

    /// Shallow equality: primitives by value, nested values by identity
    pub fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => numbers_equal(a, b),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Nested(a), Self::Nested(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Content equality: nested values compared by their JSON
    pub fn deep_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nested(a), Self::Nested(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => self.shallow_eq(other),
        }
    }

    /// Convert back into a plain JSON value
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Nested(v) => (**v).clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, Self::Nested(_))
    }
}

// JSON numbers are a single numeric domain on the wire, so `1` and `1.0` match.
// Two integers compare exactly.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if a == b {
        return true;
    }
    if !a.is_f64() && !b.is_f64() {
        return false;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::nested(nested),
        }
    }
}

impl From<Arc<Value>> for FieldValue {
    fn from(value: Arc<Value>) -> Self {
        Self::Nested(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        // Non-finite floats have no JSON representation
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

/// Protocol-agnostic bridge message
#[derive(Debug, Clone)]
pub struct Message {
    kind: String,
    fields: BTreeMap<String, FieldValue>,
}

impl Message {
    /// Create a message with only a discriminant
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Create the paired reply for a request, e.g. `test` -> `testResponse`
    pub fn reply_to(request: &Message, suffix: &str) -> Self {
        Self::new(reply_type(&request.kind, suffix))
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a field, returning the previous value.
    ///
    /// Inserting under `type` replaces the discriminant when the value is a
    /// string and is ignored otherwise.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        let name = name.into();
        let value = value.into();
        if name == TYPE_FIELD {
            return match value {
                FieldValue::String(kind) => Some(FieldValue::String(std::mem::replace(
                    &mut self.kind,
                    kind,
                ))),
                other => {
                    tracing::warn!(value = ?other, "Ignoring non-string message discriminant");
                    None
                }
            };
        }
        self.fields.insert(name, value)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Message discriminant
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Iterate the non-discriminant fields in key order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of keys on the wire, discriminant included
    pub fn key_count(&self) -> usize {
        self.fields.len() + 1
    }

    /// Same key set and shallowly equal values for every key
    pub fn shallow_eq(&self, other: &Message) -> bool {
        self.kind == other.kind
            && self.fields.len() == other.fields.len()
            && self.fields.iter().all(|(name, value)| {
                other
                    .fields
                    .get(name)
                    .is_some_and(|theirs| value.shallow_eq(theirs))
            })
    }

    /// Whether any field holds an object or array
    pub fn has_nested(&self) -> bool {
        self.fields.values().any(FieldValue::is_nested)
    }

    /// Same key set and equal content for every key, nested values included
    pub fn deep_eq(&self, other: &Message) -> bool {
        self.kind == other.kind
            && self.fields.len() == other.fields.len()
            && self.fields.iter().all(|(name, value)| {
                other
                    .fields
                    .get(name)
                    .is_some_and(|theirs| value.deep_eq(theirs))
            })
    }

    /// Render as a JSON object
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.key_count());
        map.insert(TYPE_FIELD.to_string(), Value::String(self.kind.clone()));
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_value());
        }
        Value::Object(map)
    }

    /// Parse a JSON object carrying a string `type`
    pub fn from_value(value: Value) -> Result<Self, BridgeError> {
        let Value::Object(map) = value else {
            return Err(BridgeError::invalid_message("message is not a JSON object"));
        };

        let mut kind = None;
        let mut fields = BTreeMap::new();
        for (name, value) in map {
            if name == TYPE_FIELD {
                match value {
                    Value::String(s) => kind = Some(s),
                    _ => {
                        return Err(BridgeError::invalid_message(
                            "message `type` is not a string",
                        ))
                    }
                }
            } else {
                fields.insert(name, FieldValue::from(value));
            }
        }

        let kind = kind.ok_or_else(|| BridgeError::invalid_message("message has no `type`"))?;
        Ok(Self { kind, fields })
    }
}

impl TryFrom<Value> for Message {
    type Error = BridgeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<&Message> for Value {
    fn from(message: &Message) -> Self {
        message.to_value()
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.key_count()))?;
        map.serialize_entry(TYPE_FIELD, &self.kind)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, &value.to_value())?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_round_trips_through_json() {
        let msg = Message::new("test")
            .with_field("message", "hello")
            .with_field("count", 3i64);

        let value = msg.to_value();
        assert_eq!(value, json!({"type": "test", "message": "hello", "count": 3}));

        let parsed = Message::from_value(value).unwrap();
        assert_eq!(parsed.kind(), "test");
        assert!(parsed.shallow_eq(&msg));
    }

    #[test]
    fn test_from_value_rejects_malformed() {
        assert!(Message::from_value(json!("nope")).is_err());
        assert!(Message::from_value(json!({"message": "hi"})).is_err());
        assert!(Message::from_value(json!({"type": 7})).is_err());
    }

    #[test]
    fn test_shallow_equality_rules() {
        let a = Message::new("test").with_field("message", "hello");
        let b = Message::new("test").with_field("message", "hello");
        assert!(a.shallow_eq(&b));

        // Different discriminant, value, or key set
        assert!(!a.shallow_eq(&Message::new("other").with_field("message", "hello")));
        assert!(!a.shallow_eq(&Message::new("test").with_field("message", "bye")));
        assert!(!a.shallow_eq(&b.clone().with_field("extra", true)));
    }

    #[test]
    fn test_nested_fields_compare_by_reference() {
        let shared = Arc::new(json!({"id": 1}));
        let a = Message::new("lookup").with_field("filter", shared.clone());
        let b = Message::new("lookup").with_field("filter", shared);
        assert!(a.shallow_eq(&b));

        // Same content, separate allocation
        let c = Message::new("lookup").with_field("filter", json!({"id": 1}));
        assert!(!a.shallow_eq(&c));
    }

    #[test]
    fn test_numbers_compare_numerically() {
        let a = Message::new("n").with_field("v", 1i64);
        let b = Message::new("n").with_field("v", 1.0f64);
        assert!(a.shallow_eq(&b));
    }

    #[test]
    fn test_type_field_insertion() {
        let mut msg = Message::new("first");
        msg.insert(TYPE_FIELD, "second");
        assert_eq!(msg.kind(), "second");

        msg.insert(TYPE_FIELD, 5i64);
        assert_eq!(msg.kind(), "second");
        assert_eq!(msg.key_count(), 1);
    }

    #[test]
    fn test_reply_pairing() {
        let request = Message::new("test");
        let reply = Message::reply_to(&request, DEFAULT_REPLY_SUFFIX);
        assert_eq!(reply.kind(), "testResponse");
        assert_eq!(reply_type("ping", "Ack"), "pingAck");
    }

    #[test]
    fn test_serialize_matches_to_value() {
        let msg = Message::new("test").with_field("list", json!([1, 2]));
        let serialized = serde_json::to_value(&msg).unwrap();
        assert_eq!(serialized, msg.to_value());
    }
}
