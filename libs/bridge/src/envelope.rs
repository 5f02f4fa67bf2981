//! Error Envelope
//!
//! Wire shape used to report a resolver failure across the channel:
//! `{ "type": "error", "message": "...", "stack": "..." }`. The `error`
//! discriminant is reserved and never a valid application reply.

use crate::message::TYPE_FIELD;
use serde_json::{Map, Value};
use std::any::Any;

/// Reserved discriminant for error envelopes
pub const ERROR_TYPE: &str = "error";

/// Message used when the failure carries no descriptive text
pub const FALLBACK_ERROR_MESSAGE: &str = "An error occurred";

/// Structured, lossy description of a remote failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, stack: Option<String>) -> Self {
        Self {
            message: message.into(),
            stack,
        }
    }

    /// Envelope for a descriptive resolver error.
    ///
    /// The stack is the rendered error chain, followed by a backtrace when one
    /// was captured.
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            stack: Some(format!("Error: {:?}", error)),
        }
    }

    /// Envelope for a failure without descriptive text
    pub fn opaque() -> Self {
        Self {
            message: FALLBACK_ERROR_MESSAGE.to_string(),
            stack: None,
        }
    }

    /// Envelope for a resolver that panicked.
    ///
    /// Panic payloads are not error values, so only the fallback text crosses
    /// the boundary.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        tracing::warn!(panic = ?detail, "Resolver panicked");
        Self::opaque()
    }

    /// Interpret a response value as an envelope, if it carries the error
    /// discriminant
    pub fn from_response(response: &Value) -> Option<Self> {
        let object = response.as_object()?;
        if object.get(TYPE_FIELD).and_then(Value::as_str) != Some(ERROR_TYPE) {
            return None;
        }

        let message = object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(FALLBACK_ERROR_MESSAGE)
            .to_string();
        let stack = object
            .get("stack")
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self { message, stack })
    }

    /// Render the wire shape; `stack` is omitted when absent
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(TYPE_FIELD.to_string(), Value::String(ERROR_TYPE.to_string()));
        map.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(stack) = &self.stack {
            map.insert("stack".to_string(), Value::String(stack.clone()));
        }
        Value::Object(map)
    }
}

/// Check whether a response carries the reserved error discriminant
pub fn is_error_response(response: &Value) -> bool {
    response.get(TYPE_FIELD).and_then(Value::as_str) == Some(ERROR_TYPE)
}
