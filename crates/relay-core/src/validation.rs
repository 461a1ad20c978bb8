//! Validation of inbound `/chat` payloads.
//!
//! Rules are applied in a fixed order and the first failing rule decides the
//! message returned to the client. Emptiness follows JSON-client truthiness:
//! `null`, `false`, `0`, and `""` all count as missing.

use crate::error::{RelayError, RelayResult};
use crate::message::{ChatMessage, Role};
use serde_json::Value;

/// Validate an untyped request body into an ordered message sequence.
///
/// The returned messages preserve the input order exactly.
pub fn validate_chat_request(body: &Value) -> RelayResult<Vec<ChatMessage>> {
    let Some(object) = body.as_object() else {
        return Err(invalid("Request body must be a JSON object"));
    };

    let Some(entries) = object.get("messages").and_then(Value::as_array) else {
        return Err(invalid("Request must include 'messages' array"));
    };

    if entries.is_empty() {
        return Err(invalid("Messages array cannot be empty"));
    }

    let mut messages = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let role = entry.get("role").filter(|v| is_present(v));
        let content = entry.get("content").filter(|v| is_present(v));
        let (Some(role), Some(content)) = (role, content) else {
            return Err(invalid(format!(
                "Message at index {i} missing 'role' or 'content'"
            )));
        };

        let Some(role) = role.as_str().and_then(Role::parse) else {
            return Err(invalid(format!(
                "Invalid role '{}' at index {i}. Must be 'system', 'user', or 'assistant'",
                display_value(role)
            )));
        };

        let Some(content) = content.as_str() else {
            return Err(invalid(format!("Content at index {i} must be a string")));
        };

        messages.push(ChatMessage::new(role, content));
    }

    Ok(messages)
}

fn invalid(message: impl Into<String>) -> RelayError {
    RelayError::Validation(message.into())
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
