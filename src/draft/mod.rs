use serde_json::Value;
use thiserror::Error;

use crate::protocol::MessagePayload;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("event type is required")]
    MissingEventType,
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A message as typed by the user, before it is checked and sent.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub event_type: String,
    pub payload_text: String,
    pub channels: Vec<String>,
}

impl MessageDraft {
    pub fn validate(&self) -> Result<MessagePayload, DraftError> {
        let event_type = self.event_type.trim();
        if event_type.is_empty() {
            return Err(DraftError::MissingEventType);
        }

        let payload: Value = serde_json::from_str(&self.payload_text)
            .map_err(|err| DraftError::InvalidJson(err.to_string()))?;
        if !payload.is_object() {
            return Err(DraftError::NotAnObject(json_kind(&payload)));
        }

        let channels: Vec<String> = self
            .channels
            .iter()
            .map(|channel| channel.trim())
            .filter(|channel| !channel.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        Ok(MessagePayload {
            event_type: event_type.to_string(),
            payload,
            channels: if channels.is_empty() {
                None
            } else {
                Some(channels)
            },
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
