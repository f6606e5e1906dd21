use serde::de::DeserializeOwned;
use serde_json::Value;

/// Body of an inbound frame.
///
/// Chat events arrive as JSON while the ping channel answers in plain text;
/// both share one dispatch path, so every body is tried as JSON first and
/// kept verbatim when that fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structured(Value),
    Raw(String),
}

impl Payload {
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str(body) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::Raw(body.to_string()),
        }
    }

    /// Decode a structured payload into a typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            Self::Structured(value) => T::deserialize(value).ok(),
            Self::Raw(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Raw(text) => Some(text),
            Self::Structured(Value::String(text)) => Some(text),
            Self::Structured(_) => None,
        }
    }
}
