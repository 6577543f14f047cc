//! Line codec for the collector protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors produced while encoding or decoding a line.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The line is not valid JSON.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    /// The line is valid JSON but not an object.
    #[error("expected a json object, got {0}")]
    NotAnObject(&'static str),
}

/// Event envelope exchanged with the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Event name.
    pub evt: String,
    /// Positional arguments, in order.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Packet {
    /// Create a packet from an event name and its arguments.
    pub fn new(evt: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            evt: evt.into(),
            args,
        }
    }
}

/// An inbound line, classified on its reserved keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `{"error": ...}`: application-level failure reported by the collector.
    Error(String),
    /// `{"evt": ...}`: control or event message.
    Event(Packet),
    /// Any other object, kept for passive observation.
    Message(Value),
}

/// Encode an event and its arguments as a single line (without the trailing newline).
pub fn encode(evt: &str, args: &[Value]) -> Result<String, CodecError> {
    #[derive(Serialize)]
    struct Envelope<'a> {
        evt: &'a str,
        args: &'a [Value],
    }

    // serde_json escapes control characters, so the output never spans lines.
    Ok(serde_json::to_string(&Envelope { evt, args })?)
}

/// Decode one non-blank line into a classified message.
pub fn decode(line: &str) -> Result<Inbound, CodecError> {
    let value: Value = serde_json::from_str(line)?;
    let Value::Object(mut fields) = value else {
        return Err(CodecError::NotAnObject(json_kind(&value)));
    };

    if let Some(err) = fields.remove("error") {
        let message = match err {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Ok(Inbound::Error(message));
    }

    // An event needs a string `evt` and, if present, an array `args`.
    // Any other shape is passed through untouched.
    let evt = match fields.get("evt") {
        Some(Value::String(evt)) => evt.clone(),
        _ => return Ok(Inbound::Message(Value::Object(fields))),
    };
    let args = match fields.get("args") {
        None => Vec::new(),
        Some(Value::Array(args)) => args.clone(),
        Some(_) => return Ok(Inbound::Message(Value::Object(fields))),
    };
    Ok(Inbound::Event(Packet { evt, args }))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
