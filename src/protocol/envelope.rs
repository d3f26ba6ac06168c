//! Inbound message envelope and decoder.
//!
//! Frames from the companion carry no discriminant tag. The shape is
//! recognised by field presence:
//!
//! | Shape | Recognised by | Routed to |
//! |-------|---------------|-----------|
//! | Event push | string `type` | event named by `type` |
//! | Response | non-null `success` | [`RESPONSE_EVENT`] |
//!
//! `type` is checked first, so a frame carrying both is an event push.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Reserved event name that response frames are emitted under.
pub const RESPONSE_EVENT: &str = "response";

/// Message used when a failed response carries no `error` string.
pub const GENERIC_FAILURE: &str = "Request failed";

// ============================================================================
// DecodeError
// ============================================================================

/// Why an inbound frame could not be routed.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame is JSON but neither an event push nor a response.
    #[error("unroutable frame: no `type` or `success` field")]
    Unroutable,
}

/// Result of decoding one frame.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

// ============================================================================
// Envelope
// ============================================================================

/// A decoded inbound frame.
///
/// Both variants keep the complete frame object as payload, so handlers see
/// exactly what the companion sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Push notification, routed by its `type`.
    Event {
        /// Value of the `type` field.
        name: String,
        /// The whole frame.
        payload: Value,
    },
    /// Answer to the in-flight request.
    Response(Value),
}

impl Envelope {
    /// Returns the event name this envelope is emitted under.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        match self {
            Self::Event { name, .. } => name,
            Self::Response(_) => RESPONSE_EVENT,
        }
    }

    /// Returns the frame payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Value {
        match self {
            Self::Event { payload, .. } | Self::Response(payload) => payload,
        }
    }

    /// Consumes the envelope, returning `(event name, payload)`.
    #[must_use]
    pub fn into_parts(self) -> (String, Value) {
        match self {
            Self::Event { name, payload } => (name, payload),
            Self::Response(payload) => (RESPONSE_EVENT.to_string(), payload),
        }
    }
}

/// Decodes a raw text frame.
///
/// # Errors
///
/// - [`DecodeError::Malformed`] if `raw` is not JSON
/// - [`DecodeError::Unroutable`] if it has neither `type` nor `success`
pub fn decode(raw: &str) -> DecodeResult<Envelope> {
    let value: Value = serde_json::from_str(raw)?;
    classify(value)
}

fn classify(value: Value) -> DecodeResult<Envelope> {
    let Some(object) = value.as_object() else {
        return Err(DecodeError::Unroutable);
    };

    if let Some(name) = object.get("type").and_then(Value::as_str).map(str::to_string) {
        return Ok(Envelope::Event {
            name,
            payload: value,
        });
    }

    let is_response = object.get("success").is_some_and(|success| !success.is_null());
    if is_response {
        Ok(Envelope::Response(value))
    } else {
        Err(DecodeError::Unroutable)
    }
}

// ============================================================================
// Response
// ============================================================================

/// Typed view of a response frame.
///
/// # Format
///
/// ```json
/// { "success": true, "data": { "pong": true, "timestamp": 1700000000 } }
/// { "success": false, "error": "bad" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Response {
    /// Whether the companion handled the command.
    #[serde(default, deserialize_with = "truthy")]
    pub success: bool,

    /// Result data. `Some(Value::Null)` when the key is present as `null`.
    #[serde(default, deserialize_with = "present")]
    pub data: Option<Value>,

    /// Error message (if failed).
    #[serde(default, deserialize_with = "string_or_none")]
    pub error: Option<String>,
}

impl Response {
    /// Builds a response view from a frame payload.
    ///
    /// Never fails: fields of unexpected types are treated as absent.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        Self::deserialize(payload).unwrap_or_default()
    }

    /// Returns `true` if this response carries a usable result.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success && self.data.is_some()
    }

    /// Extracts the result data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] with the peer's `error`, or a generic
    /// message, when `success` is false or `data` is missing.
    pub fn into_result(self) -> Result<Value> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(Error::remote(
                self.error.unwrap_or_else(|| GENERIC_FAILURE.to_string()),
            )),
        }
    }
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn truthy<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_bool().unwrap_or(false))
}

fn string_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?
        .as_str()
        .map(str::to_string))
}

// ============================================================================
// Tests
// ============================================================================
