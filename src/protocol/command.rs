//! Outbound commands.
//!
//! Commands are flat JSON objects keyed by `command`, with no wrapper and no
//! correlation identifier:
//!
//! ```json
//! {"command":"ping"}
//! {"command":"overlayStateChanged","open":true}
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

// ============================================================================
// Command Names
// ============================================================================

/// Liveness check.
pub const PING: &str = "ping";

/// Overlay visibility changed.
pub const OVERLAY_STATE_CHANGED: &str = "overlayStateChanged";

// ============================================================================
// Command
// ============================================================================

/// A command sent to the companion.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `{"command":"ping"}`
    Ping,

    /// `{"command":"overlayStateChanged","open":<bool>}`
    OverlayStateChanged {
        /// Whether the overlay is now visible.
        open: bool,
    },

    /// Any other command with caller-supplied fields.
    Custom {
        /// Command name.
        name: String,
        /// Extra top-level fields.
        fields: Map<String, Value>,
    },
}

impl Command {
    /// Creates a custom command.
    #[inline]
    #[must_use]
    pub fn custom(name: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self::Custom {
            name: name.into(),
            fields,
        }
    }

    /// Returns the command name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ping => PING,
            Self::OverlayStateChanged { .. } => OVERLAY_STATE_CHANGED,
            Self::Custom { name, .. } => name,
        }
    }

    /// Returns the extra fields merged next to `command`.
    #[must_use]
    pub fn fields(&self) -> Map<String, Value> {
        match self {
            Self::Ping => Map::new(),
            Self::OverlayStateChanged { open } => {
                let mut fields = Map::new();
                fields.insert("open".to_string(), Value::Bool(*open));
                fields
            }
            Self::Custom { fields, .. } => fields.clone(),
        }
    }

    /// Encodes the command as a minified JSON text frame.
    #[inline]
    #[must_use]
    pub fn encode(&self) -> String {
        encode(self.name(), &self.fields())
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes `{"command": command, ...fields}` as minified JSON.
///
/// Caller fields are applied after `command`, so a `command` key in `fields`
/// replaces it.
#[must_use]
pub fn encode(command: &str, fields: &Map<String, Value>) -> String {
    let mut object = Map::with_capacity(fields.len() + 1);
    object.insert("command".to_string(), Value::String(command.to_string()));
    object.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));

    // Display on a Value cannot fail and is minified.
    Value::Object(object).to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ping_frame() {
        assert_eq!(Command::Ping.encode(), r#"{"command":"ping"}"#);
    }

    #[test]
    fn test_overlay_state_frame() {
        let frame = Command::OverlayStateChanged { open: true }.encode();
        assert_eq!(frame, r#"{"command":"overlayStateChanged","open":true}"#);
    }

    #[test]
    fn test_custom_command() {
        let Value::Object(fields) = json!({"volume": 3, "muted": false}) else {
            unreachable!()
        };
        let command = Command::custom("setVolume", fields);

        assert_eq!(command.name(), "setVolume");
        let parsed: Value = serde_json::from_str(&command.encode()).expect("json");
        assert_eq!(
            parsed,
            json!({"command": "setVolume", "volume": 3, "muted": false})
        );
    }

    #[test]
    fn test_encode_is_minified() {
        let Value::Object(fields) = json!({"nested": {"a": [1, 2]}}) else {
            unreachable!()
        };
        let frame = encode("x", &fields);
        assert!(!frame.contains(' '));
        assert!(!frame.contains('\n'));
    }

    #[test]
    fn test_fields_override_command_key() {
        let Value::Object(fields) = json!({"command": "other"}) else {
            unreachable!()
        };
        let parsed: Value = serde_json::from_str(&encode("first", &fields)).expect("json");
        assert_eq!(parsed, json!({"command": "other"}));
    }
}
