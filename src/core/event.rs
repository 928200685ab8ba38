//! Telemetry event record and its wire form

use serde::{Deserialize, Serialize};

/// A single device notification, republished to every live subscriber.
///
/// Serialized as one JSON object per line on the subscriber wire:
/// `{"port":"P1","value":"42"}`. The value is forwarded verbatim as the
/// text the device reported; events are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Device-side port identifier (e.g. "P1")
    pub port: String,
    /// Reported value, as received from the device
    pub value: String,
}

impl Event {
    /// Create a new event
    pub fn new(port: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_stable_wire_shape() {
        let event = Event::new("P1", "42");
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"port":"P1","value":"42"}"#
        );
    }

    #[test]
    fn round_trips_through_json() {
        let event = Event::new("P2", "on");
        let parsed: Event = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(parsed, event);
    }
}
