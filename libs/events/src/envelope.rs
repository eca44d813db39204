//! The notification envelope - the common wrapper for every message IIB
//! puts on the bus.
//!
//! Every state transition produces at most two of these: one addressed to
//! the per-request topic, one (only on batch creation or batch termination)
//! addressed to the per-batch topic. The shape is fixed regardless of
//! destination; only `address` and the JSON `body` vary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The message carried inside an envelope.
///
/// `body` is pre-serialized to a `serde_json::Value` rather than kept
/// generic over a payload type: a sender needs to emit mixed request- and
/// batch-shaped bodies down the same connection, and the wire format is
/// always `application/json` regardless of which Rust type produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// A fresh v4 UUID minted per message, not derived from the request.
    pub id: Uuid,

    /// Free-form broker properties. Empty unless a transport needs one.
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub properties: std::collections::HashMap<String, String>,

    pub body: serde_json::Value,

    pub content_type: String,

    pub content_encoding: String,

    /// Durability flag, taken verbatim from `IIB_MESSAGING_DURABLE`.
    pub durable: bool,
}

impl Message {
    pub fn new(body: serde_json::Value, durable: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            properties: std::collections::HashMap::new(),
            body,
            content_type: "application/json".to_string(),
            content_encoding: "utf-8".to_string(),
            durable,
        }
    }
}

/// An addressed notification: where it goes, and what it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// A topic URI, e.g. `topic://VirtualTopic.eng.iib.build.state`.
    pub address: String,
    pub message: Message,
}

impl Envelope {
    pub fn new(address: impl Into<String>, body: impl Serialize, durable: bool) -> Self {
        let body = serde_json::to_value(body).unwrap_or(serde_json::Value::Null);
        Self {
            address: address.into(),
            message: Message::new(body, durable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_content_type_and_encoding() {
        let envelope = Envelope::new("topic://x", serde_json::json!({"a": 1}), true);
        assert_eq!(envelope.message.content_type, "application/json");
        assert_eq!(envelope.message.content_encoding, "utf-8");
        assert!(envelope.message.durable);
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let a = Envelope::new("topic://x", serde_json::json!({}), false);
        let b = Envelope::new("topic://x", serde_json::json!({}), false);
        assert_ne!(a.message.id, b.message.id);
    }
}
