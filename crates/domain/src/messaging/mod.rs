//! Ports towards the publish/subscribe transport
//!
//! The domain never talks to a broker directly. Infrastructure provides a
//! [`MessagingClient`] and the domain hands it [`MessageHandler`]s for the
//! command topics it wants routed back.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::slot::CommandOutcome;

mod connection_state;

pub use connection_state::ConnectionState;

/// A message delivered by the broker on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload decoded as UTF-8, replacing invalid sequences
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Transport lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConnectionEvent {
    /// Broker acknowledged the connection
    Connected,
    /// Broker refused the connection or the socket could not be opened
    ConnectionFailed { reason: String },
    /// Established session was lost
    Disconnected,
}

/// Receives messages routed from a subscribed topic
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> Result<CommandOutcome>;
}

/// Publish/subscribe surface of a connected broker session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Publish a raw payload
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()>;

    /// Subscribe to an exact topic and route its messages to `handler`.
    ///
    /// Subscribing the same topic again replaces the previous handler.
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()>;

    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_str_decodes_utf8() {
        let message = InboundMessage::new("a/b/command", "ON");
        assert_eq!(message.payload_str(), "ON");
    }

    #[test]
    fn test_payload_str_is_lossy() {
        let message = InboundMessage::new("a/b/command", vec![0x4f, 0xff]);
        assert_eq!(message.payload_str(), "O\u{fffd}");
    }

    #[test]
    fn test_connection_event_serialization() {
        let event = ConnectionEvent::ConnectionFailed {
            reason: "refused".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ConnectionFailed");
        assert_eq!(json["reason"], "refused");
    }
}
