use serde::{Deserialize, Serialize};

use super::ConnectionEvent;

/// Connection state of a broker session as seen by the device host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session yet, or the last one was closed
    #[default]
    Disconnected,
    /// Broker acknowledged the session
    Connected,
    /// Last connection attempt was refused
    Failed,
}

impl ConnectionState {
    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// State after applying a transport event
    pub fn apply(&self, event: &ConnectionEvent) -> Self {
        match event {
            ConnectionEvent::Connected => Self::Connected,
            ConnectionEvent::ConnectionFailed { .. } => Self::Failed,
            ConnectionEvent::Disconnected => Self::Disconnected,
        }
    }
}
