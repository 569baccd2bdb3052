use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use domain::{CommandOutcome, InboundMessage, MessageHandler};
use tracing::{debug, warn};

/// Exact-topic routing table for inbound messages
#[derive(Clone, Default)]
pub struct CommandRoutes {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn MessageHandler>>>>,
}

impl CommandRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `topic` to `handler`. Returns true when a previous handler was replaced.
    pub fn insert(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_string(), handler)
            .is_some()
    }

    pub fn get(&self, topic: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
    }

    pub fn topics(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand a message to the handler of its topic.
    ///
    /// Returns `None` when nothing is routed there or the handler failed.
    pub async fn dispatch(&self, message: &InboundMessage) -> Option<CommandOutcome> {
        let Some(handler) = self.get(&message.topic) else {
            debug!(topic = %message.topic, "No handler for inbound message");
            return None;
        };

        match handler.handle(message).await {
            Ok(outcome) => {
                match &outcome {
                    CommandOutcome::Applied { previous } => {
                        debug!(topic = %message.topic, previous = ?previous, payload = %message.payload_str(), "Command applied")
                    }
                    CommandOutcome::Unchanged => {
                        debug!(topic = %message.topic, "Command ignored: value unchanged")
                    }
                    CommandOutcome::Rejected => {
                        debug!(topic = %message.topic, payload = %message.payload_str(), "Command ignored: invalid value")
                    }
                    CommandOutcome::NotCommandable => {
                        warn!(topic = %message.topic, "Command routed to a slot without command topic")
                    }
                }
                Some(outcome)
            }
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Failed to handle inbound message");
                None
            }
        }
    }
}
