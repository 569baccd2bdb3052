//! Domain layer - Devices, state slots and topic routing with no transport dependencies
//!
//! This crate contains:
//! - Entities (Entity, Switch, Sensor, BinarySensor)
//! - Value Objects (EntityId, ComponentKind, TopicNamespace)
//! - State slots and their registry
//! - Messaging ports (MessagingClient, MessageHandler)
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Validation and change rules enforced at domain level
//! - Testable in isolation

pub mod device;
pub mod error;
pub mod messaging;
pub mod slot;
pub mod topic;

// Re-export commonly used types
pub use device::{
    BinarySensor, BindableDevice, ComponentKind, Device, DiscoveryTarget, Entity, EntityId,
    Sensor, SlotHandle, Switch,
};
pub use error::{DomainError, Result};
pub use messaging::{ConnectionEvent, ConnectionState, InboundMessage, MessageHandler, MessagingClient};
pub use slot::{CommandOutcome, SlotChange, SlotExposure, SlotOptions};
pub use topic::{TopicNamespace, base_topic};
