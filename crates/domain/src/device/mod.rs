//! Discoverable devices
//!
//! A [`Device`] describes *what* is exposed to the hub: its component kind, the
//! fixed fields of its discovery document and the slots it declares by default.
//! [`Entity`] wraps a device with everything shared by all kinds: display name,
//! entity id, retain policy, the slot registry and the broker binding.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::messaging::MessagingClient;
use crate::slot::{SlotExposure, SlotOptions, SlotRegistry};
use crate::topic::DEFAULT_DISCOVERY_PREFIX;

mod binary_sensor;
mod component;
mod entity;
mod entity_id;
mod sensor;
mod switch;

pub use binary_sensor::BinarySensor;
pub use component::ComponentKind;
pub use entity::{Entity, SlotHandle};
pub use entity_id::EntityId;
pub use sensor::Sensor;
pub use switch::Switch;

/// Name of the slot every built-in device kind declares
pub const STATE_SLOT: &str = "state";

/// Capabilities of a device kind
pub trait Device: Send + Sync + 'static {
    /// Component the hub routes the discovery document to
    fn component(&self) -> ComponentKind;

    /// Kind-specific discovery fields
    fn base_config(&self) -> Map<String, Value>;

    /// Declare the slots this kind always has. Runs once, when the entity is built.
    fn register_default_slots(&self, slots: &mut DefaultSlots<'_>) -> Result<()>;

    /// Device-wide validation of a slot value
    fn is_valid(&self, _slot: &str, _value: &str) -> bool {
        true
    }
}

/// Slot registration scope handed to [`Device::register_default_slots`]
pub struct DefaultSlots<'a> {
    registry: &'a mut SlotRegistry,
    reserved_keys: &'a HashSet<String>,
}

impl<'a> DefaultSlots<'a> {
    pub(crate) fn new(registry: &'a mut SlotRegistry, reserved_keys: &'a HashSet<String>) -> Self {
        Self {
            registry,
            reserved_keys,
        }
    }

    pub fn add(&mut self, name: &str, options: SlotOptions) -> Result<SlotExposure> {
        self.registry.add(name, options, self.reserved_keys)
    }
}

/// Where a device announces itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryTarget {
    pub prefix: String,
    pub node_id: Option<String>,
}

impl DiscoveryTarget {
    pub fn new(prefix: impl Into<String>, node_id: Option<String>) -> Self {
        Self {
            prefix: prefix.into(),
            node_id,
        }
    }
}

impl Default for DiscoveryTarget {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_PREFIX, None)
    }
}

/// Object-safe view of an [`Entity`] used by hosts that bind many kinds at once
#[async_trait]
pub trait BindableDevice: Send + Sync {
    fn entity_id(&self) -> &EntityId;

    fn component(&self) -> ComponentKind;

    /// Publish the discovery document and subscribe command topics
    async fn connect(
        &self,
        client: Arc<dyn MessagingClient>,
        target: &DiscoveryTarget,
    ) -> Result<()>;
}
