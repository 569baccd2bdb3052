use serde_json::{Map, Value};

use super::{ComponentKind, DefaultSlots, Device, Entity, STATE_SLOT};
use crate::error::Result;
use crate::slot::SlotOptions;

/// An on/off condition reported to the hub.
///
/// Publish-only like [`super::Sensor`], but its state is restricted to
/// `payload_on` / `payload_off`.
#[derive(Debug, Clone)]
pub struct BinarySensor {
    device_class: Option<String>,
    payload_on: String,
    payload_off: String,
}

impl BinarySensor {
    pub fn new() -> Self {
        Self {
            device_class: None,
            payload_on: "ON".to_string(),
            payload_off: "OFF".to_string(),
        }
    }

    pub fn entity(name: impl Into<String>, entity_id: impl Into<String>) -> Result<Entity<Self>> {
        Entity::new(Self::new(), name, entity_id)
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = Some(device_class.into());
        self
    }

    pub fn with_payloads(mut self, on: impl Into<String>, off: impl Into<String>) -> Self {
        self.payload_on = on.into();
        self.payload_off = off.into();
        self
    }

    pub fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }

    pub fn payload_on(&self) -> &str {
        &self.payload_on
    }

    pub fn payload_off(&self) -> &str {
        &self.payload_off
    }
}

impl Default for BinarySensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for BinarySensor {
    fn component(&self) -> ComponentKind {
        ComponentKind::BinarySensor
    }

    fn base_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("payload_on".to_string(), Value::from(self.payload_on.clone()));
        config.insert("payload_off".to_string(), Value::from(self.payload_off.clone()));
        if let Some(device_class) = &self.device_class {
            config.insert("device_class".to_string(), Value::from(device_class.clone()));
        }
        config
    }

    fn register_default_slots(&self, slots: &mut DefaultSlots<'_>) -> Result<()> {
        slots.add(STATE_SLOT, SlotOptions::new().state_topic("state", "state_topic"))?;
        Ok(())
    }

    fn is_valid(&self, slot: &str, value: &str) -> bool {
        slot != STATE_SLOT || value == self.payload_on || value == self.payload_off
    }
}
