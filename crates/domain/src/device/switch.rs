use serde_json::{Map, Value};

use super::{ComponentKind, DefaultSlots, Device, Entity, STATE_SLOT};
use crate::error::Result;
use crate::slot::{ChangeHook, SlotChange, SlotOptions};

/// A switch the hub can read and toggle.
///
/// Declares one `state` slot published on `state` and commanded on `command`.
/// Only `payload_on` / `payload_off` are accepted, from either direction.
/// An accepted command is echoed on `state` so the hub sees the switch follow.
#[derive(Clone)]
pub struct Switch {
    payload_on: String,
    payload_off: String,
    on_change: Option<ChangeHook>,
}

impl Switch {
    pub fn new() -> Self {
        Self {
            payload_on: "ON".to_string(),
            payload_off: "OFF".to_string(),
            on_change: None,
        }
    }

    /// Wrap a default switch into an entity
    pub fn entity(name: impl Into<String>, entity_id: impl Into<String>) -> Result<Entity<Self>> {
        Entity::new(Self::new(), name, entity_id)
    }

    pub fn with_payloads(mut self, on: impl Into<String>, off: impl Into<String>) -> Self {
        self.payload_on = on.into();
        self.payload_off = off.into();
        self
    }

    /// React to commands from the hub. The hook runs before the new state is stored.
    pub fn with_on_change(
        mut self,
        hook: impl Fn(&SlotChange<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.on_change = Some(std::sync::Arc::new(hook));
        self
    }

    pub fn payload_on(&self) -> &str {
        &self.payload_on
    }

    pub fn payload_off(&self) -> &str {
        &self.payload_off
    }
}

impl Default for Switch {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Switch {
    fn component(&self) -> ComponentKind {
        ComponentKind::Switch
    }

    fn base_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("payload_on".to_string(), Value::from(self.payload_on.clone()));
        config.insert("payload_off".to_string(), Value::from(self.payload_off.clone()));
        config
    }

    fn register_default_slots(&self, slots: &mut DefaultSlots<'_>) -> Result<()> {
        slots.add(
            STATE_SLOT,
            SlotOptions::new()
                .state_topic("state", "state_topic")
                .command_topic("command", "command_topic")
                .echo_state(true)
                .change_hook(self.on_change.clone()),
        )?;
        Ok(())
    }

    fn is_valid(&self, slot: &str, value: &str) -> bool {
        slot != STATE_SLOT || value == self.payload_on || value == self.payload_off
    }
}
