use std::collections::{BTreeMap, HashSet};

use super::{CommandOutcome, SlotExposure, SlotOptions, StateSlot};
use crate::error::{DomainError, Result};
use crate::topic::TopicNamespace;

/// Per-device mapping of slot name to [`StateSlot`]
#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: BTreeMap<String, StateSlot>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot.
    ///
    /// `reserved_keys` are discovery fields already taken by the device itself;
    /// a slot announcing its topics under one of them, or under a key another
    /// slot already uses, is rejected.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        options: SlotOptions,
        reserved_keys: &HashSet<String>,
    ) -> Result<SlotExposure> {
        let name = name.into();
        if self.slots.contains_key(&name) {
            return Err(DomainError::DuplicateSlot(name));
        }

        let slot = StateSlot::new(name.clone(), options);

        let mut taken = self.config_keys();
        for key in slot.config_keys() {
            if reserved_keys.contains(key) || !taken.insert(key.to_string()) {
                return Err(DomainError::DuplicateConfigKey(key.to_string()));
            }
        }

        let exposure = slot.exposure();
        self.slots.insert(name, slot);
        Ok(exposure)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, name: &str) -> Result<&StateSlot> {
        self.slots
            .get(name)
            .ok_or_else(|| DomainError::UnknownSlot(name.to_string()))
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut StateSlot> {
        self.slots
            .get_mut(name)
            .ok_or_else(|| DomainError::UnknownSlot(name.to_string()))
    }

    /// Cached value of a slot; `None` until something was set or commanded
    pub fn get(&self, name: &str) -> Result<Option<&str>> {
        Ok(self.slot(name)?.value())
    }

    /// Store a locally set value after validating it
    pub fn store(&mut self, name: &str, value: &str, device_accepts: bool) -> Result<()> {
        let slot = self.slot_mut(name)?;
        if !device_accepts || !slot.accepts(value) {
            return Err(DomainError::InvalidValue {
                slot: name.to_string(),
                value: value.to_string(),
            });
        }
        slot.store(value.to_string());
        Ok(())
    }

    /// Route an inbound command to its slot
    pub fn handle_command(
        &mut self,
        name: &str,
        raw: &str,
        device_accepts: bool,
    ) -> Result<CommandOutcome> {
        Ok(self.slot_mut(name)?.apply_command(raw, device_accepts))
    }

    /// Every discovery key used by a slot
    pub fn config_keys(&self) -> HashSet<String> {
        self.slots
            .values()
            .flat_map(|slot| slot.config_keys().map(str::to_string))
            .collect()
    }

    /// Discovery entries: config key to absolute topic
    pub fn config_entries(&self, namespace: &TopicNamespace) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for slot in self.slots.values() {
            for binding in slot.state().into_iter().chain(slot.command()) {
                entries.push((binding.config_key.clone(), namespace.expand(&binding.topic)?));
            }
        }
        Ok(entries)
    }

    /// Absolute command topics with the slot each one feeds
    pub fn command_routes(&self, namespace: &TopicNamespace) -> Result<Vec<(String, String)>> {
        self.slots
            .values()
            .filter_map(|slot| slot.command().map(|binding| (slot.name(), binding)))
            .map(|(name, binding)| Ok((name.to_string(), namespace.expand(&binding.topic)?)))
            .collect()
    }

    /// Absolute state topic of a slot, if it publishes one
    pub fn state_topic(&self, name: &str, namespace: &TopicNamespace) -> Result<Option<String>> {
        match self.slot(name)?.state() {
            Some(binding) => namespace.expand(&binding.topic).map(Some),
            None => Ok(None),
        }
    }
}
