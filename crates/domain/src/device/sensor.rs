use serde_json::{Map, Value};

use super::{ComponentKind, DefaultSlots, Device, Entity, STATE_SLOT};
use crate::error::Result;
use crate::slot::SlotOptions;

/// A read-only value reported to the hub on `state`
#[derive(Debug, Clone, Default)]
pub struct Sensor {
    unit_of_measurement: Option<String>,
    device_class: Option<String>,
}

impl Sensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(name: impl Into<String>, entity_id: impl Into<String>) -> Result<Entity<Self>> {
        Entity::new(Self::new(), name, entity_id)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measurement = Some(unit.into());
        self
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = Some(device_class.into());
        self
    }

    pub fn unit_of_measurement(&self) -> Option<&str> {
        self.unit_of_measurement.as_deref()
    }

    pub fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }
}

impl Device for Sensor {
    fn component(&self) -> ComponentKind {
        ComponentKind::Sensor
    }

    fn base_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        if let Some(unit) = &self.unit_of_measurement {
            config.insert("unit_of_measurement".to_string(), Value::from(unit.clone()));
        }
        if let Some(device_class) = &self.device_class {
            config.insert("device_class".to_string(), Value::from(device_class.clone()));
        }
        config
    }

    fn register_default_slots(&self, slots: &mut DefaultSlots<'_>) -> Result<()> {
        slots.add(STATE_SLOT, SlotOptions::new().state_topic("state", "state_topic"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DiscoveryTarget;
    use crate::messaging::MockMessagingClient;
    use crate::slot::CommandOutcome;
    use std::sync::Arc;

    #[test]
    fn test_base_config_only_lists_set_fields() {
        assert!(Sensor::new().base_config().is_empty());

        let config = Sensor::new()
            .with_unit("°C")
            .with_device_class("temperature")
            .base_config();
        assert_eq!(config["unit_of_measurement"], "°C");
        assert_eq!(config["device_class"], "temperature");
    }

    #[tokio::test]
    async fn test_sensor_is_publish_only() {
        let mut client = MockMessagingClient::new();
        client.expect_subscribe().never();
        client
            .expect_publish()
            .withf(|topic, _, _| topic == "homeassistant/sensor/temp/config")
            .times(1)
            .returning(|_, _, _| Ok(()));
        client
            .expect_publish()
            .withf(|topic, payload, _| topic == "homeassistant/sensor/temp/state" && payload == b"21.5")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let sensor = Sensor::entity("Temperature", "temp").unwrap();
        sensor
            .connect(Arc::new(client), &DiscoveryTarget::default())
            .await
            .unwrap();

        let config = sensor.discovery_config().await.unwrap();
        assert_eq!(config["state_topic"], "homeassistant/sensor/temp/state");
        assert!(config.get("command_topic").is_none());

        sensor.set(STATE_SLOT, "21.5").await.unwrap();
        assert_eq!(
            sensor.handle_command(STATE_SLOT, "99").await.unwrap(),
            CommandOutcome::NotCommandable
        );
        assert_eq!(sensor.get(STATE_SLOT).await.unwrap().as_deref(), Some("21.5"));
    }
}
