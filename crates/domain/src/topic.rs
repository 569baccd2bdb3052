//! Topic namespace for discovered devices
//!
//! Every device lives under `{prefix}/{component}/[{node_id}/]{entity_id}`.
//! The discovery document goes to `{base}/config` and each state slot's
//! relative topics are appended to the same base.

use crate::device::{ComponentKind, EntityId};
use crate::error::{DomainError, Result};

/// Discovery prefix Home Assistant listens on unless configured otherwise
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Join the present segments of a device's base topic with `/`.
///
/// Fails with [`DomainError::NotReady`] while no discovery prefix is assigned.
pub fn base_topic(
    prefix: Option<&str>,
    component: ComponentKind,
    node_id: Option<&str>,
    entity_id: &EntityId,
) -> Result<String> {
    let prefix = prefix.ok_or(DomainError::NotReady)?;

    let segments = [
        Some(prefix),
        Some(component.as_str()),
        node_id,
        Some(entity_id.as_str()),
    ];

    Ok(segments.into_iter().flatten().collect::<Vec<_>>().join("/"))
}

/// Topic namespace of a single device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamespace {
    discovery_prefix: Option<String>,
    component: ComponentKind,
    node_id: Option<String>,
    entity_id: EntityId,
}

impl TopicNamespace {
    /// Namespace with no discovery prefix yet; resolving topics fails until one is set
    pub fn new(component: ComponentKind, entity_id: EntityId) -> Self {
        Self {
            discovery_prefix: None,
            component,
            node_id: None,
            entity_id,
        }
    }

    pub fn with_discovery_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.discovery_prefix = Some(prefix.into());
        self
    }

    pub fn with_node_id(mut self, node_id: Option<String>) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn discovery_prefix(&self) -> Option<&str> {
        self.discovery_prefix.as_deref()
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub fn component(&self) -> ComponentKind {
        self.component
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn base_topic(&self) -> Result<String> {
        base_topic(
            self.discovery_prefix.as_deref(),
            self.component,
            self.node_id.as_deref(),
            &self.entity_id,
        )
    }

    pub fn config_topic(&self) -> Result<String> {
        self.expand("config")
    }

    /// Absolute topic for a slot's relative topic
    pub fn expand(&self, relative: &str) -> Result<String> {
        Ok(format!("{}/{}", self.base_topic()?, relative))
    }

    /// Identifier the hub uses to track the entity across restarts
    pub fn unique_id(&self) -> String {
        match &self.node_id {
            Some(node_id) => format!("{}_{}", node_id, self.entity_id),
            None => self.entity_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar() -> EntityId {
        EntityId::new("bar").unwrap()
    }

    #[test]
    fn test_base_topic_requires_prefix() {
        let result = base_topic(None, ComponentKind::Switch, None, &bar());
        assert_eq!(result.unwrap_err(), DomainError::NotReady);
    }

    #[test]
    fn test_base_topic_without_node_id() {
        let topic = base_topic(Some("homeassistant"), ComponentKind::Switch, None, &bar()).unwrap();
        assert_eq!(topic, "homeassistant/switch/bar");
    }

    #[test]
    fn test_base_topic_with_node_id() {
        let topic = base_topic(
            Some("homeassistant"),
            ComponentKind::Switch,
            Some("testserver"),
            &bar(),
        )
        .unwrap();
        assert_eq!(topic, "homeassistant/switch/testserver/bar");
    }

    #[test]
    fn test_base_topic_keeps_segment_order() {
        let topic = base_topic(
            Some("ha"),
            ComponentKind::BinarySensor,
            Some("node"),
            &EntityId::new("door").unwrap(),
        )
        .unwrap();
        assert_eq!(topic, "ha/binary_sensor/node/door");
    }

    #[test]
    fn test_namespace_scenario() {
        let namespace = TopicNamespace::new(ComponentKind::Switch, bar());
        assert_eq!(namespace.base_topic().unwrap_err(), DomainError::NotReady);
        assert_eq!(namespace.config_topic().unwrap_err(), DomainError::NotReady);

        let namespace = namespace.with_discovery_prefix(DEFAULT_DISCOVERY_PREFIX);
        assert_eq!(namespace.base_topic().unwrap(), "homeassistant/switch/bar");

        let namespace = namespace.with_node_id(Some("testserver".to_string()));
        assert_eq!(
            namespace.base_topic().unwrap(),
            "homeassistant/switch/testserver/bar"
        );
        assert_eq!(
            namespace.config_topic().unwrap(),
            "homeassistant/switch/testserver/bar/config"
        );
        assert_eq!(
            namespace.expand("command").unwrap(),
            "homeassistant/switch/testserver/bar/command"
        );
    }

    #[test]
    fn test_unique_id() {
        let namespace = TopicNamespace::new(ComponentKind::Sensor, bar());
        assert_eq!(namespace.unique_id(), "bar");
        let namespace = namespace.with_node_id(Some("host1".to_string()));
        assert_eq!(namespace.unique_id(), "host1_bar");
    }
}
