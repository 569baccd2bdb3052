use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{BindableDevice, ComponentKind, DefaultSlots, Device, DiscoveryTarget, EntityId};
use crate::error::{DomainError, Result};
use crate::messaging::{InboundMessage, MessageHandler, MessagingClient};
use crate::slot::{CommandOutcome, SlotExposure, SlotOptions, SlotRegistry};
use crate::topic::TopicNamespace;

/// Discovery fields owned by the entity itself
const BASE_KEYS: [&str; 3] = ["name", "retain", "unique_id"];

type DeviceValidator = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// A device together with its slots and broker binding.
///
/// Starts unbound. [`Entity::connect`] fixes the discovery prefix and node id,
/// subscribes every command topic and publishes the discovery document; the
/// entity only counts as bound once all of that succeeded. Calling it again with
/// the same target republishes and resubscribes; there is no way back to unbound.
pub struct Entity<D: Device> {
    device: Arc<D>,
    core: Arc<EntityCore>,
}

impl<D: Device> Clone for Entity<D> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            core: self.core.clone(),
        }
    }
}

struct EntityCore {
    name: String,
    entity_id: EntityId,
    component: ComponentKind,
    retain: bool,
    validator: DeviceValidator,
    state: Mutex<EntityState>,
}

struct EntityState {
    slots: SlotRegistry,
    namespace: TopicNamespace,
    client: Option<Arc<dyn MessagingClient>>,
}

impl EntityState {
    fn is_bound(&self) -> bool {
        self.client.is_some()
    }
}

impl<D: Device> Entity<D> {
    /// Wrap a device and declare its default slots. Discovery and state are retained.
    pub fn new(device: D, name: impl Into<String>, entity_id: impl Into<String>) -> Result<Self> {
        Self::new_with_retain(device, name, entity_id, true)
    }

    /// Like [`Entity::new`] with an explicit retain flag for discovery and state publishes
    pub fn new_with_retain(
        device: D,
        name: impl Into<String>,
        entity_id: impl Into<String>,
        retain: bool,
    ) -> Result<Self> {
        let entity_id = EntityId::new(entity_id)?;
        let device = Arc::new(device);
        let component = device.component();

        let mut slots = SlotRegistry::new();
        let reserved = reserved_keys(device.as_ref());
        device.register_default_slots(&mut DefaultSlots::new(&mut slots, &reserved))?;

        let validating = device.clone();
        let validator: DeviceValidator =
            Arc::new(move |slot: &str, value: &str| validating.is_valid(slot, value));

        let core = EntityCore {
            name: name.into(),
            entity_id: entity_id.clone(),
            component,
            retain,
            validator,
            state: Mutex::new(EntityState {
                slots,
                namespace: TopicNamespace::new(component, entity_id),
                client: None,
            }),
        };

        Ok(Self {
            device,
            core: Arc::new(core),
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.core.entity_id
    }

    pub fn component(&self) -> ComponentKind {
        self.core.component
    }

    pub fn retain(&self) -> bool {
        self.core.retain
    }

    pub async fn is_bound(&self) -> bool {
        self.core.state.lock().await.is_bound()
    }

    pub async fn namespace(&self) -> TopicNamespace {
        self.core.state.lock().await.namespace.clone()
    }

    pub async fn base_topic(&self) -> Result<String> {
        self.core.state.lock().await.namespace.base_topic()
    }

    pub async fn config_topic(&self) -> Result<String> {
        self.core.state.lock().await.namespace.config_topic()
    }

    /// Register a slot and return a handle to it.
    ///
    /// When the entity is already bound the slot's command topic is subscribed
    /// and the discovery document is republished to announce it.
    pub async fn add_state(&self, name: &str, options: SlotOptions) -> Result<SlotHandle> {
        let mut state = self.core.state.lock().await;
        let reserved = reserved_keys(self.device.as_ref());
        let exposure = state.slots.add(name, options, &reserved)?;

        if let Some(client) = state.client.clone() {
            let namespace = state.namespace.clone();
            if let Some(binding) = state.slots.slot(name)?.command() {
                let topic = namespace.expand(&binding.topic)?;
                client.subscribe(&topic, self.route(name)).await?;
            }
            self.publish_config(&state.slots, &state.namespace, client.as_ref())
                .await?;
        }

        Ok(SlotHandle {
            core: self.core.clone(),
            name: name.to_string(),
            exposure,
        })
    }

    /// Handle to an already registered slot
    pub async fn slot(&self, name: &str) -> Result<SlotHandle> {
        let state = self.core.state.lock().await;
        let exposure = state.slots.slot(name)?.exposure();
        Ok(SlotHandle {
            core: self.core.clone(),
            name: name.to_string(),
            exposure,
        })
    }

    pub async fn get(&self, name: &str) -> Result<Option<String>> {
        self.core.get(name).await
    }

    /// Validate, cache and, when bound, publish a slot value
    pub async fn set(&self, name: &str, value: &str) -> Result<()> {
        self.core.set(name, value).await
    }

    /// Apply a value received on a slot's command topic
    pub async fn handle_command(&self, name: &str, raw: &str) -> Result<CommandOutcome> {
        self.core.handle_command(name, raw).await
    }

    /// Bind to a broker session: subscribe every command topic, then publish
    /// the discovery document.
    ///
    /// A bound entity only accepts the target it was first bound to.
    pub async fn connect(
        &self,
        client: Arc<dyn MessagingClient>,
        target: &DiscoveryTarget,
    ) -> Result<()> {
        let mut state = self.core.state.lock().await;

        let namespace = TopicNamespace::new(self.core.component, self.core.entity_id.clone())
            .with_discovery_prefix(target.prefix.clone())
            .with_node_id(target.node_id.clone());

        if state.is_bound() && state.namespace != namespace {
            return Err(DomainError::TargetChanged(state.namespace.base_topic()?));
        }

        for (slot, topic) in state.slots.command_routes(&namespace)? {
            client.subscribe(&topic, self.route(&slot)).await?;
        }
        self.publish_config(&state.slots, &namespace, client.as_ref())
            .await?;

        state.namespace = namespace;
        state.client = Some(client);
        Ok(())
    }

    /// Discovery document as it would be published now
    pub async fn discovery_config(&self) -> Result<Map<String, Value>> {
        let state = self.core.state.lock().await;
        self.build_config(&state.slots, &state.namespace)
    }

    fn route(&self, slot: &str) -> Arc<dyn MessageHandler> {
        Arc::new(SlotCommandRoute {
            core: self.core.clone(),
            slot: slot.to_string(),
        })
    }

    fn build_config(
        &self,
        slots: &SlotRegistry,
        namespace: &TopicNamespace,
    ) -> Result<Map<String, Value>> {
        let mut config = Map::new();
        config.insert("name".to_string(), Value::from(self.core.name.clone()));
        config.insert("retain".to_string(), Value::from(self.core.retain));
        config.insert("unique_id".to_string(), Value::from(namespace.unique_id()));
        config.extend(self.device.base_config());

        for (key, topic) in slots.config_entries(namespace)? {
            config.insert(key, Value::from(topic));
        }

        Ok(config)
    }

    async fn publish_config(
        &self,
        slots: &SlotRegistry,
        namespace: &TopicNamespace,
        client: &dyn MessagingClient,
    ) -> Result<()> {
        let topic = namespace.config_topic()?;
        let config = self.build_config(slots, namespace)?;
        let payload = serde_json::to_vec(&Value::Object(config))
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        client.publish(&topic, &payload, self.core.retain).await
    }
}

impl Entity<super::Switch> {
    pub async fn turn_on(&self) -> Result<()> {
        let payload = self.device.payload_on().to_string();
        self.set(super::STATE_SLOT, &payload).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        let payload = self.device.payload_off().to_string();
        self.set(super::STATE_SLOT, &payload).await
    }

    /// `None` until the switch was set or commanded
    pub async fn is_on(&self) -> Result<Option<bool>> {
        let state = self.get(super::STATE_SLOT).await?;
        Ok(state.map(|value| value == self.device.payload_on()))
    }
}

impl Entity<super::BinarySensor> {
    pub async fn report(&self, on: bool) -> Result<()> {
        let payload = if on {
            self.device.payload_on()
        } else {
            self.device.payload_off()
        }
        .to_string();
        self.set(super::STATE_SLOT, &payload).await
    }
}

/// Discovery fields a slot may not announce its topics under
fn reserved_keys<D: Device>(device: &D) -> HashSet<String> {
    BASE_KEYS
        .iter()
        .map(|key| key.to_string())
        .chain(device.base_config().into_iter().map(|(key, _)| key))
        .collect()
}

#[async_trait]
impl<D: Device> BindableDevice for Entity<D> {
    fn entity_id(&self) -> &EntityId {
        &self.core.entity_id
    }

    fn component(&self) -> ComponentKind {
        self.core.component
    }

    async fn connect(
        &self,
        client: Arc<dyn MessagingClient>,
        target: &DiscoveryTarget,
    ) -> Result<()> {
        Entity::connect(self, client, target).await
    }
}

impl EntityCore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.slots.get(name)?.map(str::to_string))
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let accepts = (self.validator)(name, value);
        state.slots.store(name, value, accepts)?;
        self.publish_state(&state, name, value).await
    }

    /// Apply a command; an applied value is echoed when the slot asks for it.
    /// The cache keeps the new value even if the echo fails.
    async fn handle_command(&self, name: &str, raw: &str) -> Result<CommandOutcome> {
        let mut state = self.state.lock().await;
        let accepts = (self.validator)(name, raw);
        let outcome = state.slots.handle_command(name, raw, accepts)?;

        if matches!(outcome, CommandOutcome::Applied { .. })
            && state.slots.slot(name)?.echoes_state()
        {
            self.publish_state(&state, name, raw).await?;
        }
        Ok(outcome)
    }

    async fn publish_state(&self, state: &EntityState, name: &str, value: &str) -> Result<()> {
        let Some(client) = &state.client else {
            return Ok(());
        };
        if let Some(topic) = state.slots.state_topic(name, &state.namespace)? {
            client.publish(&topic, value.as_bytes(), self.retain).await?;
        }
        Ok(())
    }
}

/// Routes a command topic back into its slot
struct SlotCommandRoute {
    core: Arc<EntityCore>,
    slot: String,
}

#[async_trait]
impl MessageHandler for SlotCommandRoute {
    async fn handle(&self, message: &InboundMessage) -> Result<CommandOutcome> {
        self.core
            .handle_command(&self.slot, &message.payload_str())
            .await
    }
}

/// Typed handle to one slot of an [`Entity`]
#[derive(Clone)]
pub struct SlotHandle {
    core: Arc<EntityCore>,
    name: String,
    exposure: SlotExposure,
}

impl SlotHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exposure(&self) -> SlotExposure {
        self.exposure
    }

    pub async fn get(&self) -> Result<Option<String>> {
        self.core.get(&self.name).await
    }

    pub async fn set(&self, value: &str) -> Result<()> {
        self.core.set(&self.name, value).await
    }
}

impl std::fmt::Debug for SlotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotHandle")
            .field("entity_id", &self.core.entity_id)
            .field("name", &self.name)
            .field("exposure", &self.exposure)
            .finish()
    }
}
