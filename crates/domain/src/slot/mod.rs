//! Named units of device state and their wire exposure

use std::sync::Arc;

mod registry;

pub use registry::SlotRegistry;

/// Accepts or rejects a candidate value for a slot
pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Runs when an inbound command changes a slot, before the cached value is replaced
pub type ChangeHook = Arc<dyn Fn(&SlotChange<'_>) + Send + Sync>;

/// A pending slot transition handed to a [`ChangeHook`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotChange<'a> {
    pub slot: &'a str,
    /// Value still cached in the slot
    pub previous: Option<&'a str>,
    /// Value about to be stored
    pub value: &'a str,
}

/// What happened to an inbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Value changed; holds the value it replaced
    Applied { previous: Option<String> },
    /// Value equals the cached one
    Unchanged,
    /// Value failed validation
    Rejected,
    /// Slot has no command topic
    NotCommandable,
}

/// How a slot is exposed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotExposure {
    StateOnly,
    CommandOnly,
    StateAndCommand,
    /// Neither pairing given; the slot only holds a value
    Hidden,
}

/// Relative topic of a slot and the discovery field that announces it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBinding {
    pub topic: String,
    pub config_key: String,
}

impl TopicBinding {
    pub fn new(topic: impl Into<String>, config_key: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            config_key: config_key.into(),
        }
    }
}

/// Declaration of a slot, supplied when it is registered
#[derive(Clone, Default)]
pub struct SlotOptions {
    state: Option<TopicBinding>,
    command: Option<TopicBinding>,
    validator: Option<Validator>,
    on_change: Option<ChangeHook>,
    echo: bool,
}

impl SlotOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the slot's value on `topic`, announced under `config_key`
    pub fn state_topic(mut self, topic: impl Into<String>, config_key: impl Into<String>) -> Self {
        self.state = Some(TopicBinding::new(topic, config_key));
        self
    }

    /// Accept commands on `topic`, announced under `config_key`
    pub fn command_topic(
        mut self,
        topic: impl Into<String>,
        config_key: impl Into<String>,
    ) -> Self {
        self.command = Some(TopicBinding::new(topic, config_key));
        self
    }

    pub fn validator(mut self, validator: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn on_change(
        mut self,
        hook: impl Fn(&SlotChange<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.on_change = Some(Arc::new(hook));
        self
    }

    /// Use an already shared hook, or none
    pub fn change_hook(mut self, hook: Option<ChangeHook>) -> Self {
        self.on_change = hook;
        self
    }

    /// Publish an applied command back on the state topic
    pub fn echo_state(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

impl std::fmt::Debug for SlotOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotOptions")
            .field("state", &self.state)
            .field("command", &self.command)
            .field("validator", &self.validator.is_some())
            .field("on_change", &self.on_change.is_some())
            .field("echo", &self.echo)
            .finish()
    }
}

/// A registered slot with its last known value
pub struct StateSlot {
    name: String,
    value: Option<String>,
    state: Option<TopicBinding>,
    command: Option<TopicBinding>,
    validator: Option<Validator>,
    on_change: Option<ChangeHook>,
    echo: bool,
}

impl StateSlot {
    pub fn new(name: impl Into<String>, options: SlotOptions) -> Self {
        Self {
            name: name.into(),
            value: None,
            state: options.state,
            command: options.command,
            validator: options.validator,
            on_change: options.on_change,
            echo: options.echo,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn state(&self) -> Option<&TopicBinding> {
        self.state.as_ref()
    }

    pub fn command(&self) -> Option<&TopicBinding> {
        self.command.as_ref()
    }

    /// Whether an applied command is republished on the state topic
    pub fn echoes_state(&self) -> bool {
        self.echo && self.state.is_some()
    }

    pub fn exposure(&self) -> SlotExposure {
        match (&self.state, &self.command) {
            (Some(_), Some(_)) => SlotExposure::StateAndCommand,
            (Some(_), None) => SlotExposure::StateOnly,
            (None, Some(_)) => SlotExposure::CommandOnly,
            (None, None) => SlotExposure::Hidden,
        }
    }

    /// Config keys this slot contributes to the discovery document
    pub fn config_keys(&self) -> impl Iterator<Item = &str> {
        self.state
            .iter()
            .chain(self.command.iter())
            .map(|binding| binding.config_key.as_str())
    }

    /// Slot-level validation; accepts everything when no validator was given
    pub fn accepts(&self, value: &str) -> bool {
        self.validator.as_ref().is_none_or(|validator| validator(value))
    }

    pub(crate) fn store(&mut self, value: String) {
        self.value = Some(value);
    }

    /// Apply an inbound command. `device_accepts` is the owning device's verdict
    /// on the value; it is combined with the slot's own validator.
    pub(crate) fn apply_command(&mut self, raw: &str, device_accepts: bool) -> CommandOutcome {
        if self.command.is_none() {
            return CommandOutcome::NotCommandable;
        }
        if self.value.as_deref() == Some(raw) {
            return CommandOutcome::Unchanged;
        }
        if !device_accepts || !self.accepts(raw) {
            return CommandOutcome::Rejected;
        }

        if let Some(hook) = &self.on_change {
            hook(&SlotChange {
                slot: &self.name,
                previous: self.value.as_deref(),
                value: raw,
            });
        }

        let previous = self.value.replace(raw.to_string());
        CommandOutcome::Applied { previous }
    }
}

impl std::fmt::Debug for StateSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSlot")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("state", &self.state)
            .field("command", &self.command)
            .field("echo", &self.echo)
            .finish_non_exhaustive()
    }
}
