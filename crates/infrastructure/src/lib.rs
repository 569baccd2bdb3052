//! Infrastructure layer - MQTT transport and host configuration

pub mod config;
pub mod messaging;

pub use crate::config::{ConfigSources, HostConfig};
pub use messaging::mqtt_client::MqttClient;
pub use messaging::routes::CommandRoutes;
