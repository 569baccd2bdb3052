pub mod mqtt_client;
pub mod routes;

pub use mqtt_client::MqttClient;
pub use routes::CommandRoutes;
