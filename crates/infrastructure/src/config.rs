use anyhow::Context;
use config::{Config, ConfigError, Environment, File, Map, Source, Value};
use domain::DiscoveryTarget;
use domain::topic::DEFAULT_DISCOVERY_PREFIX;
use rumqttc::{MqttOptions, Transport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Keys every configuration source may provide
pub const CONFIGURABLE_OPTIONS: [&str; 10] = [
    "mqtt_client_id",
    "mqtt_username",
    "mqtt_password",
    "mqtt_host",
    "mqtt_port",
    "mqtt_tls_cacert",
    "mqtt_tls_certfile",
    "mqtt_tls_keyfile",
    "discovery_prefix",
    "node_id",
];

/// Broker connection and discovery settings of a device host
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HostConfig {
    /// Empty means a generated id and a clean session
    #[serde(default)]
    pub mqtt_client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,
    pub mqtt_tls_cacert: Option<PathBuf>,
    pub mqtt_tls_certfile: Option<PathBuf>,
    pub mqtt_tls_keyfile: Option<PathBuf>,
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    pub node_id: Option<String>,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_discovery_prefix() -> String {
    DEFAULT_DISCOVERY_PREFIX.to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mqtt_client_id: String::new(),
            mqtt_username: None,
            mqtt_password: None,
            mqtt_host: default_mqtt_host(),
            mqtt_port: default_mqtt_port(),
            mqtt_tls_cacert: None,
            mqtt_tls_certfile: None,
            mqtt_tls_keyfile: None,
            discovery_prefix: default_discovery_prefix(),
            node_id: None,
        }
    }
}

/// Where [`HostConfig::load`] looks for settings
#[derive(Debug, Clone)]
pub struct ConfigSources {
    /// Directory holding an optional `default.{toml,json,yaml}`
    pub config_dir: Option<PathBuf>,
    /// Directory with one file per option, e.g. `/run/secrets/mqtt_password`
    pub secrets_dir: Option<PathBuf>,
    /// Environment prefix, e.g. `HASS` for `HASS_MQTT_HOST`
    pub env_prefix: String,
}

impl Default for ConfigSources {
    fn default() -> Self {
        Self {
            config_dir: None,
            secrets_dir: Some(PathBuf::from("/run/secrets")),
            env_prefix: "HASS".to_string(),
        }
    }
}

impl HostConfig {
    /// Load settings; later sources override earlier ones:
    /// defaults, config file, secrets directory, environment.
    pub fn load(sources: &ConfigSources) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("mqtt_host", default_mqtt_host())?
            .set_default("mqtt_port", i64::from(default_mqtt_port()))?
            .set_default("discovery_prefix", default_discovery_prefix())?;

        if let Some(dir) = &sources.config_dir {
            builder = builder.add_source(
                File::with_name(&dir.join("default").to_string_lossy()).required(false),
            );
        }

        if let Some(dir) = &sources.secrets_dir {
            builder = builder.add_source(SecretsDir::new(dir.clone()));
        }

        builder
            .add_source(Environment::with_prefix(&sources.env_prefix))
            .build()?
            .try_deserialize()
    }

    pub fn discovery_target(&self) -> DiscoveryTarget {
        DiscoveryTarget::new(
            self.discovery_prefix.clone(),
            self.node_id.clone().filter(|id| !id.is_empty()),
        )
    }

    /// rumqttc options for this configuration, reading TLS material from disk
    pub fn mqtt_options(&self) -> anyhow::Result<MqttOptions> {
        let generated = self.mqtt_client_id.is_empty();
        let client_id = if generated {
            format!("hassdevice-{}", std::process::id())
        } else {
            self.mqtt_client_id.clone()
        };

        let mut options = MqttOptions::new(client_id, &self.mqtt_host, self.mqtt_port);
        options.set_keep_alive(Duration::from_secs(20));
        options.set_clean_session(generated);

        if let Some(username) = &self.mqtt_username {
            options.set_credentials(username, self.mqtt_password.clone().unwrap_or_default());
        }

        if let Some(transport) = self.tls_transport()? {
            options.set_transport(transport);
        }

        Ok(options)
    }

    fn tls_transport(&self) -> anyhow::Result<Option<Transport>> {
        let Some(cacert) = &self.mqtt_tls_cacert else {
            if self.mqtt_tls_certfile.is_some() {
                warn!("mqtt_tls_cacert not set, ignoring mqtt_tls_certfile setting");
            }
            return Ok(None);
        };

        let ca = std::fs::read(cacert)
            .with_context(|| format!("failed to read MQTT TLS CA {}", cacert.display()))?;

        let client_auth = match (&self.mqtt_tls_certfile, &self.mqtt_tls_keyfile) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path).with_context(|| {
                    format!("failed to read MQTT TLS client cert {}", cert_path.display())
                })?;
                let key = std::fs::read(key_path).with_context(|| {
                    format!("failed to read MQTT TLS client key {}", key_path.display())
                })?;
                Some((cert, key))
            }
            (None, None) => None,
            _ => {
                warn!("mqtt_tls_certfile and mqtt_tls_keyfile must be set together, ignoring them");
                None
            }
        };

        Ok(Some(Transport::tls(ca, client_auth, None)))
    }
}

/// One file per option, contents trimmed, as mounted by container secrets
#[derive(Debug, Clone)]
struct SecretsDir {
    path: PathBuf,
}

impl SecretsDir {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Source for SecretsDir {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        let mut values = Map::new();

        for key in CONFIGURABLE_OPTIONS {
            let path = self.path.join(key);
            if !path.is_file() {
                continue;
            }

            let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Foreign(Box::new(e)))?;
            let origin = path.display().to_string();
            values.insert(key.to_string(), Value::new(Some(&origin), raw.trim().to_string()));
        }

        Ok(values)
    }
}
