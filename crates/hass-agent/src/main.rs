use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use application::{DeviceHost, HostOptions};
use domain::device::STATE_SLOT;
use domain::{BindableDevice, Entity, MessagingClient, Sensor, Switch};
use infrastructure::{ConfigSources, HostConfig, MqttClient};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding an optional `default.{toml,json,yaml}`
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Directory with one file per option
    #[arg(long, default_value = "/run/secrets")]
    secrets_dir: PathBuf,

    /// Prefix of environment overrides, e.g. HASS for HASS_MQTT_HOST
    #[arg(long, default_value = "HASS")]
    env_prefix: String,

    #[arg(long)]
    mqtt_client_id: Option<String>,

    #[arg(long)]
    mqtt_username: Option<String>,

    #[arg(long)]
    mqtt_password: Option<String>,

    #[arg(long)]
    mqtt_host: Option<String>,

    #[arg(long)]
    mqtt_port: Option<u16>,

    #[arg(long)]
    mqtt_tls_cacert: Option<PathBuf>,

    #[arg(long)]
    mqtt_tls_certfile: Option<PathBuf>,

    #[arg(long)]
    mqtt_tls_keyfile: Option<PathBuf>,

    #[arg(long)]
    discovery_prefix: Option<String>,

    #[arg(long)]
    node_id: Option<String>,

    /// Keep already bound devices as they are when the broker comes back
    #[arg(long)]
    no_rebind: bool,

    /// Seconds between uptime reports
    #[arg(long, default_value_t = 30)]
    uptime_interval: u64,
}

impl Args {
    fn sources(&self) -> ConfigSources {
        ConfigSources {
            config_dir: self.config_dir.clone(),
            secrets_dir: Some(self.secrets_dir.clone()),
            env_prefix: self.env_prefix.clone(),
        }
    }

    /// Command line flags win over every other source
    fn apply_overrides(self, config: &mut HostConfig) {
        if let Some(id) = self.mqtt_client_id {
            config.mqtt_client_id = id;
        }
        if self.mqtt_username.is_some() {
            config.mqtt_username = self.mqtt_username;
        }
        if self.mqtt_password.is_some() {
            config.mqtt_password = self.mqtt_password;
        }
        if let Some(host) = self.mqtt_host {
            config.mqtt_host = host;
        }
        if let Some(port) = self.mqtt_port {
            config.mqtt_port = port;
        }
        if self.mqtt_tls_cacert.is_some() {
            config.mqtt_tls_cacert = self.mqtt_tls_cacert;
        }
        if self.mqtt_tls_certfile.is_some() {
            config.mqtt_tls_certfile = self.mqtt_tls_certfile;
        }
        if self.mqtt_tls_keyfile.is_some() {
            config.mqtt_tls_keyfile = self.mqtt_tls_keyfile;
        }
        if let Some(prefix) = self.discovery_prefix {
            config.discovery_prefix = prefix;
        }
        if self.node_id.is_some() {
            config.node_id = self.node_id;
        }
    }
}

fn demo_switch() -> Result<Entity<Switch>> {
    let switch = Switch::new().with_on_change(|change| {
        info!(
            slot = change.slot,
            previous = ?change.previous,
            value = change.value,
            "Switch toggled by hub"
        );
    });
    Ok(Entity::new(switch, "Demo Switch", "demo_switch")?)
}

fn uptime_sensor() -> Result<Entity<Sensor>> {
    let sensor = Sensor::new()
        .with_unit("s")
        .with_device_class("duration");
    Ok(Entity::new(sensor, "Host Uptime", "uptime")?)
}

async fn run() -> Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,hass_agent=debug,application=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Home Assistant device host starting...");
    info!("Process ID: {}", std::process::id());

    let args = Args::parse();
    let no_rebind = args.no_rebind;
    let uptime_interval = Duration::from_secs(args.uptime_interval.max(1));

    // 1. Load configuration
    let mut config = HostConfig::load(&args.sources())?;
    args.apply_overrides(&mut config);
    let discovery = config.discovery_target();
    info!(
        prefix = %discovery.prefix,
        node_id = ?discovery.node_id,
        "Loaded configuration"
    );

    // 2. Start the broker session
    info!(host = %config.mqtt_host, port = %config.mqtt_port, "Connecting to MQTT broker...");
    let mqtt_client = MqttClient::connect(config.mqtt_options()?);
    // Subscribe before the host samples the connection flag so no ack is missed
    let events = mqtt_client.connection_events();

    let client: Arc<dyn MessagingClient> = Arc::new(mqtt_client.clone());
    let host = Arc::new(DeviceHost::new(
        client,
        HostOptions {
            discovery,
            rebind_on_reconnect: !no_rebind,
        },
    ));

    let host_task = {
        let host = host.clone();
        tokio::spawn(async move { host.run(events).await })
    };

    // 3. Register devices
    let switch = demo_switch()?;
    let uptime = uptime_sensor()?;
    let devices: [Arc<dyn BindableDevice>; 2] =
        [Arc::new(switch.clone()), Arc::new(uptime.clone())];
    for device in devices {
        if let Err(e) = host.add_device(device).await {
            warn!(error = %e, "Device not bound yet, it stays queued");
        }
    }

    // 4. Report uptime
    let started = Instant::now();
    let uptime_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(uptime_interval);
        loop {
            ticker.tick().await;
            let secs = started.elapsed().as_secs().to_string();
            match uptime.set(STATE_SLOT, &secs).await {
                Ok(()) => debug!(uptime = %secs, "Uptime reported"),
                Err(e) => error!(error = %e, "Failed to report uptime"),
            }
        }
    });

    info!("Running, press Ctrl-C to stop");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(err) => warn!(error = %err, "Unable to listen for shutdown signal"),
    }

    uptime_task.abort();
    if let Err(e) = mqtt_client.disconnect().await {
        warn!(error = %e, "Failed to disconnect cleanly");
    }
    host_task.abort();

    match switch.is_on().await {
        Ok(Some(on)) => info!(on, "Final switch state"),
        Ok(None) => info!("Switch never reported a state"),
        Err(e) => warn!(error = %e, "Unable to read switch state"),
    }

    Ok(())
}

fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start tokio runtime: {:?}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run()) {
        eprintln!("\nCRITICAL ERROR: {:?}", e);
        std::process::exit(1);
    }
}
