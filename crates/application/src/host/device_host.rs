use std::collections::VecDeque;
use std::sync::Arc;

use domain::{BindableDevice, ConnectionEvent, ConnectionState, DiscoveryTarget, MessagingClient};
use tokio::sync::{Mutex, broadcast};
use tracing::{error, info, warn};

/// Binding policy of a [`DeviceHost`]
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub discovery: DiscoveryTarget,
    /// Republish discovery and resubscribe commands of already bound devices
    /// when the broker session comes back
    pub rebind_on_reconnect: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            discovery: DiscoveryTarget::default(),
            rebind_on_reconnect: true,
        }
    }
}

/// Owns one broker session and binds devices to it.
///
/// Devices added while the session is down wait in a queue that is drained, in
/// order, when the broker acknowledges the connection. The drain runs under the
/// host lock, so an `add_device` racing with it binds after the queue is empty.
pub struct DeviceHost {
    client: Arc<dyn MessagingClient>,
    options: HostOptions,
    state: Mutex<HostState>,
}

struct HostState {
    connection: ConnectionState,
    pending: VecDeque<Arc<dyn BindableDevice>>,
    bound: Vec<Arc<dyn BindableDevice>>,
}

impl DeviceHost {
    pub fn new(client: Arc<dyn MessagingClient>, options: HostOptions) -> Self {
        let connection = if client.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };

        Self {
            client,
            options,
            state: Mutex::new(HostState {
                connection,
                pending: VecDeque::new(),
                bound: Vec::new(),
            }),
        }
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// Bind a device now if the session is up, otherwise queue it.
    ///
    /// A device whose bind fails stays queued for the next connection; the
    /// error is still returned.
    pub async fn add_device(&self, device: Arc<dyn BindableDevice>) -> domain::Result<()> {
        let mut state = self.state.lock().await;

        if !state.connection.is_connected() {
            info!(
                entity_id = %device.entity_id(),
                component = %device.component(),
                "Broker not connected, queueing device"
            );
            state.pending.push_back(device);
            return Ok(());
        }

        match self.bind(device.as_ref()).await {
            Ok(()) => {
                state.bound.push(device);
                Ok(())
            }
            Err(e) => {
                state.pending.push_back(device);
                Err(e)
            }
        }
    }

    /// React to a transport lifecycle event
    pub async fn handle_connection_event(&self, event: ConnectionEvent) {
        let mut state = self.state.lock().await;
        let was_connected = state.connection.is_connected();
        state.connection = state.connection.apply(&event);

        match event {
            ConnectionEvent::Connected => {
                info!(
                    pending = state.pending.len(),
                    bound = state.bound.len(),
                    "Broker connected"
                );

                // A repeated ack for a session we already track binds nothing new
                if self.options.rebind_on_reconnect && !was_connected {
                    for device in &state.bound {
                        if let Err(e) = self.bind(device.as_ref()).await {
                            error!(entity_id = %device.entity_id(), error = %e, "Failed to rebind device");
                        }
                    }
                }

                let mut failed = VecDeque::new();
                while let Some(device) = state.pending.pop_front() {
                    match self.bind(device.as_ref()).await {
                        Ok(()) => state.bound.push(device),
                        Err(e) => {
                            error!(entity_id = %device.entity_id(), error = %e, "Failed to bind queued device");
                            failed.push_back(device);
                        }
                    }
                }
                state.pending = failed;
            }
            ConnectionEvent::ConnectionFailed { reason } => {
                warn!(
                    reason = %reason,
                    pending = state.pending.len(),
                    "Broker connection failed, devices stay queued"
                );
            }
            ConnectionEvent::Disconnected => {
                warn!(bound = state.bound.len(), "Broker disconnected");
            }
        }
    }

    /// Consume transport events until the channel closes
    pub async fn run(&self, mut events: broadcast::Receiver<ConnectionEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle_connection_event(event).await,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Device host lagged behind connection events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Connection event channel closed, device host stopping");
                    break;
                }
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connection.is_connected()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.lock().await.connection
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn bound_count(&self) -> usize {
        self.state.lock().await.bound.len()
    }

    async fn bind(&self, device: &dyn BindableDevice) -> domain::Result<()> {
        device
            .connect(self.client.clone(), &self.options.discovery)
            .await?;
        info!(
            entity_id = %device.entity_id(),
            component = %device.component(),
            prefix = %self.options.discovery.prefix,
            "Device bound"
        );
        Ok(())
    }
}
