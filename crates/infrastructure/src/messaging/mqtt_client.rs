use anyhow::{Result, anyhow};
use async_trait::async_trait;
use domain::{ConnectionEvent, DomainError, InboundMessage, MessageHandler, MessagingClient};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task;
use tracing::{debug, error, info, warn};

use super::routes::CommandRoutes;

/// rumqttc-backed broker session.
///
/// Inbound publishes are queued to a dispatcher task so a slow handler never
/// stalls the event loop. Connection changes are broadcast as [`ConnectionEvent`]s.
#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    routes: CommandRoutes,
    events: broadcast::Sender<ConnectionEvent>,
}

impl MqttClient {
    /// Start the session. Must be called from within a tokio runtime.
    pub fn connect(options: MqttOptions) -> Self {
        info!(
            host = %options.broker_address().0,
            port = %options.broker_address().1,
            client_id = %options.client_id(),
            "Connecting to MQTT broker"
        );

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let (events, _) = broadcast::channel(32);
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();
        let connected = Arc::new(AtomicBool::new(false));
        let routes = CommandRoutes::new();

        let dispatch_routes = routes.clone();
        task::spawn(async move {
            while let Some(message) = inbound_rx.recv().await {
                dispatch_routes.dispatch(&message).await;
            }
        });

        let connected_clone = connected.clone();
        let events_clone = events.clone();
        let routes_clone = routes.clone();
        let client_clone = client.clone();

        // Spawn a task to handle the event loop
        task::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                        if inbound_tx.send(message).is_err() {
                            warn!("Inbound dispatcher stopped, dropping message");
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code != ConnectReturnCode::Success {
                            error!(code = ?ack.code, "MQTT broker refused connection");
                            connected_clone.store(false, Ordering::Relaxed);
                            let _ = events_clone.send(ConnectionEvent::ConnectionFailed {
                                reason: format!("{:?}", ack.code),
                            });
                            continue;
                        }

                        info!("MQTT Connected");
                        connected_clone.store(true, Ordering::Relaxed);

                        // Restore the session's subscriptions
                        let topics = routes_clone.topics();
                        if !topics.is_empty() {
                            info!("Re-subscribing to {} topics...", topics.len());
                            for topic in topics {
                                if let Err(e) = client_clone.try_subscribe(&topic, QoS::AtLeastOnce)
                                {
                                    error!("Failed to re-subscribe to {}: {}", topic, e);
                                }
                            }
                        }

                        let _ = events_clone.send(ConnectionEvent::Connected);
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        if connected_clone.swap(false, Ordering::Relaxed) {
                            info!("MQTT broker closed the session");
                            let _ = events_clone.send(ConnectionEvent::Disconnected);
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        connected_clone.store(false, Ordering::Relaxed);
                        info!("MQTT Disconnected");
                        let _ = events_clone.send(ConnectionEvent::Disconnected);
                        // Polling again would reconnect
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT Connection error: {:?}", e);
                        let event = if connected_clone.swap(false, Ordering::Relaxed) {
                            ConnectionEvent::Disconnected
                        } else {
                            ConnectionEvent::ConnectionFailed {
                                reason: e.to_string(),
                            }
                        };
                        let _ = events_clone.send(event);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            connected,
            routes,
            events,
        }
    }

    /// Transport lifecycle notifications, starting from the next event
    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Topics currently routed to a handler
    pub fn subscriptions(&self) -> Vec<String> {
        self.routes.topics()
    }

    /// End the session
    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| anyhow!("Failed to disconnect from MQTT broker: {}", e))
    }
}

#[async_trait]
impl MessagingClient for MqttClient {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> domain::Result<()> {
        if !self.is_connected() {
            return Err(DomainError::Connection(format!(
                "cannot publish to {}: broker not connected",
                topic
            )));
        }

        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .await
            .map_err(|e| DomainError::Messaging(format!("Failed to publish MQTT message: {}", e)))?;
        debug!(topic = %topic, retain, bytes = payload.len(), "Published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> domain::Result<()> {
        self.routes.insert(topic, handler);

        // Recorded routes are subscribed on the next ConnAck
        if !self.is_connected() {
            debug!(topic = %topic, "Deferring subscription until connected");
            return Ok(());
        }

        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| {
                DomainError::Messaging(format!("Failed to subscribe to topic {}: {}", topic, e))
            })?;
        debug!(topic = %topic, "Subscribed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
