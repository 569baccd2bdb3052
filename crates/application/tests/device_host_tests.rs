use application::{DeviceHost, HostOptions};
use async_trait::async_trait;
use domain::{
    BinarySensor, CommandOutcome, ConnectionEvent, DiscoveryTarget, DomainError, Entity,
    InboundMessage, MessageHandler, MessagingClient, Sensor, Switch,
};
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

// --- Recording broker client ---

#[derive(Clone, Default)]
struct RecordingClient {
    published: Arc<Mutex<Vec<(String, Vec<u8>, bool)>>>,
    handlers: Arc<Mutex<HashMap<String, Arc<dyn MessageHandler>>>>,
    subscribe_calls: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
}

impl RecordingClient {
    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    fn published_topics(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _, _)| topic.clone())
            .collect()
    }

    fn subscribed_topics(&self) -> Vec<String> {
        self.subscribe_calls.lock().unwrap().clone()
    }

    /// Deliver a message the way the transport's dispatcher would
    async fn deliver(&self, topic: &str, payload: &str) -> Option<CommandOutcome> {
        let handler = self.handlers.lock().unwrap().get(topic).cloned()?;
        handler
            .handle(&InboundMessage::new(topic, payload))
            .await
            .ok()
    }
}

#[async_trait]
impl MessagingClient for RecordingClient {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> domain::Result<()> {
        if !self.is_connected() {
            return Err(DomainError::Connection("broker not connected".to_string()));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec(), retain));
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> domain::Result<()> {
        // Give other tasks a chance to run mid-bind, as a real broker round trip would
        tokio::task::yield_now().await;
        self.subscribe_calls.lock().unwrap().push(topic.to_string());
        self.handlers
            .lock()
            .unwrap()
            .insert(topic.to_string(), handler);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

fn host_with(client: &RecordingClient, options: HostOptions) -> DeviceHost {
    DeviceHost::new(Arc::new(client.clone()), options)
}

// --- Tests ---

#[tokio::test]
async fn test_device_added_while_disconnected_is_bound_on_connect() {
    let client = RecordingClient::default();
    let host = host_with(&client, HostOptions::default());

    let switch = Switch::entity("foo", "bar").unwrap();
    host.add_device(Arc::new(switch.clone())).await.unwrap();

    assert_eq!(host.pending_count().await, 1);
    assert!(client.published_topics().is_empty());
    assert!(!switch.is_bound().await);

    client.set_connected(true);
    host.handle_connection_event(ConnectionEvent::Connected).await;

    assert_eq!(host.pending_count().await, 0);
    assert_eq!(host.bound_count().await, 1);
    assert!(switch.is_bound().await);
    assert_eq!(
        client.published_topics(),
        vec!["homeassistant/switch/bar/config".to_string()]
    );
    assert_eq!(
        client.subscribed_topics(),
        vec!["homeassistant/switch/bar/command".to_string()]
    );
}

#[tokio::test]
async fn test_device_added_while_connected_binds_immediately() {
    let client = RecordingClient::default();
    client.set_connected(true);
    let host = host_with(&client, HostOptions::default());
    assert!(host.is_connected().await);

    let sensor = Sensor::entity("Temperature", "temp").unwrap();
    host.add_device(Arc::new(sensor.clone())).await.unwrap();

    assert_eq!(host.pending_count().await, 0);
    assert_eq!(
        client.published_topics(),
        vec!["homeassistant/sensor/temp/config".to_string()]
    );
    assert!(client.subscribed_topics().is_empty());
}

#[tokio::test]
async fn test_queue_drains_in_order_with_node_id() {
    let client = RecordingClient::default();
    let options = HostOptions {
        discovery: DiscoveryTarget::new("ha", Some("testserver".to_string())),
        ..HostOptions::default()
    };
    let host = host_with(&client, options);

    host.add_device(Arc::new(Switch::entity("One", "one").unwrap()))
        .await
        .unwrap();
    host.add_device(Arc::new(BinarySensor::entity("Two", "two").unwrap()))
        .await
        .unwrap();

    client.set_connected(true);
    host.handle_connection_event(ConnectionEvent::Connected).await;

    assert_eq!(
        client.published_topics(),
        vec![
            "ha/switch/testserver/one/config".to_string(),
            "ha/binary_sensor/testserver/two/config".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_connection_failure_keeps_devices_queued() {
    let client = RecordingClient::default();
    let host = host_with(&client, HostOptions::default());

    host.add_device(Arc::new(Switch::entity("foo", "bar").unwrap()))
        .await
        .unwrap();
    host.handle_connection_event(ConnectionEvent::ConnectionFailed {
        reason: "NotAuthorized".to_string(),
    })
    .await;

    assert!(!host.is_connected().await);
    assert_eq!(host.pending_count().await, 1);
    assert!(client.published_topics().is_empty());
}

#[tokio::test]
async fn test_failed_bind_is_requeued() {
    let client = RecordingClient::default();
    let host = host_with(&client, HostOptions::default());

    host.add_device(Arc::new(Switch::entity("foo", "bar").unwrap()))
        .await
        .unwrap();

    // Broker acknowledged but publishing still fails
    host.handle_connection_event(ConnectionEvent::Connected).await;
    assert_eq!(host.pending_count().await, 1);
    assert_eq!(host.bound_count().await, 0);

    client.set_connected(true);
    host.handle_connection_event(ConnectionEvent::Connected).await;
    assert_eq!(host.pending_count().await, 0);
    assert_eq!(host.bound_count().await, 1);
}

#[tokio::test]
async fn test_reconnect_rebinds_bound_devices() {
    let client = RecordingClient::default();
    client.set_connected(true);
    let host = host_with(&client, HostOptions::default());
    host.add_device(Arc::new(Switch::entity("foo", "bar").unwrap()))
        .await
        .unwrap();

    client.set_connected(false);
    host.handle_connection_event(ConnectionEvent::Disconnected).await;
    assert!(!host.is_connected().await);
    assert_eq!(host.bound_count().await, 1);

    client.set_connected(true);
    host.handle_connection_event(ConnectionEvent::Connected).await;

    assert_eq!(client.published_topics().len(), 2);
    assert_eq!(client.subscribed_topics().len(), 2);
}

#[tokio::test]
async fn test_reconnect_without_rebind() {
    let client = RecordingClient::default();
    client.set_connected(true);
    let options = HostOptions {
        rebind_on_reconnect: false,
        ..HostOptions::default()
    };
    let host = host_with(&client, options);
    host.add_device(Arc::new(Switch::entity("foo", "bar").unwrap()))
        .await
        .unwrap();

    host.handle_connection_event(ConnectionEvent::Disconnected).await;
    host.handle_connection_event(ConnectionEvent::Connected).await;

    assert_eq!(client.published_topics().len(), 1);
}

#[tokio::test]
async fn test_inbound_command_updates_switch_and_state_publishes() {
    let client = RecordingClient::default();
    client.set_connected(true);
    let host = host_with(&client, HostOptions::default());

    let changes = Arc::new(Mutex::new(Vec::new()));
    let recorder = changes.clone();
    let switch = Entity::new(
        Switch::new().with_on_change(move |change| {
            recorder.lock().unwrap().push((
                change.previous.map(str::to_string),
                change.value.to_string(),
            ));
        }),
        "foo",
        "bar",
    )
    .unwrap();
    host.add_device(Arc::new(switch.clone())).await.unwrap();

    switch.turn_on().await.unwrap();

    let outcome = client
        .deliver("homeassistant/switch/bar/command", "OFF")
        .await;
    assert_eq!(
        outcome,
        Some(CommandOutcome::Applied {
            previous: Some("ON".to_string())
        })
    );
    assert_eq!(switch.is_on().await.unwrap(), Some(false));

    let outcome = client
        .deliver("homeassistant/switch/bar/command", "OFF")
        .await;
    assert_eq!(outcome, Some(CommandOutcome::Unchanged));

    let outcome = client
        .deliver("homeassistant/switch/bar/command", "BLINK")
        .await;
    assert_eq!(outcome, Some(CommandOutcome::Rejected));

    assert_eq!(
        *changes.lock().unwrap(),
        vec![(Some("ON".to_string()), "OFF".to_string())]
    );

    let published = client.published.lock().unwrap().clone();
    assert_eq!(published.len(), 3);
    let (topic, payload, retain) = &published[1];
    assert_eq!(topic, "homeassistant/switch/bar/state");
    assert_eq!(payload, b"ON");
    assert!(*retain);

    // The applied command is reported back; unchanged and rejected ones are not
    let (topic, payload, retain) = &published[2];
    assert_eq!(topic, "homeassistant/switch/bar/state");
    assert_eq!(payload, b"OFF");
    assert!(*retain);
}

#[tokio::test]
async fn test_discovery_document_payload() {
    let client = RecordingClient::default();
    client.set_connected(true);
    let host = host_with(&client, HostOptions::default());

    host.add_device(Arc::new(Switch::entity("Foo", "bar").unwrap()))
        .await
        .unwrap();

    let published = client.published.lock().unwrap().clone();
    let (_, payload, retain) = &published[0];
    let config: serde_json::Value = serde_json::from_slice(payload).unwrap();

    assert!(*retain);
    assert_eq!(config["name"], "Foo");
    assert_eq!(config["retain"], true);
    assert_eq!(config["payload_on"], "ON");
    assert_eq!(config["payload_off"], "OFF");
    assert_eq!(config["state_topic"], "homeassistant/switch/bar/state");
    assert_eq!(config["command_topic"], "homeassistant/switch/bar/command");
}

#[tokio::test]
async fn test_run_consumes_events_until_closed() {
    let client = RecordingClient::default();
    let host = Arc::new(host_with(&client, HostOptions::default()));
    host.add_device(Arc::new(Switch::entity("foo", "bar").unwrap()))
        .await
        .unwrap();

    let (tx, rx) = tokio::sync::broadcast::channel(8);
    let runner = {
        let host = host.clone();
        tokio::spawn(async move { host.run(rx).await })
    };

    client.set_connected(true);
    tx.send(ConnectionEvent::Connected).unwrap();
    drop(tx);
    runner.await.unwrap();

    assert_eq!(host.bound_count().await, 1);
}

#[tokio::test]
async fn test_repeated_connected_event_does_not_rebind() {
    let client = RecordingClient::default();
    client.set_connected(true);
    let host = host_with(&client, HostOptions::default());
    host.add_device(Arc::new(Switch::entity("foo", "bar").unwrap()))
        .await
        .unwrap();

    // Ack observed by the transport before the host subscribed to its events
    host.handle_connection_event(ConnectionEvent::Connected).await;

    assert_eq!(client.published_topics().len(), 1);
    assert_eq!(client.subscribed_topics().len(), 1);
    assert_eq!(host.bound_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_add_device_during_drain_keeps_fifo_order() {
    let client = RecordingClient::default();
    let host = Arc::new(host_with(&client, HostOptions::default()));

    host.add_device(Arc::new(Switch::entity("One", "one").unwrap()))
        .await
        .unwrap();
    host.add_device(Arc::new(Switch::entity("Two", "two").unwrap()))
        .await
        .unwrap();

    client.set_connected(true);
    let drain = {
        let host = host.clone();
        tokio::spawn(async move { host.handle_connection_event(ConnectionEvent::Connected).await })
    };
    let late = {
        let host = host.clone();
        tokio::spawn(async move {
            host.add_device(Arc::new(Switch::entity("Three", "three").unwrap()))
                .await
        })
    };
    drain.await.unwrap();
    late.await.unwrap().unwrap();

    // Whichever task takes the host lock first, the late device binds after the queue
    assert_eq!(
        client.published_topics(),
        vec![
            "homeassistant/switch/one/config".to_string(),
            "homeassistant/switch/two/config".to_string(),
            "homeassistant/switch/three/config".to_string(),
        ]
    );
    assert_eq!(
        client.subscribed_topics(),
        vec![
            "homeassistant/switch/one/command".to_string(),
            "homeassistant/switch/two/command".to_string(),
            "homeassistant/switch/three/command".to_string(),
        ]
    );
    assert_eq!(host.pending_count().await, 0);
    assert_eq!(host.bound_count().await, 3);
}
