use anyhow::{anyhow, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::endpoint::{parse_mqtt_endpoint, MqttEndpoint};
use super::EventSink;
use crate::config::TransportSettings;
use crate::{FramePayload, LifecycleEvent};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 10;

/// Publishes frame payloads and lifecycle events to an MQTT broker.
///
/// Publishing never blocks: requests go through `try_publish` and are dropped when the
/// client queue is full. A background thread drives the connection and keeps polling
/// after errors so the client reconnects on its own.
pub struct MqttSink {
    client: Client,
    frames_topic: String,
    lifecycle_topic: String,
    stop: Arc<AtomicBool>,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttSink {
    pub fn connect(settings: &TransportSettings) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.broker)?;
        let client_id = format!("canvasd-{}", settings.module_id);
        let mut options = MqttOptions::new(client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        options.set_transport(build_transport(&endpoint));

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_connection(connection, stop.clone());
        log::info!(
            "MQTT sink ready for {}:{} (TLS: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls
        );

        let base = format!(
            "{}/{}",
            settings.topic_prefix.trim_end_matches('/'),
            settings.module_id
        );
        Ok(Self {
            client,
            frames_topic: format!("{base}/frames"),
            lifecycle_topic: format!("{base}/lifecycle"),
            stop,
            connection_handle: Some(handle),
        })
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| anyhow!("MQTT publish to {} failed: {}", topic, e))
    }
}

fn build_transport(endpoint: &MqttEndpoint) -> Transport {
    if endpoint.use_tls {
        Transport::tls_with_default_config()
    } else {
        Transport::tcp()
    }
}

fn spawn_connection(mut connection: Connection, stop: Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    std::thread::sleep(RECONNECT_BACKOFF);
                }
            }
        }
    })
}

impl EventSink for MqttSink {
    fn publish_frame(&mut self, payload: &FramePayload) -> Result<()> {
        let bytes = serde_json::to_vec(payload)?;
        self.publish(&self.frames_topic, bytes)
    }

    fn publish_lifecycle(&mut self, event: &LifecycleEvent) -> Result<()> {
        let bytes = serde_json::to_vec(event)?;
        self.publish(&self.lifecycle_topic, bytes)
    }

    fn close(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        let result = self.client.disconnect();
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        result.map_err(|e| anyhow!("MQTT disconnect failed: {}", e))
    }
}
