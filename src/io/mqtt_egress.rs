//! MQTT publisher for activity events
//!
//! Mirrors every activity event onto one topic for downstream consumers
//! (QoS 0, fire-and-forget).

use crate::domain::activity::ActivityEvent;
use crate::infra::config::Config;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct MqttActivityPublisher {
    client: AsyncClient,
    topic: String,
}

impl MqttActivityPublisher {
    /// Connects to the broker at the configured MQTT host/port.
    /// Must be called from within a tokio runtime.
    pub fn new(config: &Config) -> Self {
        let client_id = format!("crowd-watch-activity-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_activity_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_activity_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        info!(
            host = %config.mqtt_host(),
            port = %config.mqtt_port(),
            topic = %config.mqtt_activity_topic(),
            "mqtt_activity_publisher_created"
        );

        Self { client, topic: config.mqtt_activity_topic().to_string() }
    }

    pub async fn publish(&self, event: &ActivityEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                debug!(error = %e, "mqtt_activity_serialize_failed");
                return;
            }
        };
        if let Err(e) = self.client.publish(&self.topic, QoS::AtMostOnce, false, json.into_bytes()).await {
            debug!(error = %e, kind = %event.kind.as_str(), "mqtt_activity_publish_failed");
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::ActivityKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_queues_without_broker() {
        // Publish only enqueues onto the client request channel
        let publisher = MqttActivityPublisher::new(&Config::default());
        assert_eq!(publisher.topic(), "crowd/activity");

        let event = ActivityEvent::new(ActivityKind::System, "arena", json!({ "action": "TEST" }));
        tokio::time::timeout(Duration::from_secs(1), publisher.publish(&event)).await.unwrap();
    }
}
