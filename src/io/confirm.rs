//! Device notification delivery over MQTT
//!
//! Confirmations close the loop on a batch submission: the device keeps
//! re-sending END until it sees one. Published at QoS 1 to
//! `<prefix>/<device_id>/confirmation`. Driver rosters go to
//! `<prefix>/<device_id>/config` on boot.

use crate::domain::store::DriverEntry;
use crate::domain::timestamp::storage_now_rfc3339;
use crate::domain::types::CloseOutcome;
use crate::infra::config::Config;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error raised when a device notification cannot be handed to the broker
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Outbound confirmation payload, one per session close attempt
#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    pub driver_id: String,
    pub status: String,
    pub message: String,
    pub timestamp: String,
}

impl Confirmation {
    pub fn for_outcome(driver_id: &str, outcome: &CloseOutcome) -> Self {
        Self {
            driver_id: driver_id.to_string(),
            status: outcome.status().to_string(),
            message: outcome.message(),
            timestamp: storage_now_rfc3339(),
        }
    }
}

/// Notification delivery seam consumed by the ingestor
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(
        &self,
        device_id: &str,
        confirmation: &Confirmation,
    ) -> Result<(), DeliveryError>;

    async fn send_driver_roster(
        &self,
        device_id: &str,
        drivers: &[DriverEntry],
    ) -> Result<(), DeliveryError>;
}

/// MQTT-backed notifier with its own client and eventloop
pub struct MqttNotifier {
    client: AsyncClient,
    topic_prefix: String,
}

impl MqttNotifier {
    /// Create a notifier connected to the configured broker.
    ///
    /// The eventloop is spawned here and runs for the process lifetime.
    pub fn new(config: &Config) -> Self {
        let client_id = format!("fleet-telemetry-notify-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password())
        {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("notifier_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("notifier_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "notifier_mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, topic_prefix: config.confirmation_topic_prefix().to_string() }
    }

    fn confirmation_topic(&self, device_id: &str) -> String {
        format!("{}/{}/confirmation", self.topic_prefix, device_id)
    }

    fn config_topic(&self, device_id: &str) -> String {
        format!("{}/{}/config", self.topic_prefix, device_id)
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn send_confirmation(
        &self,
        device_id: &str,
        confirmation: &Confirmation,
    ) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(confirmation)
            .map_err(|e| DeliveryError::Publish(e.to_string()))?;

        self.client
            .publish(
                self.confirmation_topic(device_id),
                QoS::AtLeastOnce,
                false,
                payload.into_bytes(),
            )
            .await
            .map_err(|e| DeliveryError::Publish(e.to_string()))?;

        info!(
            device_id,
            status = %confirmation.status,
            message = %confirmation.message,
            "confirmation_published"
        );
        Ok(())
    }

    async fn send_driver_roster(
        &self,
        device_id: &str,
        drivers: &[DriverEntry],
    ) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(&serde_json::json!({ "drivers": drivers }))
            .map_err(|e| DeliveryError::Publish(e.to_string()))?;

        self.client
            .publish(self.config_topic(device_id), QoS::AtMostOnce, false, payload.into_bytes())
            .await
            .map_err(|e| DeliveryError::Publish(e.to_string()))?;

        info!(device_id, count = %drivers.len(), "driver_roster_published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_for_outcome() {
        let confirmation = Confirmation::for_outcome(
            "drv1",
            &CloseOutcome::Saved { points: 5, distance_km: 2.5 },
        );

        assert_eq!(confirmation.driver_id, "drv1");
        assert_eq!(confirmation.status, "success");
        assert_eq!(confirmation.message, "success_saved_5_points_distance_2.50km");
        assert!(!confirmation.timestamp.is_empty());
    }

    #[test]
    fn test_confirmation_serializes_all_fields() {
        let confirmation = Confirmation::for_outcome("drv1", &CloseOutcome::EmptySession);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&confirmation).unwrap()).unwrap();

        assert_eq!(json["driver_id"], "drv1");
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "empty_session_confirmed");
        assert!(json["timestamp"].is_string());
    }
}
