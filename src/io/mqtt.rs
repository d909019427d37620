//! MQTT client for receiving batched telemetry
//!
//! Subscribes to the telemetry topic (control markers and points share one
//! payload shape, distinguished by the `time` field) and the boot topic.
//! Validated messages are forwarded to the ingestor over a bounded channel.

use crate::domain::types::{GpsPoint, RawTelemetry, SessionKey, TelemetryMessage};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Control markers carried in the `time` field
const START_MARKER: &str = "START";
const END_MARKER: &str = "END";

/// Start the MQTT client and send validated messages to the channel.
///
/// Messages are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped messages are counted in metrics and logged (rate-limited).
pub async fn start_telemetry_client(
    config: &Config,
    message_tx: mpsc::Sender<TelemetryMessage>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("fleet-telemetry-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.telemetry_topic(), QoS::AtLeastOnce).await?;
    client.subscribe(config.boot_topic(), QoS::AtMostOnce).await?;

    info!(
        telemetry_topic = %config.telemetry_topic(),
        boot_topic = %config.boot_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "telemetry client subscribed"
    );

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("telemetry_client_shutdown");
                    return Ok(());
                }
            }
            // Process MQTT events
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let topic = &publish.topic;
                        match std::str::from_utf8(&publish.payload) {
                            Ok(json_str) => {
                                metrics.record_message_received();
                                let Some(message) = parse_message(topic, json_str) else {
                                    metrics.record_invalid_message();
                                    continue;
                                };
                                if let Err(e) = message_tx.try_send(message) {
                                    match e {
                                        TrySendError::Full(_) => {
                                            metrics.record_message_dropped();
                                            if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                                warn!("telemetry_message_dropped: channel full");
                                                last_drop_warn = Instant::now();
                                            }
                                        }
                                        TrySendError::Closed(_) => {
                                            warn!("Message channel closed");
                                            return Ok(());
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Invalid UTF-8 in MQTT payload");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("telemetry_client_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "MQTT error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Parse and validate an inbound payload.
///
/// Invalid messages are logged and return None; they produce no
/// confirmation or any other side effect downstream.
pub fn parse_message(topic: &str, payload: &str) -> Option<TelemetryMessage> {
    let raw: RawTelemetry = match serde_json::from_str(payload) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(topic = %topic, error = %e, "telemetry_parse_failed");
            return None;
        }
    };

    let Some(device_id) = non_empty(raw.device_id.as_deref()) else {
        warn!(topic = %topic, "telemetry_rejected: missing field: device_id");
        return None;
    };

    if topic.ends_with("/boot") {
        return Some(TelemetryMessage::Boot { device_id });
    }

    let Some(driver_id) = non_empty(raw.driver_id.as_deref()) else {
        warn!(topic = %topic, "telemetry_rejected: missing field: driver_id");
        return None;
    };

    let Some(time) = non_empty(raw.time.as_deref()) else {
        warn!(topic = %topic, "telemetry_rejected: missing field: time");
        return None;
    };

    let key = SessionKey::new(device_id, driver_id);

    match time.as_str() {
        START_MARKER => Some(TelemetryMessage::Start(key)),
        END_MARKER => Some(TelemetryMessage::End(key)),
        _ => match validate_point(&raw, time) {
            Ok(point) => Some(TelemetryMessage::Point(key, point)),
            Err(reason) => {
                warn!(topic = %topic, key = %key, reason = %reason, "telemetry_rejected");
                None
            }
        },
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn validate_point(raw: &RawTelemetry, timestamp: String) -> Result<GpsPoint, String> {
    let lat = raw.lat.ok_or("missing field: lat")?;
    let lon = raw.lon.ok_or("missing field: lon")?;
    let speed = raw.speed.ok_or("missing field: speed")?;

    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("invalid latitude: {lat}"));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("invalid longitude: {lon}"));
    }
    if speed < 0.0 {
        return Err(format!("invalid speed: {speed}"));
    }

    Ok(GpsPoint { timestamp, lat, lon, speed })
}
