//! Message handlers for the Ingestor
//!
//! Each handler processes one message kind. The END handler runs the full
//! batch pipeline: entity checks, distance, event derivation, guarded
//! persistence, mileage, then confirmation delivery.

use super::Ingestor;
use crate::domain::store::PointRecord;
use crate::domain::timestamp::normalize_timestamp;
use crate::domain::types::{CloseOutcome, DriveEventKind, GpsPoint, SessionKey};
use crate::io::confirm::Confirmation;
use crate::services::dedup::InsertOutcome;
use crate::services::distance;
use tracing::{debug, error, info, warn};

impl Ingestor {
    /// Open a session for the key, replacing any existing one
    pub(crate) fn handle_start(&mut self, key: SessionKey) {
        let discarded = self.sessions.start(&key);
        if discarded > 0 {
            self.metrics.record_session_replaced();
        }
        self.metrics.record_session_started();
    }

    /// Append a point to the open session for the key
    pub(crate) fn handle_point(&mut self, key: SessionKey, point: GpsPoint) {
        if self.sessions.append(&key, point) {
            self.metrics.record_point_appended();
        } else {
            self.metrics.record_point_dropped();
        }
    }

    /// Close the session for the key.
    ///
    /// The session is removed only after its confirmation was delivered;
    /// on delivery failure it stays in the registry so a re-sent END can
    /// retry. The Deduplicator makes that retry idempotent.
    pub(crate) async fn handle_end(&mut self, key: SessionKey) {
        let (outcome, had_session) = match self.sessions.begin_close(&key) {
            None => {
                warn!(key = %key, "end_without_session");
                (CloseOutcome::NoSession, false)
            }
            Some(points) if points.is_empty() => {
                info!(key = %key, "empty_session_closed");
                (CloseOutcome::EmptySession, true)
            }
            Some(points) => (self.process_batch(&key, &points).await, true),
        };

        let confirmation = Confirmation::for_outcome(&key.driver_id, &outcome);
        match self.notifier.send_confirmation(&key.device_id, &confirmation).await {
            Ok(()) => {
                self.metrics.record_confirmation_sent();
                if had_session {
                    self.sessions.finish_close(&key);
                    self.metrics.record_session_closed();
                }
                info!(
                    key = %key,
                    status = %confirmation.status,
                    message = %confirmation.message,
                    "session_close_confirmed"
                );
            }
            Err(e) => {
                // Keep the session; the device will re-send END
                self.metrics.record_confirmation_failure();
                warn!(key = %key, error = %e, "confirmation_delivery_failed");
            }
        }
    }

    /// Run the derivation pipeline over a non-empty batch
    pub(crate) async fn process_batch(
        &mut self,
        key: &SessionKey,
        points: &[GpsPoint],
    ) -> CloseOutcome {
        info!(key = %key, points = %points.len(), "batch_close_started");

        match self.store.device_exists(&key.device_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(key = %key, "unknown_device");
                return CloseOutcome::InvalidDevice;
            }
            Err(e) => {
                error!(key = %key, error = %e, "device_check_failed");
                self.metrics.record_store_error();
                return CloseOutcome::StoreFailure;
            }
        }
        match self.store.driver_exists(&key.driver_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(key = %key, "unknown_driver");
                return CloseOutcome::InvalidDriver;
            }
            Err(e) => {
                error!(key = %key, error = %e, "driver_check_failed");
                self.metrics.record_store_error();
                return CloseOutcome::StoreFailure;
            }
        }

        let distance_km = distance::route_km(points);
        debug!(key = %key, distance_km = %format!("{distance_km:.3}"), "route_measured");

        let overspeeding =
            self.detector.overspeeding_events(&key.device_id, &key.driver_id, points).await;
        let harsh = self.detector.harsh_events(&key.device_id, &key.driver_id, points);

        for event in overspeeding.iter().chain(harsh.iter()) {
            match self.dedup.insert_event(event).await {
                Ok(InsertOutcome::Inserted) => match event.kind {
                    DriveEventKind::Overspeeding => self.metrics.record_overspeed_event(),
                    _ => self.metrics.record_harsh_event(),
                },
                Ok(InsertOutcome::Duplicate) => self.metrics.record_duplicate_skipped(),
                Err(e) => {
                    // A lost event is not fatal to the batch
                    warn!(key = %key, kind = %event.kind.as_str(), error = %e, "event_insert_failed");
                    self.metrics.record_store_error();
                }
            }
        }

        if distance_km > 0.0 {
            match self.store.add_mileage(&key.device_id, distance_km).await {
                Ok(()) => {
                    debug!(key = %key, delta_km = %format!("{distance_km:.2}"), "mileage_updated")
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "mileage_update_failed");
                    self.metrics.record_store_error();
                }
            }
        }

        let mut saved = 0usize;
        let mut failed = 0usize;
        for (i, point) in points.iter().enumerate() {
            let record = PointRecord {
                vehicle_id: key.device_id.clone(),
                driver_id: key.driver_id.clone(),
                timestamp: normalize_timestamp(&point.timestamp),
                lat: point.lat,
                lon: point.lon,
                speed: point.speed.max(0.0),
            };

            match self.dedup.insert_point(&record).await {
                Ok(InsertOutcome::Inserted) => saved += 1,
                // A duplicate means the point is already persisted
                Ok(InsertOutcome::Duplicate) => saved += 1,
                Err(e) => {
                    failed += 1;
                    self.metrics.record_store_error();
                    warn!(key = %key, index = %(i + 1), error = %e, "point_insert_failed");
                }
            }

            if (i + 1) % 10 == 0 {
                debug!(key = %key, processed = %(i + 1), total = %points.len(), "batch_progress");
            }
        }

        info!(
            key = %key,
            saved = %saved,
            failed = %failed,
            distance_km = %format!("{distance_km:.2}"),
            events = %(overspeeding.len() + harsh.len()),
            "batch_close_complete"
        );

        if saved > 0 {
            CloseOutcome::Saved { points: saved, distance_km }
        } else {
            CloseOutcome::NoValidPoints
        }
    }

    /// Publish the driver roster to a freshly booted device
    pub(crate) async fn handle_boot(&mut self, device_id: &str) {
        let drivers = match self.store.list_drivers().await {
            Ok(drivers) => drivers,
            Err(e) => {
                warn!(device_id, error = %e, "driver_roster_query_failed");
                self.metrics.record_store_error();
                return;
            }
        };

        match self.notifier.send_driver_roster(device_id, &drivers).await {
            Ok(()) => debug!(device_id, count = %drivers.len(), "driver_roster_sent"),
            Err(e) => warn!(device_id, error = %e, "driver_roster_delivery_failed"),
        }
    }
}
