//! Tolerance-guarded idempotent inserts
//!
//! Re-processing a batch (close retries after a failed confirmation
//! delivery) must not duplicate stored data. Every insert first queries
//! the store for a near-identical record; a match is reported as success
//! without writing.

use crate::domain::store::{EventRecord, PointRecord, StoreError, TelemetryStore};
use std::sync::Arc;
use tracing::debug;

/// Coordinate tolerance for treating two events as the same, in degrees
pub const EVENT_COORD_EPS_DEG: f64 = 1e-4;

/// Coordinate tolerance for raw points, in degrees
pub const POINT_COORD_EPS_DEG: f64 = 1e-6;

/// Speed tolerance for raw points, in km/h
pub const POINT_SPEED_EPS_KMH: f64 = 0.01;

/// Outcome of a guarded insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A matching record already existed; nothing was written
    Duplicate,
}

/// Guards the store against duplicate events and points
pub struct Deduplicator {
    store: Arc<dyn TelemetryStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    pub async fn insert_event(&self, record: &EventRecord) -> Result<InsertOutcome, StoreError> {
        if self.store.event_exists(record, EVENT_COORD_EPS_DEG).await? {
            debug!(
                vehicle_id = %record.vehicle_id,
                kind = %record.kind.as_str(),
                timestamp = %record.timestamp,
                "duplicate_event_skipped"
            );
            return Ok(InsertOutcome::Duplicate);
        }
        self.store.insert_event(record).await?;
        Ok(InsertOutcome::Inserted)
    }

    pub async fn insert_point(&self, record: &PointRecord) -> Result<InsertOutcome, StoreError> {
        if self.store.point_exists(record, POINT_COORD_EPS_DEG, POINT_SPEED_EPS_KMH).await? {
            debug!(
                vehicle_id = %record.vehicle_id,
                timestamp = %record.timestamp,
                "duplicate_point_skipped"
            );
            return Ok(InsertOutcome::Duplicate);
        }
        self.store.insert_point(record).await?;
        Ok(InsertOutcome::Inserted)
    }
}
