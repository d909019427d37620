//! Persistence seam for telemetry records
//!
//! The pipeline never talks to a storage engine directly; everything goes
//! through `TelemetryStore`. The in-tree implementation lives in
//! `io::store`; tests substitute their own.

use crate::domain::types::{DriveEventKind, RoadCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised by a persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// A derived driving event as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub vehicle_id: String,
    pub driver_id: String,
    /// Normalized storage-zone timestamp
    pub timestamp: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "event_type")]
    pub kind: DriveEventKind,
}

/// A raw telemetry fix as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub vehicle_id: String,
    pub driver_id: String,
    /// Normalized storage-zone timestamp
    pub timestamp: String,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
}

/// Driver roster entry published to devices on boot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverEntry {
    pub id: String,
    pub name: String,
}

/// Storage operations consumed by the pipeline.
///
/// Existence queries take the caller's tolerance so that the dedup policy
/// stays with the pipeline rather than the backend.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// True when a stored event matches the candidate: vehicle, driver,
    /// timestamp and kind exactly, coordinates within `eps_deg`.
    async fn event_exists(
        &self,
        candidate: &EventRecord,
        eps_deg: f64,
    ) -> Result<bool, StoreError>;

    async fn insert_event(&self, record: &EventRecord) -> Result<(), StoreError>;

    /// True when a stored point matches the candidate: vehicle, driver and
    /// timestamp exactly, coordinates within `eps_deg`, speed within
    /// `eps_speed`.
    async fn point_exists(
        &self,
        candidate: &PointRecord,
        eps_deg: f64,
        eps_speed: f64,
    ) -> Result<bool, StoreError>;

    async fn insert_point(&self, record: &PointRecord) -> Result<(), StoreError>;

    /// Per-vehicle speed limit override for a road category, if configured
    async fn speed_limit(
        &self,
        vehicle_id: &str,
        road: RoadCategory,
    ) -> Result<Option<f64>, StoreError>;

    /// Add `delta_km` to the vehicle's total mileage
    async fn add_mileage(&self, vehicle_id: &str, delta_km: f64) -> Result<(), StoreError>;

    async fn device_exists(&self, device_id: &str) -> Result<bool, StoreError>;

    async fn driver_exists(&self, driver_id: &str) -> Result<bool, StoreError>;

    async fn list_drivers(&self) -> Result<Vec<DriverEntry>, StoreError>;
}
