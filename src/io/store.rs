//! In-process telemetry store with JSONL append-through
//!
//! Vehicles, drivers and speed-limit overrides are seeded from config at
//! startup. Inserted events and points are held in memory for the
//! existence queries and appended to JSONL journals (one JSON object per
//! line) for downstream consumers.

use crate::domain::store::{
    DriverEntry, EventRecord, PointRecord, StoreError, TelemetryStore,
};
use crate::domain::types::RoadCategory;
use crate::infra::config::Config;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// JSONL journal files for events and points
struct Journal {
    events_file: String,
    points_file: String,
}

impl Journal {
    fn append<T: Serialize>(path: &str, record: &T) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let path = Path::new(path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Config-seeded store backing the pipeline
pub struct MemoryStore {
    vehicles: HashSet<String>,
    drivers: Vec<DriverEntry>,
    limits: HashMap<(String, RoadCategory), f64>,
    mileage: RwLock<HashMap<String, f64>>,
    events: RwLock<Vec<EventRecord>>,
    points: RwLock<Vec<PointRecord>>,
    journal: Option<Journal>,
}

impl MemoryStore {
    /// Build a store seeded from config, journaling to the configured files
    pub fn from_config(config: &Config) -> Self {
        let limits = config
            .limit_overrides()
            .iter()
            .map(|o| ((o.vehicle_id.clone(), o.road_type), o.speed_limit))
            .collect();

        info!(
            vehicles = %config.vehicles().len(),
            drivers = %config.drivers().len(),
            events_file = %config.events_file(),
            points_file = %config.points_file(),
            "store_initialized"
        );

        Self {
            vehicles: config.vehicles().iter().cloned().collect(),
            drivers: config.drivers().to_vec(),
            limits,
            mileage: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            points: RwLock::new(Vec::new()),
            journal: Some(Journal {
                events_file: config.events_file().to_string(),
                points_file: config.points_file().to_string(),
            }),
        }
    }

    /// Empty store without journals, for tests
    pub fn in_memory() -> Self {
        Self {
            vehicles: HashSet::new(),
            drivers: Vec::new(),
            limits: HashMap::new(),
            mileage: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            points: RwLock::new(Vec::new()),
            journal: None,
        }
    }

    pub fn with_vehicle(mut self, vehicle_id: &str) -> Self {
        self.vehicles.insert(vehicle_id.to_string());
        self
    }

    pub fn with_driver(mut self, id: &str, name: &str) -> Self {
        self.drivers.push(DriverEntry { id: id.to_string(), name: name.to_string() });
        self
    }

    pub fn with_speed_limit(mut self, vehicle_id: &str, road: RoadCategory, limit: f64) -> Self {
        self.limits.insert((vehicle_id.to_string(), road), limit);
        self
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    pub fn point_count(&self) -> usize {
        self.points.read().len()
    }

    pub fn events_of_kind(&self, kind: crate::domain::types::DriveEventKind) -> usize {
        self.events.read().iter().filter(|e| e.kind == kind).count()
    }

    pub fn total_mileage(&self, vehicle_id: &str) -> f64 {
        self.mileage.read().get(vehicle_id).copied().unwrap_or(0.0)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn event_exists(
        &self,
        candidate: &EventRecord,
        eps_deg: f64,
    ) -> Result<bool, StoreError> {
        let events = self.events.read();
        Ok(events.iter().any(|e| {
            e.vehicle_id == candidate.vehicle_id
                && e.driver_id == candidate.driver_id
                && e.timestamp == candidate.timestamp
                && e.kind == candidate.kind
                && (e.lat - candidate.lat).abs() < eps_deg
                && (e.lon - candidate.lon).abs() < eps_deg
        }))
    }

    async fn insert_event(&self, record: &EventRecord) -> Result<(), StoreError> {
        if let Some(journal) = &self.journal {
            Journal::append(&journal.events_file, record)?;
        }
        self.events.write().push(record.clone());
        debug!(
            vehicle_id = %record.vehicle_id,
            kind = %record.kind.as_str(),
            "event_inserted"
        );
        Ok(())
    }

    async fn point_exists(
        &self,
        candidate: &PointRecord,
        eps_deg: f64,
        eps_speed: f64,
    ) -> Result<bool, StoreError> {
        let points = self.points.read();
        Ok(points.iter().any(|p| {
            p.vehicle_id == candidate.vehicle_id
                && p.driver_id == candidate.driver_id
                && p.timestamp == candidate.timestamp
                && (p.lat - candidate.lat).abs() < eps_deg
                && (p.lon - candidate.lon).abs() < eps_deg
                && (p.speed - candidate.speed).abs() < eps_speed
        }))
    }

    async fn insert_point(&self, record: &PointRecord) -> Result<(), StoreError> {
        if let Some(journal) = &self.journal {
            Journal::append(&journal.points_file, record)?;
        }
        self.points.write().push(record.clone());
        Ok(())
    }

    async fn speed_limit(
        &self,
        vehicle_id: &str,
        road: RoadCategory,
    ) -> Result<Option<f64>, StoreError> {
        Ok(self.limits.get(&(vehicle_id.to_string(), road)).copied())
    }

    async fn add_mileage(&self, vehicle_id: &str, delta_km: f64) -> Result<(), StoreError> {
        let mut mileage = self.mileage.write();
        *mileage.entry(vehicle_id.to_string()).or_insert(0.0) += delta_km;
        Ok(())
    }

    async fn device_exists(&self, device_id: &str) -> Result<bool, StoreError> {
        Ok(self.vehicles.contains(device_id))
    }

    async fn driver_exists(&self, driver_id: &str) -> Result<bool, StoreError> {
        Ok(self.drivers.iter().any(|d| d.id == driver_id))
    }

    async fn list_drivers(&self) -> Result<Vec<DriverEntry>, StoreError> {
        Ok(self.drivers.clone())
    }
}
