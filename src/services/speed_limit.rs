//! Applicable speed limit resolution
//!
//! A per-vehicle override in the store wins; otherwise the static default
//! for the road category applies.

use crate::domain::store::TelemetryStore;
use crate::domain::types::RoadCategory;
use std::sync::Arc;
use tracing::warn;

/// Limit applied when the store cannot be queried at all
const FALLBACK_LIMIT_KMH: f64 = 50.0;

/// Static default limit for a road category, in km/h
pub fn default_limit_kmh(road: RoadCategory) -> f64 {
    match road {
        RoadCategory::Motorway => 120.0,
        RoadCategory::Expressways => 100.0,
        RoadCategory::NationalHighways => 80.0,
        RoadCategory::OtherRoads => 50.0,
    }
}

/// Resolves the limit for a vehicle on a classified road
pub struct SpeedLimitResolver {
    store: Arc<dyn TelemetryStore>,
}

impl SpeedLimitResolver {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, vehicle_id: &str, road: RoadCategory) -> f64 {
        match self.store.speed_limit(vehicle_id, road).await {
            Ok(Some(limit)) => limit,
            Ok(None) => default_limit_kmh(road),
            Err(e) => {
                warn!(vehicle_id, road = %road, error = %e, "speed_limit_query_failed");
                FALLBACK_LIMIT_KMH
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::{DriverEntry, EventRecord, PointRecord, StoreError};
    use crate::io::store::MemoryStore;
    use async_trait::async_trait;

    #[test]
    fn test_static_defaults() {
        assert_eq!(default_limit_kmh(RoadCategory::Motorway), 120.0);
        assert_eq!(default_limit_kmh(RoadCategory::Expressways), 100.0);
        assert_eq!(default_limit_kmh(RoadCategory::NationalHighways), 80.0);
        assert_eq!(default_limit_kmh(RoadCategory::OtherRoads), 50.0);
    }

    #[tokio::test]
    async fn test_override_wins_over_default() {
        let store = Arc::new(
            MemoryStore::in_memory()
                .with_vehicle("veh1")
                .with_speed_limit("veh1", RoadCategory::Motorway, 110.0),
        );
        let resolver = SpeedLimitResolver::new(store);

        assert_eq!(resolver.resolve("veh1", RoadCategory::Motorway).await, 110.0);
        // No override for this category
        assert_eq!(resolver.resolve("veh1", RoadCategory::OtherRoads).await, 50.0);
        // Other vehicles fall back to defaults
        assert_eq!(resolver.resolve("veh2", RoadCategory::Motorway).await, 120.0);
    }

    struct BrokenStore;

    #[async_trait]
    impl TelemetryStore for BrokenStore {
        async fn event_exists(&self, _: &EventRecord, _: f64) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn insert_event(&self, _: &EventRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn point_exists(&self, _: &PointRecord, _: f64, _: f64) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn insert_point(&self, _: &PointRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn speed_limit(&self, _: &str, _: RoadCategory) -> Result<Option<f64>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn add_mileage(&self, _: &str, _: f64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn device_exists(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn driver_exists(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn list_drivers(&self) -> Result<Vec<DriverEntry>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_error_falls_back_flat() {
        let resolver = SpeedLimitResolver::new(Arc::new(BrokenStore));

        // Flat fallback regardless of category when the store is down
        assert_eq!(resolver.resolve("veh1", RoadCategory::Motorway).await, 50.0);
        assert_eq!(resolver.resolve("veh1", RoadCategory::OtherRoads).await, 50.0);
    }
}
