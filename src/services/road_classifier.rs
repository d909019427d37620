//! Road classification with a bounded in-process cache
//!
//! Coordinates are snapped to a ~11 m grid; each grid cell is classified
//! at most once per process (static-road assumption) and cached. The
//! cache is capacity-bounded with insertion-order eviction so long-running
//! deployments don't grow it without limit.

use crate::domain::types::RoadCategory;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Error raised by a road lookup backend
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("road lookup request failed: {0}")]
    Request(String),
}

/// External nearest-road lookup. Returns the raw highway tag of the
/// closest road, or None when no road is near the coordinate.
#[async_trait]
pub trait RoadLookup: Send + Sync {
    async fn highway_tag(&self, lat: f64, lon: f64) -> Result<Option<String>, LookupError>;
}

/// Map a raw highway tag onto one of the four fixed categories.
/// Unrecognized tags fall through to Other Roads.
pub fn map_highway_tag(tag: &str) -> RoadCategory {
    match tag.to_ascii_lowercase().as_str() {
        "motorway" | "motorway_link" => RoadCategory::Motorway,
        "expressway" => RoadCategory::Expressways,
        "trunk" | "trunk_link" | "primary" | "primary_link" | "secondary" | "secondary_link" => {
            RoadCategory::NationalHighways
        }
        _ => RoadCategory::OtherRoads,
    }
}

/// ~11 m grid cell used as the cache key (4 decimal places)
fn grid_key(lat: f64, lon: f64) -> (i64, i64) {
    ((lat * 1e4).round() as i64, (lon * 1e4).round() as i64)
}

/// Classifies coordinates into road categories via a cached lookup
pub struct RoadClassifier {
    lookup: Arc<dyn RoadLookup>,
    cache: FxHashMap<(i64, i64), RoadCategory>,
    /// Insertion order for eviction once at capacity
    order: VecDeque<(i64, i64)>,
    capacity: usize,
}

impl RoadClassifier {
    pub fn new(lookup: Arc<dyn RoadLookup>, capacity: usize) -> Self {
        Self { lookup, cache: FxHashMap::default(), order: VecDeque::new(), capacity }
    }

    /// Classify a coordinate, consulting the cache first.
    ///
    /// Lookup errors and roadless coordinates classify (and cache) as
    /// Other Roads.
    pub async fn classify(&mut self, lat: f64, lon: f64) -> RoadCategory {
        let key = grid_key(lat, lon);
        if let Some(category) = self.cache.get(&key) {
            return *category;
        }

        let category = match self.lookup.highway_tag(lat, lon).await {
            Ok(Some(tag)) => {
                let category = map_highway_tag(&tag);
                debug!(lat, lon, tag = %tag, category = %category, "road_classified");
                category
            }
            Ok(None) => RoadCategory::OtherRoads,
            Err(e) => {
                warn!(lat, lon, error = %e, "road_lookup_failed");
                RoadCategory::OtherRoads
            }
        };

        self.insert(key, category);
        category
    }

    fn insert(&mut self, key: (i64, i64), category: RoadCategory) {
        while self.cache.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.cache.remove(&oldest);
                }
                None => break,
            }
        }
        self.cache.insert(key, category);
        self.order.push_back(key);
    }

    /// Number of cached grid cells
    pub fn cached_cells(&self) -> usize {
        self.cache.len()
    }
}
