//! Telemetry ingestion and session orchestration
//!
//! The Ingestor is the single consumer of inbound messages. It
//! coordinates:
//! - Session lifecycle (start, point accumulation, close, reaping)
//! - Batch derivation on close (distance, harsh events, overspeeding)
//! - Dedup-guarded persistence and mileage updates
//! - Confirmation delivery back to the device

mod handlers;

use crate::domain::store::TelemetryStore;
use crate::domain::types::TelemetryMessage;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::confirm::Notifier;
use crate::services::dedup::Deduplicator;
use crate::services::detector::EventDetector;
use crate::services::road_classifier::{RoadClassifier, RoadLookup};
use crate::services::session_manager::SessionManager;
use crate::services::speed_limit::SpeedLimitResolver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::info;

/// Central consumer for telemetry messages and session management
pub struct Ingestor {
    /// Session registry; exclusively owned by this consumer
    pub(crate) sessions: SessionManager,
    /// Derives harsh and overspeeding events on close
    pub(crate) detector: EventDetector,
    /// Guards persistence against duplicate records
    pub(crate) dedup: Deduplicator,
    /// Persistence collaborator
    pub(crate) store: Arc<dyn TelemetryStore>,
    /// Confirmation/roster delivery collaborator
    pub(crate) notifier: Arc<dyn Notifier>,
    /// Shared counters
    pub(crate) metrics: Arc<Metrics>,
    /// Sessions idle longer than this are reaped
    pub(crate) idle_threshold: Duration,
    reap_interval: Duration,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        store: Arc<dyn TelemetryStore>,
        lookup: Arc<dyn RoadLookup>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let classifier = RoadClassifier::new(lookup, config.road_cache_capacity());
        let limits = SpeedLimitResolver::new(store.clone());
        Self {
            sessions: SessionManager::new(),
            detector: EventDetector::new(classifier, limits),
            dedup: Deduplicator::new(store.clone()),
            store,
            notifier,
            metrics,
            idle_threshold: Duration::from_secs(config.idle_threshold_secs()),
            reap_interval: Duration::from_secs(config.reap_interval_secs()),
        }
    }

    /// Consume messages until the channel closes or shutdown is signaled.
    ///
    /// The idle-session reaper runs as a tick in the same loop, so it
    /// shares the consumer's exclusion over the registry and can never
    /// race an in-flight close.
    pub async fn run(
        &mut self,
        mut message_rx: mpsc::Receiver<TelemetryMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut reap_tick = interval(self.reap_interval);
        // tokio intervals fire immediately; consume the first tick so
        // reaping starts one full period in
        reap_tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("ingestor_shutdown");
                        break;
                    }
                }
                message = message_rx.recv() => {
                    match message {
                        Some(m) => self.process_message(m).await,
                        None => break, // Channel closed
                    }
                }
                _ = reap_tick.tick() => {
                    self.reap_idle();
                }
            }
        }
    }

    /// Process a single message, dispatching to the appropriate handler
    pub async fn process_message(&mut self, message: TelemetryMessage) {
        match message {
            TelemetryMessage::Start(key) => self.handle_start(key),
            TelemetryMessage::Point(key, point) => self.handle_point(key, point),
            TelemetryMessage::End(key) => self.handle_end(key).await,
            TelemetryMessage::Boot { device_id } => self.handle_boot(&device_id).await,
        }
    }

    /// Remove sessions idle past the threshold
    pub(crate) fn reap_idle(&mut self) {
        let removed = self.sessions.reap(self.idle_threshold);
        if !removed.is_empty() {
            self.metrics.record_sessions_reaped(removed.len() as u64);
            info!(
                reaped = %removed.len(),
                active = %self.sessions.active_count(),
                "idle_sessions_reaped"
            );
        }
    }

    /// Number of sessions currently tracked
    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }
}
