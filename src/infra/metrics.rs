//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Pipeline counters, shared across tasks
pub struct Metrics {
    started_at: Instant,
    messages_received: AtomicU64,
    invalid_messages: AtomicU64,
    messages_dropped: AtomicU64,
    points_appended: AtomicU64,
    points_dropped: AtomicU64,
    sessions_started: AtomicU64,
    sessions_replaced: AtomicU64,
    sessions_closed: AtomicU64,
    sessions_reaped: AtomicU64,
    harsh_events: AtomicU64,
    overspeed_events: AtomicU64,
    duplicates_skipped: AtomicU64,
    store_errors: AtomicU64,
    confirmations_sent: AtomicU64,
    confirmation_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            messages_received: AtomicU64::new(0),
            invalid_messages: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            points_appended: AtomicU64::new(0),
            points_dropped: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_replaced: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            sessions_reaped: AtomicU64::new(0),
            harsh_events: AtomicU64::new(0),
            overspeed_events: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            confirmations_sent: AtomicU64::new(0),
            confirmation_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalid_message(&self) {
        self.invalid_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Message lost to ingest channel backpressure
    #[inline]
    pub fn record_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_point_appended(&self) {
        self.points_appended.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_point_dropped(&self) {
        self.points_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_replaced(&self) {
        self.sessions_replaced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sessions_reaped(&self, count: u64) {
        self.sessions_reaped.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_harsh_event(&self) {
        self.harsh_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overspeed_event(&self) {
        self.overspeed_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_duplicate_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_confirmation_sent(&self) {
        self.confirmations_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_confirmation_failure(&self) {
        self.confirmation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters for reporting (non-destructive)
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            invalid_messages: self.invalid_messages.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            points_appended: self.points_appended.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_replaced: self.sessions_replaced.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_reaped: self.sessions_reaped.load(Ordering::Relaxed),
            harsh_events: self.harsh_events.load(Ordering::Relaxed),
            overspeed_events: self.overspeed_events.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            confirmations_sent: self.confirmations_sent.load(Ordering::Relaxed),
            confirmation_failures: self.confirmation_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub messages_received: u64,
    pub invalid_messages: u64,
    pub messages_dropped: u64,
    pub points_appended: u64,
    pub points_dropped: u64,
    pub sessions_started: u64,
    pub sessions_replaced: u64,
    pub sessions_closed: u64,
    pub sessions_reaped: u64,
    pub harsh_events: u64,
    pub overspeed_events: u64,
    pub duplicates_skipped: u64,
    pub store_errors: u64,
    pub confirmations_sent: u64,
    pub confirmation_failures: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            messages = %self.messages_received,
            invalid = %self.invalid_messages,
            dropped = %self.messages_dropped,
            points_appended = %self.points_appended,
            points_dropped = %self.points_dropped,
            sessions_started = %self.sessions_started,
            sessions_replaced = %self.sessions_replaced,
            sessions_closed = %self.sessions_closed,
            sessions_reaped = %self.sessions_reaped,
            harsh_events = %self.harsh_events,
            overspeed_events = %self.overspeed_events,
            duplicates_skipped = %self.duplicates_skipped,
            store_errors = %self.store_errors,
            confirmations_sent = %self.confirmations_sent,
            confirmation_failures = %self.confirmation_failures,
            "metrics_summary"
        );
    }
}
