//! Session data model for batched telemetry submissions

use crate::domain::types::GpsPoint;
use std::time::{Duration, Instant};

/// Lifecycle state of a session held in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting points
    Open,
    /// END received; derivation ran or is about to run. Retained only while
    /// the close confirmation has not been delivered.
    Closing,
}

/// The accumulating unit of one batched submission, bounded by START/END
#[derive(Debug, Clone)]
pub struct Session {
    pub started_at: Instant,
    /// Arrival-ordered points, append-only while open
    pub points: Vec<GpsPoint>,
    pub state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self { started_at: Instant::now(), points: Vec::new(), state: SessionState::Open }
    }

    /// Time since the session was opened
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
