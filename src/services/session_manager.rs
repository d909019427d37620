//! Session registry and lifecycle management
//!
//! Owns every open batch session. All operations run on the ingestor's
//! single consumer, so the registry needs no interior locking; the reaper
//! shares the same exclusion by running as a tick in the ingestor loop.

use crate::domain::session::{Session, SessionState};
use crate::domain::types::{GpsPoint, SessionKey};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Manages active sessions: one per device/driver key
pub struct SessionManager {
    sessions: HashMap<SessionKey, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self { sessions: HashMap::new() }
    }

    /// Open a session for the key.
    ///
    /// An existing session for the same key is discarded and replaced,
    /// never merged. Returns the number of points discarded that way.
    pub fn start(&mut self, key: &SessionKey) -> usize {
        let discarded = match self.sessions.insert(key.clone(), Session::new()) {
            Some(previous) => {
                warn!(
                    key = %key,
                    discarded_points = %previous.points.len(),
                    "session_replaced"
                );
                previous.points.len()
            }
            None => {
                info!(key = %key, "session_started");
                0
            }
        };
        discarded
    }

    /// Append a point to the open session for the key.
    ///
    /// Points without an open session are dropped; there is no implicit
    /// session creation. Returns true when the point was appended.
    pub fn append(&mut self, key: &SessionKey, point: GpsPoint) -> bool {
        match self.sessions.get_mut(key) {
            Some(session) if session.is_open() => {
                session.points.push(point);
                debug!(key = %key, total = %session.points.len(), "point_appended");
                true
            }
            Some(_) => {
                warn!(key = %key, "point_dropped_session_closing");
                false
            }
            None => {
                warn!(key = %key, "point_dropped_no_session");
                false
            }
        }
    }

    /// Begin closing the session for the key.
    ///
    /// Transitions the session to Closing and returns a snapshot of its
    /// points for the derivation pipeline. Valid on an already-Closing
    /// session too, so a transport-driven retry re-runs the pipeline.
    /// Returns None when no session exists for the key.
    pub fn begin_close(&mut self, key: &SessionKey) -> Option<Vec<GpsPoint>> {
        let session = self.sessions.get_mut(key)?;
        session.state = SessionState::Closing;
        debug!(key = %key, points = %session.points.len(), "session_closing");
        Some(session.points.clone())
    }

    /// Remove a session whose close confirmation was delivered
    pub fn finish_close(&mut self, key: &SessionKey) {
        if self.sessions.remove(key).is_some() {
            debug!(key = %key, "session_removed");
        }
    }

    /// Remove every session idle longer than the threshold, regardless of
    /// state. Returns the removed keys.
    pub fn reap(&mut self, idle_threshold: Duration) -> Vec<SessionKey> {
        let expired: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.age() > idle_threshold)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(session) = self.sessions.remove(key) {
                info!(
                    key = %key,
                    points = %session.points.len(),
                    idle_secs = %session.age().as_secs(),
                    "session_reaped"
                );
            }
        }

        expired
    }

    /// Number of sessions currently in the registry
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    /// Points accumulated for a key (0 when absent); test hook
    pub fn point_count(&self, key: &SessionKey) -> usize {
        self.sessions.get(key).map(|s| s.points.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, key: &SessionKey, by: Duration) {
        if let Some(session) = self.sessions.get_mut(key) {
            session.started_at = std::time::Instant::now() - by;
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::new("veh1", "drv1")
    }

    fn point(ts: &str, speed: f64) -> GpsPoint {
        GpsPoint { timestamp: ts.to_string(), lat: 24.86, lon: 67.0, speed }
    }

    #[test]
    fn test_start_and_append() {
        let mut manager = SessionManager::new();
        manager.start(&key());

        assert!(manager.append(&key(), point("2024-05-01 08:00:00", 30.0)));
        assert!(manager.append(&key(), point("2024-05-01 08:00:01", 32.0)));
        assert_eq!(manager.point_count(&key()), 2);
    }

    #[test]
    fn test_append_without_session_drops() {
        let mut manager = SessionManager::new();

        assert!(!manager.append(&key(), point("2024-05-01 08:00:00", 30.0)));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_start_replaces_and_discards() {
        let mut manager = SessionManager::new();
        manager.start(&key());
        manager.append(&key(), point("2024-05-01 08:00:00", 30.0));
        manager.append(&key(), point("2024-05-01 08:00:01", 31.0));

        let discarded = manager.start(&key());

        assert_eq!(discarded, 2);
        assert_eq!(manager.point_count(&key()), 0);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_begin_close_returns_points_and_retains() {
        let mut manager = SessionManager::new();
        manager.start(&key());
        manager.append(&key(), point("2024-05-01 08:00:00", 30.0));

        let points = manager.begin_close(&key()).unwrap();

        assert_eq!(points.len(), 1);
        // Session retained until the confirmation is delivered
        assert!(manager.contains(&key()));
    }

    #[test]
    fn test_begin_close_absent_returns_none() {
        let mut manager = SessionManager::new();
        assert!(manager.begin_close(&key()).is_none());
    }

    #[test]
    fn test_reclose_after_failed_delivery() {
        let mut manager = SessionManager::new();
        manager.start(&key());
        manager.append(&key(), point("2024-05-01 08:00:00", 30.0));

        let first = manager.begin_close(&key()).unwrap();
        // Delivery failed; transport re-sends END
        let second = manager.begin_close(&key()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_append_while_closing_drops() {
        let mut manager = SessionManager::new();
        manager.start(&key());
        manager.begin_close(&key());

        assert!(!manager.append(&key(), point("2024-05-01 08:00:00", 30.0)));
        assert_eq!(manager.point_count(&key()), 0);
    }

    #[test]
    fn test_finish_close_removes() {
        let mut manager = SessionManager::new();
        manager.start(&key());
        manager.begin_close(&key());
        manager.finish_close(&key());

        assert!(!manager.contains(&key()));
    }

    #[test]
    fn test_reap_removes_only_idle_sessions() {
        let mut manager = SessionManager::new();
        let stale = SessionKey::new("veh1", "drv1");
        let fresh = SessionKey::new("veh2", "drv2");
        manager.start(&stale);
        manager.start(&fresh);
        manager.backdate(&stale, Duration::from_secs(7200));

        let removed = manager.reap(Duration::from_secs(3600));

        assert_eq!(removed, vec![stale.clone()]);
        assert!(!manager.contains(&stale));
        assert!(manager.contains(&fresh));
    }

    #[test]
    fn test_reap_covers_closing_sessions() {
        let mut manager = SessionManager::new();
        manager.start(&key());
        manager.begin_close(&key());
        manager.backdate(&key(), Duration::from_secs(7200));

        let removed = manager.reap(Duration::from_secs(3600));

        assert_eq!(removed.len(), 1);
        assert_eq!(manager.active_count(), 0);
    }
}
