//! Liveness tracking for simulation sessions.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bookkeeping for one logical caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    pub id: String,
    pub created_at: Instant,
    pub last_heartbeat: Instant,
    pub last_request_time: Option<Instant>,
    pub request_count: u64,
}

impl GameSession {
    fn new(id: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_heartbeat: now,
            last_request_time: None,
            request_count: 0,
        }
    }

    pub fn is_active(&self, stale_timeout: Duration) -> bool {
        self.last_heartbeat.elapsed() < stale_timeout
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub average_requests_per_session: f64,
    pub oldest_session_age: Duration,
}

/// Registry of live sessions.
///
/// Sessions that stop heartbeating are not reaped by a timer; they simply
/// stop counting as active once `stale_timeout` has passed. Call
/// [`prune_stale`](Self::prune_stale) to drop their records.
#[derive(Debug)]
pub struct GameSessionManager {
    sessions: DashMap<String, GameSession>,
    stale_timeout: Duration,
}

impl GameSessionManager {
    pub fn new(stale_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            stale_timeout,
        }
    }

    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }

    /// Creates a record for `id` unless one exists.
    pub fn register_session(&self, id: impl Into<String>) {
        let id = id.into();
        self.sessions.entry(id.clone()).or_insert_with(|| {
            tracing::info!(session_id = %id, "session registered");
            GameSession::new(id.clone())
        });
    }

    pub fn unregister_session(&self, id: &str) -> Option<GameSession> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn heartbeat(&self, id: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_heartbeat = Instant::now();
        }
    }

    /// Marks a request sent by `id`. A request also counts as a heartbeat.
    pub fn record_request(&self, id: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            let now = Instant::now();
            session.last_request_time = Some(now);
            session.last_heartbeat = now;
            session.request_count += 1;
        } else {
            tracing::debug!(session_id = %id, "request recorded for unknown session");
        }
    }

    pub fn session(&self, id: &str) -> Option<GameSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|s| s.is_active(self.stale_timeout))
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.is_active(self.stale_timeout))
            .count()
    }

    pub fn active_session_ids(&self) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|s| s.is_active(self.stale_timeout))
            .map(|s| s.key().clone())
            .collect()
    }

    /// Drops every stale record, returning how many were removed.
    pub fn prune_stale(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.is_active(self.stale_timeout));
        let removed = before - self.sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned stale sessions");
        }
        removed
    }

    pub fn stats(&self) -> SessionStats {
        let total_sessions = self.sessions.len();
        let mut active_sessions = 0;
        let mut total_requests = 0u64;
        let mut oldest_session_age = Duration::ZERO;

        for session in self.sessions.iter() {
            if session.is_active(self.stale_timeout) {
                active_sessions += 1;
            }
            total_requests += session.request_count;
            oldest_session_age = oldest_session_age.max(session.age());
        }

        let average_requests_per_session = if total_sessions == 0 {
            0.0
        } else {
            total_requests as f64 / total_sessions as f64
        };

        SessionStats {
            total_sessions,
            active_sessions,
            average_requests_per_session,
            oldest_session_age,
        }
    }
}

impl Default for GameSessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIMEOUT)
    }
}
