//! Logins in flight between the redirect to Discord and the callback.
//!
//! `begin` mints the CSRF `state` value and remembers where the browser
//! wants to land; `complete` consumes it exactly once. Entries carry their
//! own deadline and are purged in the background.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::provider::generate_state;

/// How long a user has to finish the consent screen.
pub const LOGIN_TTL: Duration = Duration::from_secs(10 * 60);

struct PendingLogin {
    callback_url: String,
    deadline: Instant,
}

/// Pending logins keyed by their `state` value.
pub struct LoginStateStore {
    pending: DashMap<String, PendingLogin>,
    ttl: Duration,
}

impl LoginStateStore {
    pub fn new() -> Self {
        Self::with_ttl(LOGIN_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Record a new login and return its `state` value.
    pub fn begin(&self, callback_url: Option<&str>) -> String {
        let state = generate_state();
        self.pending.insert(
            state.clone(),
            PendingLogin {
                callback_url: sanitize_callback_url(callback_url),
                deadline: Instant::now() + self.ttl,
            },
        );
        state
    }

    /// Consume `state`, returning the callback URL if it was known and unexpired.
    pub fn complete(&self, state: &str) -> Option<String> {
        let (_, login) = self.pending.remove(state)?;
        (Instant::now() < login.deadline).then_some(login.callback_url)
    }

    /// Drop every expired entry; returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.pending.len();
        self.pending.retain(|_, login| now < login.deadline);
        before.saturating_sub(self.pending.len())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for LoginStateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Purge `store` every `every` until the task is aborted.
pub fn spawn_purge(store: Arc<LoginStateStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = store.len(), "purged expired logins");
            }
        }
    })
}

/// Keep only same-site relative paths; anything else returns to `/`.
pub fn sanitize_callback_url(raw: Option<&str>) -> String {
    match raw {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
