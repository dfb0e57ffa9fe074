//! Session state: the active contract slot and the REPL history.
//!
//! Each IDE session (keyed by the `x-session-id` header, or `default`) owns
//! one [`Session`] behind an async mutex. Orchestrator operations hold the
//! lock for their whole read → invoke → append sequence, so evaluations in
//! one session are serialized while separate sessions run in parallel.
//!
//! Sessions expire after an idle TTL; [`spawn_reaper`] sweeps them.

use super::Contract;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

/// Session used when a request carries no session id.
pub const DEFAULT_SESSION: &str = "default";

/// Console directive that dumps asset balances.
pub const ASSETS_DIRECTIVE: &str = "::get_assets";

/// Per-session simulated chain context.
#[derive(Debug, Default)]
pub struct Session {
    active_contract: Option<Contract>,
    history: Vec<String>,
}

impl Session {
    pub fn active_contract(&self) -> Option<&Contract> {
        self.active_contract.as_ref()
    }

    /// Contracts to seed a workspace with: the active one, if any.
    pub fn workspace_contracts(&self) -> Vec<Contract> {
        self.active_contract.iter().cloned().collect()
    }

    /// Replace (never merge) the active contract.
    pub fn set_active(&mut self, contract: Contract) {
        self.active_contract = Some(contract);
    }

    /// Accepted expressions, in evaluation order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Record an expression whose evaluation did not fail.
    pub fn record(&mut self, expression: impl Into<String>) {
        self.history.push(expression.into());
    }

    /// Console script replaying the history, then `expression`, then the
    /// asset dump directive.
    pub fn replay_script(&self, expression: &str) -> String {
        let mut lines: Vec<&str> = self.history.iter().map(String::as_str).collect();
        lines.push(expression);
        format!("{}\n{ASSETS_DIRECTIVE}\n", lines.join("\n"))
    }

    pub fn reset(&mut self) {
        self.active_contract = None;
        self.history.clear();
    }
}

/// Shared reference to one session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    inner: Arc<AsyncMutex<Session>>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().await
    }
}

#[derive(Debug)]
struct Entry {
    handle: SessionHandle,
    last_used: Mutex<Instant>,
}

/// Concurrent map of live sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, Entry>,
    /// `None` disables expiry.
    idle_ttl: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Option<Duration>) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl,
        }
    }

    /// Fetch the session for `id`, creating it on first use.
    pub fn get(&self, id: &str) -> SessionHandle {
        let entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
            tracing::info!("Created session {id}");
            Entry {
                handle: SessionHandle {
                    id: id.to_string(),
                    inner: Arc::new(AsyncMutex::new(Session::default())),
                },
                last_used: Mutex::new(Instant::now()),
            }
        });
        *entry.last_used.lock() = Instant::now();
        entry.handle.clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle for longer than the TTL as of `now`.
    ///
    /// A session whose lock is currently held is in use and kept.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };

        let before = self.sessions.len();
        self.sessions.retain(|id, entry| {
            let idle = now.saturating_duration_since(*entry.last_used.lock());
            let busy = entry.handle.inner.try_lock().is_err();
            let keep = busy || idle <= ttl;
            if !keep {
                tracing::info!("Expired session {id} after {}s idle", idle.as_secs());
            }
            keep
        });
        before - self.sessions.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}

/// Periodically sweep expired sessions until the runtime shuts down.
pub fn spawn_reaper(
    registry: Arc<SessionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = registry.sweep();
            if removed > 0 {
                tracing::debug!("Session sweep removed {removed} session(s)");
            }
        }
    })
}
