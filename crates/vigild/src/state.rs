use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use vigil_store::Store;

use crate::config::Config;
use crate::engine::EngineHandle;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub engine: EngineHandle,
    pub settings: Arc<Settings>,
    pub monitor: Arc<MonitorTracker>,
}

/// Runtime settings fixed at startup.
pub struct Settings {
    pub tolerance: f32,
    pub alert_threshold: u32,
    pub admin_recipients: Vec<String>,
    pub backend_label: String,
}

impl AppState {
    pub fn new(store: Store, engine: EngineHandle, config: &Config, backend_label: &str) -> Self {
        Self {
            store,
            engine,
            settings: Arc::new(Settings {
                tolerance: config.tolerance,
                alert_threshold: config.alert_threshold,
                admin_recipients: config.admin_recipients.clone(),
                backend_label: backend_label.to_string(),
            }),
            monitor: Arc::new(MonitorTracker::default()),
        }
    }
}

/// Consecutive identity-mismatch counter for continuous monitoring.
///
/// An admin alert fires when a user's streak reaches the configured
/// threshold; a recognized face resets the streak. Counting is per user and
/// survives only for the process lifetime — a restart starts streaks over.
#[derive(Default)]
pub struct MonitorTracker {
    counts: Mutex<HashMap<String, u32>>,
}

impl MonitorTracker {
    /// Record one mismatch for `user` and return the new streak length.
    pub fn record_mismatch(&self, user: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts.entry(user.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// A recognized face ends the streak.
    pub fn reset(&self, user: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.remove(user);
    }
}
