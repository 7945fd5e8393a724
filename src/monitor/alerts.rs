//! In-memory alert state per target.
//!
//! Entries are created on first use and never reconciled against the store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Alert state for one target. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    pub consecutive_failures: u32,
    /// A down alert has fired and no recovery has been sent yet.
    pub alert_active: bool,
}

/// Lock-guarded map of target name to [`AlertState`].
///
/// Every method is one read-modify-write under the lock; callers must not do
/// I/O while holding it, which the API makes impossible.
#[derive(Debug, Default)]
pub struct AlertTracker {
    states: Mutex<HashMap<String, AlertState>>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, AlertState>> {
        // A panic mid-update leaves the map consistent, so poisoning is ignored.
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count one more failure and return the new total.
    pub fn record_failure(&self, name: &str) -> u32 {
        let mut states = self.states();
        let state = states.entry(name.to_string()).or_default();
        state.consecutive_failures += 1;
        state.consecutive_failures
    }

    /// Clear the failure streak and any active alert.
    ///
    /// Returns whether an alert was active and the failure count cleared.
    pub fn record_success(&self, name: &str) -> (bool, u32) {
        let mut states = self.states();
        let state = states.entry(name.to_string()).or_default();
        let previous = std::mem::take(state);
        (previous.alert_active, previous.consecutive_failures)
    }

    /// Mark a down alert as sent and restart the failure count.
    pub fn arm_alert(&self, name: &str) {
        let mut states = self.states();
        let state = states.entry(name.to_string()).or_default();
        state.alert_active = true;
        state.consecutive_failures = 0;
    }

    /// Current state for `name`, if any probe has touched it.
    pub fn get(&self, name: &str) -> Option<AlertState> {
        self.states().get(name).copied()
    }

    /// Drop every entry.
    pub fn reset(&self) {
        self.states().clear();
    }
}
