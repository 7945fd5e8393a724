//! Target record types and the statistics folded into them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All persisted records, keyed by target name.
pub type RecordCollection = BTreeMap<String, TargetRecord>;

/// A monitored endpoint and its accumulated health history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub name: String,
    pub url: String,
    pub is_up: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Substring the response body must contain; empty disables the check.
    pub expected_content: String,
    /// 0 disables slow-response warnings.
    pub response_time_threshold_ms: u64,
    pub last_response_time_ms: u64,
    pub ssl_expiry: Option<DateTime<Utc>>,
    /// 0 means "use the global window".
    pub ssl_expiry_threshold_days: u32,
    pub last_ssl_notification_at: Option<DateTime<Utc>>,
    pub total_checks: u64,
    pub successful_checks: u64,
}

impl TargetRecord {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            is_up: false,
            last_success_at: None,
            last_failure_at: None,
            expected_content: String::new(),
            response_time_threshold_ms: 0,
            last_response_time_ms: 0,
            ssl_expiry: None,
            ssl_expiry_threshold_days: 0,
            last_ssl_notification_at: None,
            total_checks: 0,
            successful_checks: 0,
        }
    }

    /// Fold one probe outcome into the running statistics.
    pub fn record_check(&mut self, ok: bool, latency_ms: u64, now: DateTime<Utc>) {
        self.total_checks += 1;
        if ok {
            self.last_success_at = Some(now);
            self.successful_checks += 1;
        } else {
            self.last_failure_at = Some(now);
        }
        self.is_up = ok;
        self.last_response_time_ms = latency_ms;
    }

    /// Percentage of successful checks, 0 before the first check.
    pub fn availability_pct(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        self.successful_checks as f64 / self.total_checks as f64 * 100.0
    }

    /// The SSL warning window for this target in days.
    pub fn effective_ssl_threshold(&self, global_days: u32) -> u32 {
        if self.ssl_expiry_threshold_days > 0 {
            self.ssl_expiry_threshold_days
        } else {
            global_days
        }
    }

    /// Whole days until the certificate expires, rounded down.
    pub fn days_to_ssl_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.ssl_expiry
            .map(|expiry| (expiry - now).num_seconds().div_euclid(86_400))
    }

    /// True when the last response was slower than the configured threshold.
    pub fn is_slow(&self) -> bool {
        self.response_time_threshold_ms > 0
            && self.last_response_time_ms > self.response_time_threshold_ms
    }
}

/// Complete a user-supplied URL, defaulting the scheme to https.
///
/// Returns `None` when nothing but a scheme (or nothing at all) was given.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let url = if raw.starts_with("https://") || raw.starts_with("http://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    if url == "https://" || url == "http://" {
        return None;
    }
    Some(url)
}

/// Human-readable age of a timestamp, e.g. "5 minutes ago".
pub fn format_time_ago(ts: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = ts else {
        return "never".to_string();
    };

    let elapsed = now - ts;
    if elapsed.num_minutes() < 1 {
        format!("{} seconds ago", elapsed.num_seconds())
    } else if elapsed.num_hours() < 1 {
        format!("{} minutes ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{} hours ago", elapsed.num_hours())
    } else {
        format!("{} days ago", elapsed.num_days())
    }
}
