//! Check cycle orchestration.
//!
//! One cycle walks every stored target in name order: probe, fold the outcome
//! into the record, decide which notifications are due, persist. Targets are
//! processed sequentially and the full collection is saved after each one.

mod alerts;

pub use alerts::*;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::db::{format_time_ago, RecordStore, TargetRecord};
use crate::notify::Notifier;
use crate::probe::{Probe, ProbeResult, ProbeTarget};

/// Minimum spacing between SSL-expiry warnings for one target.
pub const SSL_NOTIFICATION_INTERVAL_HOURS: i64 = 24;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Counters describing one finished cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub checked: usize,
    pub failed: usize,
    pub notifications_sent: usize,
    pub notification_failures: usize,
    pub save_failures: usize,
}

/// Drives probes, alert decisions and persistence for all targets.
pub struct Monitor {
    store: Arc<dyn RecordStore>,
    prober: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
    tracker: AlertTracker,
    global_ssl_days: AtomicU32,
    clock: Clock,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        prober: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        global_ssl_days: u32,
    ) -> Self {
        Self {
            store,
            prober,
            notifier,
            tracker: AlertTracker::new(),
            global_ssl_days: AtomicU32::new(global_ssl_days),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used to timestamp checks.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn tracker(&self) -> &AlertTracker {
        &self.tracker
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn global_ssl_threshold(&self) -> u32 {
        self.global_ssl_days.load(Ordering::Relaxed)
    }

    pub fn set_global_ssl_threshold(&self, days: u32) {
        self.global_ssl_days.store(days, Ordering::Relaxed);
        tracing::info!("Global SSL expiry threshold set to {} days", days);
    }

    /// Run one check cycle over every stored target.
    pub async fn run_cycle(&self, alert_threshold: u32) -> CycleSummary {
        let mut records = self.store.load();
        let mut summary = CycleSummary::default();

        tracing::debug!("Check cycle started for {} targets", records.len());

        let names: Vec<String> = records.keys().cloned().collect();
        for name in names {
            let target = match records.get(&name) {
                Some(r) => ProbeTarget::new(&r.url, &r.expected_content),
                None => continue,
            };

            let result = self.prober.probe(&target).await;
            let now = (self.clock)();

            let Some(record) = records.get_mut(&name) else {
                continue;
            };
            summary.checked += 1;
            if !result.ok {
                summary.failed += 1;
            }

            record.record_check(result.ok, result.latency_ms.unwrap_or(0), now);

            if let Some(expiry) = result.ssl_expiry {
                record.ssl_expiry = Some(expiry);
                self.check_ssl_expiry(record, now, &mut summary).await;
            }

            if result.ok {
                self.handle_up(record, &mut summary).await;
            } else {
                self.handle_down(record, &result, alert_threshold, &mut summary)
                    .await;
            }

            if let Err(e) = self.store.save(&records) {
                tracing::error!("Error while saving checks data after {}: {}", name, e);
                summary.save_failures += 1;
                continue;
            }
        }

        tracing::debug!(
            "Check cycle finished: {} checked, {} failed, {} notifications",
            summary.checked,
            summary.failed,
            summary.notifications_sent
        );
        summary
    }

    async fn check_ssl_expiry(
        &self,
        record: &mut TargetRecord,
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) {
        let threshold = record.effective_ssl_threshold(self.global_ssl_threshold());
        let Some(days) = ssl_warning_due(record, now, threshold) else {
            return;
        };

        if !should_send_ssl_notification(record.last_ssl_notification_at, now) {
            tracing::debug!(
                "Skipping SSL notification for {}, last notification was {}",
                record.url,
                format_time_ago(record.last_ssl_notification_at, now)
            );
            return;
        }

        if self
            .notify(&ssl_expiry_message(&record.url, days, threshold), summary)
            .await
        {
            record.last_ssl_notification_at = Some(now);
            tracing::info!(
                "Sent SSL expiry notification for {}, will expire in {} days",
                record.url,
                days
            );
        }
    }

    async fn handle_down(
        &self,
        record: &TargetRecord,
        result: &ProbeResult,
        alert_threshold: u32,
        summary: &mut CycleSummary,
    ) {
        let count = self.tracker.record_failure(&record.name);
        tracing::info!("Server {} is down {} times", record.url, count);

        if count >= alert_threshold {
            let reason = result.error_message.as_deref().unwrap_or("unknown error");
            self.notify(&down_message(&record.url, reason), summary).await;
            self.tracker.arm_alert(&record.name);
        }
    }

    async fn handle_up(&self, record: &TargetRecord, summary: &mut CycleSummary) {
        if record.is_slow() {
            let text = slow_response_message(
                &record.url,
                record.last_response_time_ms,
                record.response_time_threshold_ms,
            );
            self.notify(&text, summary).await;
        }

        let (was_alert_active, _) = self.tracker.record_success(&record.name);
        if was_alert_active {
            self.notify(&up_message(&record.url), summary).await;
        }
    }

    /// Send `text`, logging failures. Returns whether it was delivered.
    async fn notify(&self, text: &str, summary: &mut CycleSummary) -> bool {
        match self.notifier.send(text).await {
            Ok(()) => {
                summary.notifications_sent += 1;
                true
            }
            Err(e) => {
                tracing::error!("Failed to send message: {}", e);
                summary.notification_failures += 1;
                false
            }
        }
    }
}

/// Days left on the certificate when it falls inside the warning window.
pub fn ssl_warning_due(record: &TargetRecord, now: DateTime<Utc>, threshold: u32) -> Option<i64> {
    let days = record.days_to_ssl_expiry(now)?;
    (0..i64::from(threshold)).contains(&days).then_some(days)
}

/// SSL warnings go out at most once per [`SSL_NOTIFICATION_INTERVAL_HOURS`].
pub fn should_send_ssl_notification(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last {
        None => true,
        Some(t) => now - t > ChronoDuration::hours(SSL_NOTIFICATION_INTERVAL_HOURS),
    }
}

pub fn down_message(url: &str, reason: &str) -> String {
    format!("❗❗❗ Server {} is down ❗❗❗\nReason: {}", url, reason)
}

pub fn up_message(url: &str) -> String {
    format!("✅ Server {} is up 🎉", url)
}

pub fn slow_response_message(url: &str, latency_ms: u64, threshold_ms: u64) -> String {
    format!(
        "⚠️ Server {} response time is slow: {}ms (threshold: {}ms)",
        url, latency_ms, threshold_ms
    )
}

pub fn ssl_expiry_message(url: &str, days: i64, threshold: u32) -> String {
    format!(
        "⚠️ SSL certificate for {} will expire in {} days (threshold: {} days)",
        url, days, threshold
    )
}
