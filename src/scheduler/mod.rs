//! Scheduler that triggers check cycles on a fixed interval.

use crate::monitor::Monitor;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

/// Fires [`Monitor::run_cycle`] every `interval`.
pub struct Scheduler {
    monitor: Arc<Monitor>,
    interval: Duration,
    alert_threshold: u32,
    stop: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl Scheduler {
    pub fn new(monitor: Arc<Monitor>, interval: Duration, alert_threshold: u32) -> Self {
        Self {
            monitor,
            interval,
            alert_threshold,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the background timer. The first cycle runs immediately.
    pub async fn start(&self) {
        let (tx, mut rx) = broadcast::channel(1);
        {
            let mut stop = self.stop.lock().await;
            if stop.is_some() {
                return; // Already running
            }
            *stop = Some(tx);
        }

        let monitor = self.monitor.clone();
        let alert_threshold = self.alert_threshold;
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "Scheduler: Checking targets every {:?} (alert threshold {})",
            self.interval,
            alert_threshold
        );

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        // Cycles are not serialized against each other; the
                        // store lock orders their loads and saves.
                        let monitor = monitor.clone();
                        tokio::spawn(async move {
                            monitor.run_cycle(alert_threshold).await;
                        });
                    }
                }
            }
            tracing::info!("Scheduler: Stopped");
        });
    }

    /// Stop issuing new cycles. A cycle already in flight runs to completion.
    pub async fn stop(&self) {
        let mut stop = self.stop.lock().await;
        if let Some(tx) = stop.take() {
            let _ = tx.send(());
        }
    }
}
