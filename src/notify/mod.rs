//! Outbound notifications to a single fixed destination.

mod telegram;

pub use telegram::*;

use async_trait::async_trait;
use thiserror::Error;

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rejected by API: {0}")]
    Api(String),
}

/// A channel that delivers text messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text`. Success means the transport accepted it.
    async fn send(&self, text: &str) -> Result<(), NotifyError>;

    /// Verify the channel is reachable without sending anything.
    async fn check_connectivity(&self) -> Result<(), NotifyError>;
}
