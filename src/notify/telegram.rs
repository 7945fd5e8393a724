//! Telegram Bot API notifier.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Notifier, NotifyError};

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Sends messages to one Telegram chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    token: String,
    chat_id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    /// `proxy`, when given, carries all Bot API traffic.
    pub fn new(
        api_url: &str,
        token: &str,
        chat_id: i64,
        proxy: Option<&str>,
    ) -> Result<Self, NotifyError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
            tracing::info!("Telegram API requests go through proxy");
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn check_response(response: reqwest::Response) -> Result<(), NotifyError> {
        let status = response.status();
        let body: ApiResponse = response.json().await?;
        if !body.ok {
            return Err(NotifyError::Api(
                body.description
                    .unwrap_or_else(|| format!("status {}", status.as_u16())),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .json(&payload)
            .send()
            .await?;

        Self::check_response(response).await
    }

    async fn check_connectivity(&self) -> Result<(), NotifyError> {
        let response = self.client.get(self.endpoint("getMe")).send().await?;
        Self::check_response(response).await
    }
}
