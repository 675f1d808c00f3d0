use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::json;
use tracing::info;

use crate::application::ports::BotNotifierPort;
use crate::infrastructure::core::{CircuitBreaker, CircuitBreakerError, HttpClientFactory};

/// Sends formatted CHoCH alerts to a Telegram chat via the Bot API's
/// `sendMessage` endpoint. Wrapped in a circuit breaker so a sustained
/// Telegram outage degrades to "no bot delivery" instead of stalling the
/// signal bus's concurrency budget.
pub struct TelegramNotifier {
    client: ClientWithMiddleware,
    bot_token: String,
    chat_id: String,
    circuit_breaker: CircuitBreaker,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            bot_token,
            chat_id,
            circuit_breaker: CircuitBreaker::new("TelegramNotifier", 5, 2, Duration::from_secs(60)),
        }
    }

    fn api_url(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token)
    }
}

#[async_trait]
impl BotNotifierPort for TelegramNotifier {
    async fn send_message(&self, text: &str) -> Result<()> {
        if self.bot_token.is_empty() || self.chat_id.is_empty() {
            info!("telegram not configured, skipping bot delivery");
            return Ok(());
        }

        self.circuit_breaker
            .call(async {
                let body = json!({
                    "chat_id": self.chat_id,
                    "text": text,
                    "parse_mode": "Markdown",
                    "disable_web_page_preview": false,
                });

                let response = self
                    .client
                    .post(self.api_url())
                    .json(&body)
                    .send()
                    .await
                    .context("failed to reach Telegram API")?;

                if !response.status().is_success() {
                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("Telegram sendMessage failed: {error_text}");
                }
                Ok(())
            })
            .await
            .map_err(|err| match err {
                CircuitBreakerError::Open(msg) => anyhow::anyhow!("Telegram circuit breaker open: {msg}"),
                CircuitBreakerError::Inner(inner) => inner,
            })
    }
}
