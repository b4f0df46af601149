use crate::config::TelegramConfig;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde_json::json;

/// Outbound Telegram notifications. An empty bot token disables sending,
/// which keeps local development and tests offline.
#[derive(Clone)]
pub struct TelegramService {
    client: Client,
    config: TelegramConfig,
}

impl TelegramService {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> AppResult<()> {
        if self.config.bot_token.is_empty() {
            log::debug!("Telegram notifications disabled, dropping message to {chat_id}");
            return Ok(());
        }

        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("Telegram sendMessage to {chat_id} failed: {error_text}");
            Err(AppError::ExternalApiError(format!(
                "Telegram sendMessage failed: {error_text}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_without_token() {
        let service = TelegramService::new(TelegramConfig::default());
        // Must not attempt any network call.
        assert!(service.send_message(42, "hello").await.is_ok());
    }
}
