use crate::error::{NotifyError, Result};
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::NotificationChannel;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const MAX_ATTEMPTS: u32 = 3;

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Telegram Bot API channel posting HTML messages to a single chat.
pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(bot_token: &str, chat_id: &str, api_base: &str, timeout_secs: u64) -> Result<Self> {
        if bot_token.is_empty() || chat_id.is_empty() {
            return Err(NotifyError::InvalidConfig(
                "Telegram bot_token and chat_id are both required".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Fails unless the status is 2xx and the body does not carry `"ok": false`.
    fn check_response(status: reqwest::StatusCode, body: &str) -> Result<Value> {
        let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
        let api_ok = parsed.get("ok").and_then(Value::as_bool).unwrap_or(true);
        if status.is_success() && api_ok {
            return Ok(parsed);
        }
        Err(NotifyError::ApiError {
            service: "telegram".to_string(),
            status: status.as_u16(),
            body: truncate_string(body, MAX_BODY_LENGTH),
        })
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send_message(&self, text: &str) -> Result<()> {
        let payload = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let url = self.method_url("sendMessage");

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match self.client.post(&url).json(&payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    Self::check_response(status, &body).map(|_| ())
                }
                Err(e) => Err(NotifyError::from(e)),
            };

            let err = match outcome {
                Ok(()) => {
                    tracing::info!(chat_id = %self.chat_id, attempt, "Telegram notification sent");
                    return Ok(());
                }
                Err(e) => e,
            };
            if attempt >= MAX_ATTEMPTS || !err.is_retryable() {
                tracing::error!(attempt, error = %err, "Telegram notification failed");
                return Err(err);
            }
            tracing::warn!(attempt, error = %err, "Telegram send failed, retrying");
            tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt - 1))).await;
        }
    }

    async fn verify(&self) -> Result<String> {
        let resp = self.client.get(self.method_url("getMe")).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        let parsed = Self::check_response(status, &body)?;
        let username = parsed
            .pointer("/result/username")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        tracing::info!(username = %username, "Telegram bot verified");
        Ok(username)
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}
