//! Minimal Telegram Bot API client: `sendMessage` and long-polled `getUpdates`.

use crate::dispatcher::Notifier;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Server-side long-poll wait; the HTTP timeout must exceed it.
pub const LONG_POLL_SECS: u64 = 30;
const HTTP_TIMEOUT: Duration = Duration::from_secs(LONG_POLL_SECS + 15);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    link_preview_options: serde_json::Value,
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, bot_token: &str) -> Result<Self> {
        if bot_token.trim().is_empty() {
            anyhow::bail!("Telegram bot token is empty");
        }

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(TelegramClient {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
        })
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: "MarkdownV2",
            link_preview_options: json!({ "is_disabled": true }),
        };

        let response: ApiResponse<serde_json::Value> = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&body)
            .send()
            .await
            .context("sendMessage request failed")?
            .json()
            .await
            .context("sendMessage returned an unreadable body")?;

        into_result(response).map(|_| ())
    }

    /// Updates after `offset`, waiting up to [`LONG_POLL_SECS`] for new ones.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let response: ApiResponse<Vec<Update>> = self
            .http
            .get(format!("{}/getUpdates", self.base_url))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("getUpdates returned an unreadable body")?;

        into_result(response)
    }
}

fn into_result<T>(response: ApiResponse<T>) -> Result<T> {
    if !response.ok {
        anyhow::bail!(
            "Telegram API error: {}",
            response
                .description
                .unwrap_or_else(|| "no description".to_string())
        );
    }
    response
        .result
        .context("Telegram API response has no result")
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        self.send_message(recipient, text).await
    }
}
