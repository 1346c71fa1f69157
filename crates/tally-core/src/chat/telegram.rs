//! Telegram Bot API client
//!
//! Minimal HTTP client for the handful of Bot API methods the bot uses.
//! Every method answers with an envelope `{"ok": bool, "result": ...,
//! "description": ...}`; `ok == false` is reported as a transport error
//! carrying the description.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Attachment, ChatId, InboundMessage, MessageId};

use super::ChatTransport;

/// Public Bot API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    http_client: Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    /// Create a client against the public Bot API
    pub fn new(token: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_BASE, timeout)
    }

    /// Create a client against a custom API base (local Bot API server, tests)
    pub fn with_base_url(token: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(self.method_url(method))
            .json(params)
            .send()
            .await
            .map_err(redact)?;

        // Failed calls still carry a JSON envelope with a description
        let status = response.status();
        let envelope: ApiResponse<T> = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(redact(e)),
            Err(_) => {
                return Err(Error::Transport(format!(
                    "{} failed with status {}",
                    method, status
                )))
            }
        };

        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(Error::Transport(format!(
                "{} failed: {}",
                method,
                envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    /// Currently registered webhook URL (empty when none)
    pub async fn webhook_url(&self) -> Result<String> {
        let info: WebhookInfo = self.call("getWebhookInfo", &serde_json::json!({})).await?;
        Ok(info.url)
    }

    /// Point the bot's webhook at `url`, skipping the call when already set
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<WebhookChange> {
        if self.webhook_url().await? == url {
            return Ok(WebhookChange::Unchanged);
        }

        let _: bool = self
            .call(
                "setWebhook",
                &SetWebhookParams {
                    url,
                    secret_token: secret,
                },
            )
            .await?;
        debug!(url, "Webhook registered");
        Ok(WebhookChange::Updated)
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId> {
        let message: SentMessage = self
            .call("sendMessage", &SendMessageParams { chat_id: chat, text })
            .await?;
        debug!(chat, message_id = message.message_id, "Sent message");
        Ok(message.message_id)
    }

    async fn resolve_file_url(&self, file_id: &str) -> Result<String> {
        let file: File = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        let path = file
            .file_path
            .ok_or_else(|| Error::Transport(format!("file {} has no download path", file_id)))?;

        Ok(format!("{}/file/bot{}/{}", self.base_url, self.token, path))
    }

    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(redact)?;
        let bytes = response.bytes().await.map_err(redact)?;
        debug!(size = bytes.len(), "Downloaded file");
        Ok(bytes.to_vec())
    }
}

/// Bot API and file URLs embed the token; strip them from errors
fn redact(err: reqwest::Error) -> Error {
    Error::Http(err.without_url())
}

/// Whether `set_webhook` had to change anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookChange {
    Updated,
    Unchanged,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageParams<'a> {
    chat_id: ChatId,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SetWebhookParams<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookInfo {
    #[serde(default)]
    url: String,
}

// ============================================================================
// Inbound updates
// ============================================================================

/// Webhook update as delivered by Telegram (fields we use only)
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
}

impl Message {
    /// Command name without slash and `@bot` suffix, if this is a command
    pub fn command(&self) -> Option<String> {
        let text = self.text.as_deref()?;
        let is_command = match self.entities.first() {
            Some(entity) => entity.kind == "bot_command" && entity.offset == 0,
            None => text.starts_with('/'),
        };
        if !is_command {
            return None;
        }

        let token = text.split_whitespace().next()?.trim_start_matches('/');
        let name = token.split('@').next().unwrap_or(token);
        Some(name.to_string())
    }
}

impl Update {
    /// Transport-neutral message, or None for updates we do not handle
    pub fn inbound(&self) -> Option<InboundMessage> {
        let message = self.message.as_ref()?;
        let user = message.from.as_ref()?;

        Some(InboundMessage {
            user_id: user.id,
            chat_id: message.chat.id,
            command: message.command(),
            text: message.text.clone(),
            attachment: message.document.as_ref().map(|d| Attachment {
                file_id: d.file_id.clone(),
                file_name: d.file_name.clone(),
            }),
        })
    }
}

/// Decode a webhook request body
pub fn parse_update(body: &[u8]) -> Result<Update> {
    Ok(serde_json::from_slice(body)?)
}
