//! Chat platform abstraction
//!
//! - `ChatTransport` trait: the operations the upload workflow needs
//! - `TelegramClient`: Bot API implementation over HTTP
//!
//! Decoding inbound webhook bodies is platform specific and lives next to
//! the client (`telegram::parse_update`).

pub mod telegram;

pub use telegram::{parse_update, TelegramClient, WebhookChange};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChatId, MessageId};

/// Outbound side of the chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a plain text message, returning the new message's id
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId>;

    /// Turn an attachment reference into a downloadable URL
    async fn resolve_file_url(&self, file_id: &str) -> Result<String>;

    /// Download a previously resolved file
    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>>;
}
