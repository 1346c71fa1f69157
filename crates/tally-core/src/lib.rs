//! Tally Core Library
//!
//! Shared functionality for the Tally expense upload bot:
//! - Per-user upload sessions with expiry
//! - Spendee CSV export parsing, grouped by ended month
//! - Write-once-per-month spreadsheet writer
//! - Telegram Bot API and Google Sheets clients behind small traits
//! - Configuration loading (TOML file + environment)

pub mod chat;
pub mod config;
pub mod error;
pub mod import;
pub mod models;
pub mod notify;
pub mod session;
pub mod sheets;
pub mod upload;
pub mod writer;

/// Test utilities including recording doubles and a mock API server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chat::{parse_update, ChatTransport, TelegramClient, WebhookChange};
pub use config::Config;
pub use error::{Error, Result};
pub use import::{month_start, parse_export, ParsedExport};
pub use models::{
    Attachment, ChatId, Command, ExpenseRecord, InboundMessage, MessageId, MonthGroup, UserId,
    WriteOutcome, WriteStatus,
};
pub use notify::{compose_summary, Notifier};
pub use session::{InMemorySessionStore, Session, SessionStore};
pub use sheets::{GoogleSheetsClient, ServiceAccountKey, SheetStore, TokenSource};
pub use upload::UploadService;
pub use writer::write_month_groups;
