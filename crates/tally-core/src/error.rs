//! Error types for Tally

use thiserror::Error;

use crate::models::UserId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No active session for user {0}")]
    SessionNotFound(UserId),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No file attached")]
    NoFileAttached,

    #[error("Invalid command: {0}")]
    UnknownCommand(String),

    #[error("Spreadsheet error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

pub type Result<T> = std::result::Result<T, Error>;

