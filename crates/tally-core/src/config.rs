//! Runtime configuration
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables:
//!
//! - `TALLY_BOT_TOKEN`: Telegram bot token (required)
//! - `TALLY_SHEET_ID`: target spreadsheet id (required)
//! - `TALLY_PUBLIC_HOST`: public host name the webhook is reachable at
//! - `TALLY_WEBHOOK_SECRET`: secret Telegram echoes in every webhook call
//! - `TALLY_SHEETS_TOKEN`: static Sheets access token
//! - `GOOGLE_APPLICATION_CREDENTIALS`: service account key file
//! - `TALLY_SESSION_TIMEOUT_SECS`: upload session window (default: 300)
//! - `TALLY_HTTP_TIMEOUT_SECS`: outbound request timeout (default: 30)
//! - `TALLY_TELEGRAM_API`: Bot API base URL (default: public API)
//!
//! Example file (`~/.config/tally/config.toml`):
//!
//! ```toml
//! bot_token = "123456:ABC"
//! sheet_id = "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms"
//! public_host = "tally.example.com"
//! credentials_file = "/etc/tally/service-account.json"
//!
//! [timeouts]
//! session_secs = 300
//! http_secs = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::chat::telegram::{TelegramClient, DEFAULT_API_BASE};
use crate::error::{Error, Result};
use crate::session::DEFAULT_SESSION_TIMEOUT;
use crate::sheets::{GoogleSheetsClient, ServiceAccountKey, TokenSource};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: Option<String>,
    pub sheet_id: Option<String>,
    pub public_host: Option<String>,
    pub webhook_secret: Option<String>,
    pub sheets_token: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub telegram_api: String,
    pub session_timeout: Duration,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            sheet_id: None,
            public_host: None,
            webhook_secret: None,
            sheets_token: None,
            credentials_file: None,
            telegram_api: DEFAULT_API_BASE.to_string(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tally").join("config.toml"))
}

impl Config {
    /// Load the config file (explicit path, else the default location if it
    /// exists) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        parse_config(&content)
    }

    /// Apply overrides from a variable lookup (the process env in `load`)
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("TALLY_BOT_TOKEN") {
            self.bot_token = Some(v);
        }
        if let Some(v) = var("TALLY_SHEET_ID") {
            self.sheet_id = Some(v);
        }
        if let Some(v) = var("TALLY_PUBLIC_HOST") {
            self.public_host = Some(v);
        }
        if let Some(v) = var("TALLY_WEBHOOK_SECRET") {
            self.webhook_secret = Some(v);
        }
        if let Some(v) = var("TALLY_SHEETS_TOKEN") {
            self.sheets_token = Some(v);
        }
        if let Some(v) = var("GOOGLE_APPLICATION_CREDENTIALS") {
            self.credentials_file = Some(PathBuf::from(v));
        }
        if let Some(v) = var("TALLY_TELEGRAM_API") {
            self.telegram_api = v;
        }
        if let Some(secs) = var("TALLY_SESSION_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.session_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = var("TALLY_HTTP_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.http_timeout = Duration::from_secs(secs);
        }
    }

    pub fn bot_token(&self) -> Result<&str> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| Error::Config("bot token not set (TALLY_BOT_TOKEN)".into()))
    }

    pub fn sheet_id(&self) -> Result<&str> {
        self.sheet_id
            .as_deref()
            .ok_or_else(|| Error::Config("spreadsheet id not set (TALLY_SHEET_ID)".into()))
    }

    /// `https://<public_host>/webhook`
    pub fn webhook_url(&self) -> Result<String> {
        let host = self
            .public_host
            .as_deref()
            .ok_or_else(|| Error::Config("public host not set (TALLY_PUBLIC_HOST)".into()))?;
        Ok(format!("https://{}/webhook", host.trim_end_matches('/')))
    }

    /// Sheets credentials; a static token wins over a key file
    pub fn token_source(&self) -> Result<TokenSource> {
        if let Some(token) = &self.sheets_token {
            return Ok(TokenSource::Static(token.clone()));
        }
        match &self.credentials_file {
            Some(path) => Ok(TokenSource::ServiceAccount(ServiceAccountKey::from_file(
                path,
            )?)),
            None => Err(Error::Config(
                "no Sheets credentials (set TALLY_SHEETS_TOKEN or GOOGLE_APPLICATION_CREDENTIALS)"
                    .into(),
            )),
        }
    }

    /// Bot API client for the configured token
    pub fn telegram_client(&self) -> Result<TelegramClient> {
        TelegramClient::with_base_url(self.bot_token()?, &self.telegram_api, self.http_timeout)
    }

    /// Sheets client for the configured spreadsheet
    pub fn sheets_client(&self) -> Result<GoogleSheetsClient> {
        GoogleSheetsClient::new(self.sheet_id()?, self.token_source()?, self.http_timeout)
    }

    /// Check everything the server needs is present
    pub fn validate(&self) -> Result<()> {
        self.bot_token()?;
        self.sheet_id()?;
        if self.sheets_token.is_none() && self.credentials_file.is_none() {
            return Err(Error::Config(
                "no Sheets credentials (set TALLY_SHEETS_TOKEN or GOOGLE_APPLICATION_CREDENTIALS)"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Raw config structure for TOML parsing
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    bot_token: Option<String>,
    sheet_id: Option<String>,
    public_host: Option<String>,
    webhook_secret: Option<String>,
    sheets_token: Option<String>,
    credentials_file: Option<PathBuf>,
    telegram_api: Option<String>,
    timeouts: Option<RawTimeouts>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTimeouts {
    session_secs: Option<u64>,
    http_secs: Option<u64>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = Config {
        bot_token: raw.bot_token,
        sheet_id: raw.sheet_id,
        public_host: raw.public_host,
        webhook_secret: raw.webhook_secret,
        sheets_token: raw.sheets_token,
        credentials_file: raw.credentials_file,
        ..Config::default()
    };

    if let Some(api) = raw.telegram_api {
        config.telegram_api = api;
    }
    if let Some(timeouts) = raw.timeouts {
        if let Some(secs) = timeouts.session_secs {
            config.session_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = timeouts.http_secs {
            config.http_timeout = Duration::from_secs(secs);
        }
    }

    Ok(config)
}
