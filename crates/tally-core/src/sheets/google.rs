//! Google Sheets REST client
//!
//! Talks to the Sheets v4 `values` endpoints of one spreadsheet. Access
//! tokens come either from configuration (static bearer token) or from a
//! service account key, exchanged through the OAuth JWT-bearer grant and
//! cached until shortly before they expire.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

use super::SheetStore;

/// Public Sheets API endpoint
pub const DEFAULT_SHEETS_BASE: &str = "https://sheets.googleapis.com";

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Requested lifetime of a service account assertion
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Refresh cached tokens this long before Google would reject them
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Columns written per row: date, category, amount, note, label
const APPEND_COLUMNS: &str = "A:E";

/// Fields of a service account JSON key that the token exchange needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Load a key downloaded from the Google Cloud console
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Where access tokens come from
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Pre-issued bearer token, used as is
    Static(String),
    /// Service account key, exchanged on demand
    ServiceAccount(ServiceAccountKey),
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Sheets client bound to one spreadsheet
#[derive(Clone)]
pub struct GoogleSheetsClient {
    http_client: Client,
    base_url: String,
    spreadsheet_id: String,
    tokens: TokenSource,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl GoogleSheetsClient {
    pub fn new(spreadsheet_id: &str, tokens: TokenSource, timeout: Duration) -> Result<Self> {
        Self::with_base_url(spreadsheet_id, tokens, DEFAULT_SHEETS_BASE, timeout)
    }

    pub fn with_base_url(
        spreadsheet_id: &str,
        tokens: TokenSource,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            tokens,
            cached: Arc::new(Mutex::new(None)),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url, self.spreadsheet_id, range
        )
    }

    async fn access_token(&self) -> Result<String> {
        let key = match &self.tokens {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount(key) => key,
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        let token = self.exchange_token(key).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn exchange_token(&self, key: &ServiceAccountKey) -> Result<CachedToken> {
        let assertion = sign_assertion(key)?;

        let response = self
            .http_client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "Token exchange failed with status {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Obtained Sheets access token");

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}

fn sign_assertion(key: &ServiceAccountKey) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Auth(format!("System clock before epoch: {}", e)))?
        .as_secs();

    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SHEETS_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| Error::Auth(format!("Invalid service account private key: {}", e)))?;

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| Error::Auth(format!("Failed to sign assertion: {}", e)))
}

#[async_trait]
impl SheetStore for GoogleSheetsClient {
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(self.values_url(range))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "Reading {} failed with status {}: {}",
                range, status, body
            )));
        }

        let values: ValueRange = response.json().await?;
        debug!(range, rows = values.values.len(), "Read sheet values");

        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_rows(&self, sheet: &str, rows: &[Vec<String>]) -> Result<()> {
        let token = self.access_token().await?;
        let range = format!("{}!{}", sheet, APPEND_COLUMNS);

        let response = self
            .http_client
            .post(format!("{}:append", self.values_url(&range)))
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(token)
            .json(&AppendBody {
                major_dimension: "ROWS",
                values: rows,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "Appending to {} failed with status {}: {}",
                range, status, body
            )));
        }

        debug!(range = %range, rows = rows.len(), "Appended sheet rows");
        Ok(())
    }
}

/// Cells are normally strings, but numbers and booleans come back unquoted
/// with some render options
fn cell_to_string(cell: serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AppendBody<'a> {
    major_dimension: &'a str,
    values: &'a [Vec<String>],
}
