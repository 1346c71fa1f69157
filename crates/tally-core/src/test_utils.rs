//! Test utilities for tally-core
//!
//! - `RecordingChat` and `MemorySheets`: in-process doubles for the chat
//!   transport and the spreadsheet, recording every call
//! - `MockApiServer`: a local HTTP server speaking enough of the Telegram
//!   Bot API and the Sheets v4 API to exercise the real clients

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::chat::ChatTransport;
use crate::error::{Error, Result};
use crate::models::{ChatId, MessageId};
use crate::sheets::SheetStore;

// ============================================================================
// Chat transport double
// ============================================================================

#[derive(Default)]
struct ChatState {
    sent: Vec<(ChatId, String)>,
    fetched: Vec<String>,
    /// file_id -> (url, content)
    files: HashMap<String, (String, Vec<u8>)>,
    fail_sends: bool,
    next_message_id: MessageId,
}

/// Chat transport that records messages and serves registered files
#[derive(Default)]
pub struct RecordingChat {
    state: Mutex<ChatState>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `file_id` resolve to `url`, which downloads as `content`
    pub fn add_file(&self, file_id: &str, url: &str, content: &str) {
        self.state.lock().unwrap().files.insert(
            file_id.to_string(),
            (url.to_string(), content.as_bytes().to_vec()),
        );
    }

    /// Make every following `send_text` fail
    pub fn fail_sends(&self) {
        self.state.lock().unwrap().fail_sends = true;
    }

    /// Messages sent so far as (chat, text)
    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// URLs downloaded so far
    pub fn fetched(&self) -> Vec<String> {
        self.state.lock().unwrap().fetched.clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(Error::Transport("sendMessage failed".to_string()));
        }
        state.sent.push((chat, text.to_string()));
        state.next_message_id += 1;
        Ok(state.next_message_id)
    }

    async fn resolve_file_url(&self, file_id: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(file_id)
            .map(|(url, _)| url.clone())
            .ok_or_else(|| Error::Transport(format!("getFile failed: file not found: {}", file_id)))
    }

    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(url.to_string());
        state
            .files
            .values()
            .find(|(u, _)| u == url)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| Error::Transport(format!("download failed: {}", url)))
    }
}

// ============================================================================
// Spreadsheet double
// ============================================================================

/// A call made against `MemorySheets`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetCall {
    /// Range read
    Get(String),
    /// Sheet name and number of rows
    Append(String, usize),
}

#[derive(Default)]
struct SheetState {
    sheets: HashMap<String, Vec<Vec<String>>>,
    calls: Vec<SheetCall>,
    failing_reads: HashSet<String>,
    fail_appends: bool,
}

/// In-memory spreadsheet with failure injection
#[derive(Default)]
pub struct MemorySheets {
    state: Mutex<SheetState>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a sheet
    pub fn seed(&self, sheet: &str, rows: Vec<Vec<String>>) {
        self.state
            .lock()
            .unwrap()
            .sheets
            .insert(sheet.to_string(), rows);
    }

    /// Make reads of any range on `sheet` fail
    pub fn fail_reads_for(&self, sheet: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_reads
            .insert(sheet.to_string());
    }

    pub fn fail_appends(&self) {
        self.state.lock().unwrap().fail_appends = true;
    }

    pub fn rows(&self, sheet: &str) -> Vec<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .sheets
            .get(sheet)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<SheetCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl SheetStore for MemorySheets {
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SheetCall::Get(range.to_string()));

        let (sheet, cells) = range.split_once('!').unwrap_or((range, ""));
        if state.failing_reads.contains(sheet) {
            return Err(Error::Store(format!("Reading {} failed", range)));
        }

        let rows = state.sheets.get(sheet).cloned().unwrap_or_default();
        Ok(select_range(rows, cells))
    }

    async fn append_rows(&self, sheet: &str, rows: &[Vec<String>]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(SheetCall::Append(sheet.to_string(), rows.len()));

        if state.fail_appends {
            return Err(Error::Store(format!("Appending to {} failed", sheet)));
        }

        state
            .sheets
            .entry(sheet.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(())
    }
}

/// `A1` reads the first cell only; anything else returns the whole sheet
fn select_range(rows: Vec<Vec<String>>, cells: &str) -> Vec<Vec<String>> {
    if cells != "A1" {
        return rows;
    }
    rows.first()
        .and_then(|row| row.first())
        .filter(|cell| !cell.is_empty())
        .map(|cell| vec![vec![cell.clone()]])
        .unwrap_or_default()
}

// ============================================================================
// Mock HTTP server
// ============================================================================

/// Bearer token the mock Sheets endpoints accept
pub const MOCK_SHEETS_TOKEN: &str = "mock-sheets-token";

#[derive(Default)]
struct ApiState {
    sent: Vec<(ChatId, String)>,
    /// file_id -> (file_path, content)
    files: HashMap<String, (String, Vec<u8>)>,
    /// file_ids that resolve but no longer download
    expired_files: HashSet<String>,
    webhook_url: String,
    sheets: HashMap<String, Vec<Vec<String>>>,
    next_message_id: MessageId,
}

type SharedApiState = Arc<Mutex<ApiState>>;

/// Mock Telegram Bot API + Sheets API server for client tests
pub struct MockApiServer {
    addr: SocketAddr,
    state: SharedApiState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockApiServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state: SharedApiState = Arc::default();

        let app = Router::new()
            .route("/:bot/:method", post(handle_bot_method))
            .route("/file/:bot/*path", get(handle_file_download))
            .route(
                "/v4/spreadsheets/:id/values/:range",
                get(handle_get_values).post(handle_append),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL, usable for both the Bot API and the Sheets API
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Register a downloadable file
    pub fn add_file(&self, file_id: &str, file_path: &str, content: &[u8]) {
        self.state.lock().unwrap().files.insert(
            file_id.to_string(),
            (file_path.to_string(), content.to_vec()),
        );
    }

    /// Keep `file_id` resolvable but make its download answer 404
    pub fn expire_file(&self, file_id: &str) {
        self.state
            .lock()
            .unwrap()
            .expired_files
            .insert(file_id.to_string());
    }

    pub fn sent_messages(&self) -> Vec<(ChatId, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sheet_rows(&self, sheet: &str) -> Vec<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .sheets
            .get(sheet)
            .cloned()
            .unwrap_or_default()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockApiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bot_ok(result: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "ok": true, "result": result })))
}

fn bot_error(status: StatusCode, description: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({
            "ok": false,
            "error_code": status.as_u16(),
            "description": description,
        })),
    )
}

/// Bot API method endpoint (`POST /bot<token>/<method>`)
async fn handle_bot_method(
    State(state): State<SharedApiState>,
    Path((_bot, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();

    match method.as_str() {
        "sendMessage" => {
            let chat = body["chat_id"].as_i64().unwrap_or_default();
            let text = body["text"].as_str().unwrap_or_default().to_string();
            state.sent.push((chat, text));
            state.next_message_id += 1;
            bot_ok(json!({ "message_id": state.next_message_id, "chat": { "id": chat } }))
        }
        "getFile" => {
            let file_id = body["file_id"].as_str().unwrap_or_default();
            match state.files.get(file_id) {
                Some((path, content)) => bot_ok(json!({
                    "file_id": file_id,
                    "file_size": content.len(),
                    "file_path": path,
                })),
                None => bot_error(StatusCode::BAD_REQUEST, "Bad Request: file not found"),
            }
        }
        "getWebhookInfo" => bot_ok(json!({
            "url": state.webhook_url,
            "pending_update_count": 0,
        })),
        "setWebhook" => {
            state.webhook_url = body["url"].as_str().unwrap_or_default().to_string();
            bot_ok(json!(true))
        }
        _ => bot_error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// File download endpoint (`GET /file/bot<token>/<file_path>`)
async fn handle_file_download(
    State(state): State<SharedApiState>,
    Path((_bot, path)): Path<(String, String)>,
) -> Response {
    let state = state.lock().unwrap();
    let found = state
        .files
        .iter()
        .find(|(id, (p, _))| *p == path && !state.expired_files.contains(*id));
    match found {
        Some((_, (_, content))) => content.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", MOCK_SHEETS_TOKEN))
        .unwrap_or(false)
}

fn sheets_error(status: StatusCode) -> Response {
    (
        status,
        Json(json!({ "error": { "code": status.as_u16(), "status": status.to_string() } })),
    )
        .into_response()
}

/// `GET /v4/spreadsheets/<id>/values/<range>`
async fn handle_get_values(
    State(state): State<SharedApiState>,
    Path((_id, range)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return sheets_error(StatusCode::UNAUTHORIZED);
    }

    let state = state.lock().unwrap();
    let (sheet, cells) = range.split_once('!').unwrap_or((range.as_str(), ""));
    let rows = select_range(
        state.sheets.get(sheet).cloned().unwrap_or_default(),
        cells,
    );

    // Blank ranges come back without a `values` field
    let mut body = json!({ "range": range, "majorDimension": "ROWS" });
    if !rows.is_empty() {
        body["values"] = json!(rows);
    }
    Json(body).into_response()
}

/// `POST /v4/spreadsheets/<id>/values/<sheet>!A:E:append`
async fn handle_append(
    State(state): State<SharedApiState>,
    Path((id, range)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return sheets_error(StatusCode::UNAUTHORIZED);
    }
    let Some(target) = range.strip_suffix(":append") else {
        return sheets_error(StatusCode::NOT_FOUND);
    };
    let sheet = target.split('!').next().unwrap_or(target).to_string();

    let rows: Vec<Vec<String>> = serde_json::from_value(body["values"].clone()).unwrap_or_default();
    let updated = rows.len();

    let mut state = state.lock().unwrap();
    state.sheets.entry(sheet).or_default().extend(rows);

    Json(json!({
        "spreadsheetId": id,
        "updates": { "updatedRange": target, "updatedRows": updated },
    }))
    .into_response()
}
