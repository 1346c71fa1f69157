//! Spendee upload workflow
//!
//! 1. The user sends `/upload_spendee`: a session is started and the bot asks
//!    for the export.
//! 2. The user sends a document: the session is checked for expiry, the file
//!    is validated and downloaded, ended months are parsed out of it and
//!    written to the spreadsheet.
//! 3. A summary goes back to the user and the session ends.
//!
//! Nothing is retried. Any failure ends the interaction and the user has to
//! send the command again, except for a wrong file type which keeps the
//! session open for another attempt.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::chat::ChatTransport;
use crate::error::{Error, Result};
use crate::import::{month_start, parse_export};
use crate::models::{ChatId, Command, InboundMessage, UserId};
use crate::notify::Notifier;
use crate::session::SessionStore;
use crate::sheets::SheetStore;
use crate::writer::write_month_groups;

pub const PROMPT_UPLOAD: &str = "Please upload your Spendee CSV document";
pub const MSG_TIMEOUT: &str = "Request timeout";
pub const MSG_NOT_CSV: &str = "File must be csv, please upload again";
pub const MSG_NO_FILE: &str = "Please send your Spendee export as a CSV file";

/// Entry point for inbound messages
#[derive(Clone)]
pub struct UploadService {
    chat: Arc<dyn ChatTransport>,
    sheets: Arc<dyn SheetStore>,
    sessions: Arc<dyn SessionStore>,
    notifier: Notifier,
}

impl UploadService {
    pub fn new(
        chat: Arc<dyn ChatTransport>,
        sheets: Arc<dyn SheetStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let notifier = Notifier::new(chat.clone(), sessions.clone());
        Self {
            chat,
            sheets,
            sessions,
            notifier,
        }
    }

    /// Route one inbound message.
    ///
    /// `Error::SessionNotFound` means the message arrived outside an upload
    /// interaction; callers usually log it and drop the message.
    pub async fn handle(&self, message: &InboundMessage) -> Result<()> {
        if let Some(command) = &message.command {
            return match command.parse::<Command>() {
                Ok(Command::UploadSpendee) => self.request(message.user_id, message.chat_id).await,
                Err(unknown) => Err(Error::UnknownCommand(unknown)),
            };
        }

        match self.sessions.active_command(message.user_id).await? {
            Command::UploadSpendee => match &message.attachment {
                Some(attachment) => self.process(message.user_id, &attachment.file_id).await,
                None => {
                    // Keep the session so the user can still send the file
                    if let Err(e) = self.notifier.notify(message.user_id, MSG_NO_FILE).await {
                        warn!(user = message.user_id, error = %e, "Failed to send file reminder");
                    }
                    Err(Error::NoFileAttached)
                }
            },
        }
    }

    /// Start an upload interaction and ask for the file
    pub async fn request(&self, user: UserId, chat: ChatId) -> Result<()> {
        self.sessions
            .start(user, chat, Command::UploadSpendee)
            .await;

        let message = self.chat.send_text(chat, PROMPT_UPLOAD).await?;
        self.sessions.attach_message_ref(user, message).await?;

        info!(user, chat, "Waiting for Spendee export");
        Ok(())
    }

    /// Import the uploaded export into the spreadsheet
    pub async fn process(&self, user: UserId, file_id: &str) -> Result<()> {
        if self.sessions.is_expired(user).await {
            if let Err(e) = self.notifier.notify(user, MSG_TIMEOUT).await {
                warn!(user, error = %e, "Failed to send timeout notice");
            }
            self.sessions.delete(user).await;
            info!(user, "Upload session timed out");
            return Ok(());
        }

        let url = match self.chat.resolve_file_url(file_id).await {
            Ok(url) => url,
            Err(e) => return self.abort(user, "failed to read uploaded file", e).await,
        };

        if !url.to_lowercase().ends_with(".csv") {
            if let Err(e) = self.notifier.notify(user, MSG_NOT_CSV).await {
                warn!(user, error = %e, "Failed to send file type notice");
            }
            return self.sessions.reset_timer(user).await;
        }

        let content = match self.chat.fetch_file(&url).await {
            Ok(content) => content,
            Err(e) => return self.abort(user, "failed to download uploaded file", e).await,
        };

        let export = parse_export(content.as_slice(), month_start(Utc::now()));
        let mut notes = export.notes;

        let result = write_month_groups(self.sheets.as_ref(), &export.groups, &mut notes).await;
        self.notifier.finish(user, &notes).await;

        let outcomes = result?;
        info!(user, months = outcomes.len(), "Processed Spendee export");
        Ok(())
    }

    /// Report a failure before any rows were read and end the session.
    ///
    /// The user only sees `what`; error text can carry request URLs, and Bot
    /// API URLs embed the bot token.
    async fn abort(&self, user: UserId, what: &str, err: Error) -> Result<()> {
        warn!(user, error = %err, "{}", what);
        self.notifier.finish(user, &[what.to_string()]).await;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::Attachment;
    use crate::session::InMemorySessionStore;
    use crate::test_utils::{MemorySheets, RecordingChat, SheetCall};

    const HEADER: &str = "Date,Wallet,Type,Category name,Amount,Currency,Note,Labels,Author";

    struct Harness {
        chat: Arc<RecordingChat>,
        sheets: Arc<MemorySheets>,
        sessions: Arc<InMemorySessionStore>,
        service: UploadService,
    }

    fn harness_with_timeout(timeout: Duration) -> Harness {
        let chat = Arc::new(RecordingChat::new());
        let sheets = Arc::new(MemorySheets::new());
        let sessions = Arc::new(InMemorySessionStore::with_timeout(timeout));
        let service = UploadService::new(chat.clone(), sheets.clone(), sessions.clone());
        Harness {
            chat,
            sheets,
            sessions,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with_timeout(Duration::from_secs(300))
    }

    fn command(text: &str) -> InboundMessage {
        InboundMessage {
            user_id: 1,
            chat_id: 100,
            command: Some(text.to_string()),
            text: Some(format!("/{}", text)),
            attachment: None,
        }
    }

    fn document(file_id: &str) -> InboundMessage {
        InboundMessage {
            user_id: 1,
            chat_id: 100,
            command: None,
            text: None,
            attachment: Some(Attachment {
                file_id: file_id.to_string(),
                file_name: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_command_starts_session_and_prompts() {
        let h = harness();

        h.service.handle(&command("upload_spendee")).await.unwrap();

        let session = h.sessions.get(1).await.unwrap();
        assert_eq!(session.chat_id, 100);
        assert_eq!(session.command, Command::UploadSpendee);
        assert!(session.message_ref.is_some());
        assert_eq!(h.chat.sent(), vec![(100, PROMPT_UPLOAD.to_string())]);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let h = harness();
        let err = h.service.handle(&command("start")).await.unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(c) if c == "start"));
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_prompt_failure_aborts_request() {
        let h = harness();
        h.chat.fail_sends();

        let err = h.service.handle(&command("upload_spendee")).await;

        assert!(matches!(err, Err(Error::Transport(_))));
        assert_eq!(h.sessions.get(1).await.unwrap().message_ref, None);
    }

    #[tokio::test]
    async fn test_message_without_session_is_dropped() {
        let h = harness();
        let err = h.service.handle(&document("f")).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(1)));
        assert!(h.chat.sent().is_empty());
    }

    #[tokio::test]
    async fn test_message_without_file_reminds_user() {
        let h = harness();
        h.service.handle(&command("upload_spendee")).await.unwrap();

        let mut text = document("f");
        text.attachment = None;
        text.text = Some("here you go".to_string());
        let err = h.service.handle(&text).await.unwrap_err();

        assert!(matches!(err, Error::NoFileAttached));
        assert_eq!(h.chat.sent().last().unwrap().1, MSG_NO_FILE);
        assert!(h.sessions.get(1).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_session_times_out() {
        let h = harness_with_timeout(Duration::from_millis(100));
        h.chat.add_file("f", "https://files/f.csv", "Date\n");
        h.service.handle(&command("upload_spendee")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        h.service.handle(&document("f")).await.unwrap();

        assert_eq!(h.chat.sent().last().unwrap().1, MSG_TIMEOUT);
        assert!(h.chat.fetched().is_empty());
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_non_csv_resets_timer_and_keeps_session() {
        let h = harness_with_timeout(Duration::from_secs(1));
        h.chat.add_file("f", "https://files/photo.PNG", "");
        h.service.handle(&command("upload_spendee")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        h.service.handle(&document("f")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(h.chat.sent().last().unwrap().1, MSG_NOT_CSV);
        assert!(h.chat.fetched().is_empty());
        assert!(h.sessions.get(1).await.is_some());
        // 1.2s since start but only 600ms since the reset
        assert!(!h.sessions.is_expired(1).await);
    }

    #[tokio::test]
    async fn test_uppercase_csv_extension_is_accepted() {
        let h = harness();
        h.chat.add_file("f", "https://files/EXPORT.CSV", HEADER);
        h.service.handle(&command("upload_spendee")).await.unwrap();

        h.service.handle(&document("f")).await.unwrap();

        assert_eq!(h.chat.fetched(), vec!["https://files/EXPORT.CSV".to_string()]);
        assert_eq!(h.chat.sent().last().unwrap().1, "Finished\n\nURL: TBA");
    }

    #[tokio::test]
    async fn test_current_month_export_writes_nothing() {
        let h = harness();
        h.chat
            .add_file("f", "https://files/export.csv", "Date,...\n2099-01-15T00:00:00Z,...");
        h.service.handle(&command("upload_spendee")).await.unwrap();

        h.service.handle(&document("f")).await.unwrap();

        assert!(h.sheets.calls().is_empty());
        assert_eq!(
            h.chat.sent().last().unwrap().1,
            "Finished\n- can only process ended month: 2099-01-15\n\nURL: TBA"
        );
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_export_is_written_and_summarized() {
        let h = harness();
        h.sheets.seed("02", vec![vec!["date".to_string()]]);
        let csv = format!(
            "{HEADER}
2020-01-20T10:00:00+00:00,Cash,Expense,Food,-12.50,USD,Lunch,,me
2020-01-05T08:30:00+00:00,Cash,Expense,Transport,-3.00,USD,Bus,,me
2020-02-11T19:45:00+00:00,Cash,Expense,Food,-40.00,USD,Dinner,,me"
        );
        h.chat.add_file("f", "https://files/export.csv", &csv);
        h.service.handle(&command("upload_spendee")).await.unwrap();

        h.service.handle(&document("f")).await.unwrap();

        assert_eq!(h.sheets.rows("01").len(), 3);
        assert!(!h
            .sheets
            .calls()
            .iter()
            .any(|c| matches!(c, SheetCall::Append(sheet, _) if sheet == "02")));
        assert_eq!(
            h.chat.sent().last().unwrap().1,
            "Finished\n- data already written: 02!A1, skipping...\n\nURL: TBA"
        );
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_failure_still_reports_and_ends_session() {
        let h = harness();
        h.sheets.fail_reads_for("01");
        let csv = format!("{HEADER}\n2020-01-20T10:00:00+00:00,Cash,Expense,Food,-1,USD,,,me");
        h.chat.add_file("f", "https://files/export.csv", &csv);
        h.service.handle(&command("upload_spendee")).await.unwrap();

        let err = h.service.handle(&document("f")).await.unwrap_err();

        assert!(matches!(err, Error::Store(_)));
        let summary = h.chat.sent().last().unwrap().1.clone();
        assert_eq!(summary, "Finished\n- failed to write 01\n\nURL: TBA");
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_unresolvable_file_ends_session() {
        let h = harness();
        h.service.handle(&command("upload_spendee")).await.unwrap();

        let err = h.service.handle(&document("missing")).await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(
            h.chat.sent().last().unwrap().1,
            "Finished\n- failed to read uploaded file\n\nURL: TBA"
        );
        assert!(h.sessions.is_empty().await);
    }
}
