//! User notifications
//!
//! Messages are addressed by user: the chat to deliver to is taken from the
//! user's session, so notifications only work while a session exists.

use std::sync::Arc;

use tracing::{error, info};

use crate::chat::ChatTransport;
use crate::error::Result;
use crate::models::{MessageId, UserId};
use crate::session::SessionStore;

/// Link placeholder until the bot can share the spreadsheet URL
const RESULT_URL: &str = "TBA";

/// Summary sent when an upload has been processed
pub fn compose_summary(notes: &[String]) -> String {
    let mut summary = String::from("Finished");
    for note in notes {
        summary.push_str("\n- ");
        summary.push_str(note);
    }
    summary.push_str("\n\nURL: ");
    summary.push_str(RESULT_URL);
    summary
}

#[derive(Clone)]
pub struct Notifier {
    chat: Arc<dyn ChatTransport>,
    sessions: Arc<dyn SessionStore>,
}

impl Notifier {
    pub fn new(chat: Arc<dyn ChatTransport>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { chat, sessions }
    }

    /// Send `text` to the chat bound to the user's session
    pub async fn notify(&self, user: UserId, text: &str) -> Result<MessageId> {
        let chat = self.sessions.chat_id(user).await?;
        self.chat.send_text(chat, text).await
    }

    /// Report the outcome and end the user's session.
    ///
    /// The session is deleted even when the summary cannot be delivered.
    pub async fn finish(&self, user: UserId, notes: &[String]) {
        let summary = compose_summary(notes);
        match self.notify(user, &summary).await {
            Ok(_) => info!(user, notes = notes.len(), "Sent upload summary"),
            Err(e) => error!(user, error = %e, "Failed to send upload summary"),
        }
        self.sessions.delete(user).await;
    }
}
