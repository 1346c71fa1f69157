//! Data models for Tally

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Chat platform user identifier
pub type UserId = i64;

/// Chat identifier messages are delivered to
pub type ChatId = i64;

/// Identifier of a message sent by the bot
pub type MessageId = i64;

/// Column names written as the first row of every month sheet
pub const SHEET_HEADER: [&str; 5] = ["date", "category", "amount", "note", "label"];

/// Date format used for the first sheet column
pub const SHEET_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bot commands the gate recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Starts the Spendee CSV upload flow
    UploadSpendee,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::UploadSpendee => "upload_spendee",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload_spendee" => Ok(Command::UploadSpendee),
            other => Err(other.to_string()),
        }
    }
}

/// A file attached to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Transport-specific reference, resolved to a URL before download
    pub file_id: String,
    pub file_name: Option<String>,
}

/// Transport-neutral view of one inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: UserId,
    pub chat_id: ChatId,
    /// Command name without the leading slash or `@bot` suffix
    pub command: Option<String>,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

impl InboundMessage {
    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }
}

/// One parsed line of a Spendee export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseRecord {
    pub occurred_at: DateTime<FixedOffset>,
    pub category: String,
    /// Raw amount with the sign removed
    pub amount: String,
    pub note: String,
    pub label: String,
}

impl ExpenseRecord {
    /// Two-digit month code, also used as the target sheet name
    pub fn month_code(&self) -> String {
        self.occurred_at.format("%m").to_string()
    }

    /// Render as a sheet row: date, category, amount, note, label
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.occurred_at.format(SHEET_DATE_FORMAT).to_string(),
            self.category.clone(),
            self.amount.clone(),
            self.note.clone(),
            self.label.clone(),
        ]
    }
}

/// Expense records of a single calendar month
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGroup {
    pub month: String,
    pub records: Vec<ExpenseRecord>,
}

impl MonthGroup {
    pub fn new(month: impl Into<String>) -> Self {
        Self {
            month: month.into(),
            records: Vec::new(),
        }
    }

    /// Range read to decide whether the month was already written
    pub fn target_range(&self) -> String {
        format!("{}!A1", self.month)
    }

    /// Header row followed by one row per record, in encounter order
    pub fn rows(&self) -> Vec<Vec<String>> {
        let mut rows = Vec::with_capacity(self.records.len() + 1);
        rows.push(SHEET_HEADER.iter().map(|h| h.to_string()).collect());
        rows.extend(self.records.iter().map(ExpenseRecord::to_row));
        rows
    }
}

/// Result of attempting to write one month group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    /// Rows were appended (header included)
    Written { rows: usize },
    /// Target range already held data, nothing was appended
    AlreadyPresent,
    /// The read or append call failed; the batch stopped here
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub month: String,
    pub status: WriteStatus,
}

impl WriteOutcome {
    /// Line reported back to the user, if this outcome warrants one
    pub fn note(&self) -> Option<String> {
        match &self.status {
            WriteStatus::Written { .. } => None,
            WriteStatus::AlreadyPresent => Some(format!(
                "data already written: {}!A1, skipping...",
                self.month
            )),
            // The reason stays in logs; it can hold request details
            WriteStatus::Failed(_) => Some(format!("failed to write {}", self.month)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: &str, category: &str) -> ExpenseRecord {
        ExpenseRecord {
            occurred_at: DateTime::parse_from_rfc3339(ts).unwrap(),
            category: category.to_string(),
            amount: "12.50".to_string(),
            note: "lunch".to_string(),
            label: "work".to_string(),
        }
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(
            "upload_spendee".parse::<Command>(),
            Ok(Command::UploadSpendee)
        );
        assert!("start".parse::<Command>().is_err());
        assert_eq!(Command::UploadSpendee.to_string(), "upload_spendee");
    }

    #[test]
    fn test_record_to_row() {
        let r = record("2024-03-05T14:07:09+07:00", "Food & Drink");
        assert_eq!(r.month_code(), "03");
        assert_eq!(
            r.to_row(),
            vec!["2024-03-05 14:07:09", "Food & Drink", "12.50", "lunch", "work"]
        );
    }

    #[test]
    fn test_month_group_rows_start_with_header() {
        let mut group = MonthGroup::new("01");
        group.records.push(record("2024-01-02T00:00:00Z", "A"));
        group.records.push(record("2024-01-01T00:00:00Z", "B"));

        let rows = group.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["date", "category", "amount", "note", "label"]);
        assert_eq!(rows[1][1], "A");
        assert_eq!(rows[2][1], "B");
        assert_eq!(group.target_range(), "01!A1");
    }

    #[test]
    fn test_write_outcome_notes() {
        let skipped = WriteOutcome {
            month: "02".to_string(),
            status: WriteStatus::AlreadyPresent,
        };
        assert_eq!(
            skipped.note().unwrap(),
            "data already written: 02!A1, skipping..."
        );

        let written = WriteOutcome {
            month: "01".to_string(),
            status: WriteStatus::Written { rows: 3 },
        };
        assert!(written.note().is_none());
    }
}
