//! Spreadsheet abstraction
//!
//! The writer only needs two operations: read a range and append rows to a
//! sheet. `GoogleSheetsClient` implements them against the Sheets REST API.

pub mod google;

pub use google::{GoogleSheetsClient, ServiceAccountKey, TokenSource};

use async_trait::async_trait;

use crate::error::Result;

/// Tabular store the month groups are written to
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Values in `range` (A1 notation, e.g. `01!A1`); empty when blank
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>>;

    /// Append rows after the last non-empty row of `sheet`
    async fn append_rows(&self, sheet: &str, rows: &[Vec<String>]) -> Result<()>;
}
