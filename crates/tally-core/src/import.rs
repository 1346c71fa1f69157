//! Spendee CSV export parser
//!
//! Export format (header + one row per transaction):
//! `Date,Wallet,Type,Category name,Amount,Currency,Note,Labels,Author`
//!
//! Only fully elapsed months are imported. Exports are ordered by date, so
//! the first record at or after the start of the current month ends the
//! import: everything after it is current-month data as well.

use std::collections::BTreeMap;
use std::io::Read;

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{ExpenseRecord, MonthGroup};

/// Column 0 value that marks the header line
const HEADER_MARKER: &str = "Date";

const COL_DATE: usize = 0;
const COL_CATEGORY: usize = 3;
const COL_AMOUNT: usize = 4;
const COL_NOTE: usize = 6;
const COL_LABEL: usize = 7;

/// Records grouped by month, plus notes for the user
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedExport {
    /// Month code -> group, iterated in ascending month order
    pub groups: BTreeMap<String, MonthGroup>,
    pub notes: Vec<String>,
}

impl ParsedExport {
    pub fn record_count(&self) -> usize {
        self.groups.values().map(|g| g.records.len()).sum()
    }

    fn push(&mut self, record: ExpenseRecord) {
        let month = record.month_code();
        self.groups
            .entry(month.clone())
            .or_insert_with(|| MonthGroup::new(month))
            .records
            .push(record);
    }
}

/// First instant of the month containing `now`, in UTC
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Parse a Spendee export, keeping only records before `cutoff`.
///
/// Malformed rows never fail the whole import: reading stops at the first
/// bad row and whatever was collected so far is returned.
pub fn parse_export<R: Read>(reader: R, cutoff: DateTime<Utc>) -> ParsedExport {
    let mut rdr = ReaderBuilder::new().has_headers(false).from_reader(reader);

    let mut export = ParsedExport::default();

    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Stopped reading CSV");
                break;
            }
        };

        if record.get(COL_DATE) == Some(HEADER_MARKER) {
            continue;
        }

        let line = record.position().map(|p| p.line());

        // The cutoff only needs the date, so a short current-month row still
        // produces the note
        let occurred_at = match record
            .get(COL_DATE)
            .ok_or_else(|| Error::Parse(format!("Missing date (column {})", COL_DATE)))
            .and_then(parse_date)
        {
            Ok(occurred_at) => occurred_at,
            Err(e) => {
                warn!(error = %e, line = ?line, "Stopped reading CSV");
                break;
            }
        };

        if occurred_at >= cutoff {
            let note = format!(
                "can only process ended month: {}",
                occurred_at.format("%Y-%m-%d")
            );
            warn!("{}", note);
            export.notes.push(note);
            break;
        }

        match parse_record(&record, occurred_at) {
            Ok(expense) => export.push(expense),
            Err(e) => {
                warn!(error = %e, line = ?line, "Stopped reading CSV");
                break;
            }
        }
    }

    debug!(
        "Parsed {} expenses in {} month(s)",
        export.record_count(),
        export.groups.len()
    );
    export
}

fn parse_record(
    record: &StringRecord,
    occurred_at: DateTime<FixedOffset>,
) -> Result<ExpenseRecord> {
    let field = |idx: usize, name: &str| {
        record
            .get(idx)
            .map(str::to_string)
            .ok_or_else(|| Error::Parse(format!("Missing {} (column {})", name, idx)))
    };

    Ok(ExpenseRecord {
        occurred_at,
        category: field(COL_CATEGORY, "category")?,
        amount: normalize_amount(&field(COL_AMOUNT, "amount")?),
        note: field(COL_NOTE, "note")?,
        label: field(COL_LABEL, "label")?,
    })
}

fn parse_date(s: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map_err(|e| Error::Parse(format!("Invalid date '{}': {}", s, e)))
}

/// Expenses are exported as negative numbers; the sheet stores magnitudes
fn normalize_amount(s: &str) -> String {
    s.replacen('-', "", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Date,Wallet,Type,Category name,Amount,Currency,Note,Labels,Author";

    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 15, 30, 12).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount("-15.99"), "15.99");
        assert_eq!(normalize_amount("250000"), "250000");
        assert_eq!(normalize_amount("--1"), "-1");
    }

    #[test]
    fn test_parse_export_groups_by_month() {
        let csv = format!(
            "{HEADER}
2024-01-20T10:00:00+00:00,Cash,Expense,Food,-12.50,USD,Lunch,work,me
2024-01-05T08:30:00+00:00,Cash,Expense,Transport,-3.00,USD,Bus,,me
2024-02-11T19:45:00+00:00,Cash,Expense,Food,-40.00,USD,\"Dinner, with friends\",,me"
        );

        let export = parse_export(csv.as_bytes(), cutoff());

        assert!(export.notes.is_empty());
        assert_eq!(export.groups.len(), 2);
        assert_eq!(export.record_count(), 3);

        let jan = &export.groups["01"];
        assert_eq!(jan.records.len(), 2);
        assert_eq!(jan.records[0].category, "Food");
        assert_eq!(jan.records[0].amount, "12.50");
        assert_eq!(jan.records[0].note, "Lunch");
        assert_eq!(jan.records[0].label, "work");
        assert_eq!(jan.records[1].category, "Transport");

        let feb = &export.groups["02"];
        assert_eq!(feb.records[0].note, "Dinner, with friends");

        let rows = jan.rows();
        assert_eq!(rows[0], vec!["date", "category", "amount", "note", "label"]);
        assert_eq!(rows[1][0], "2024-01-20 10:00:00");
    }

    #[test]
    fn test_parse_export_halts_at_cutoff() {
        // The March row after the April row must not be imported
        let csv = format!(
            "{HEADER}
2024-04-02T09:00:00+00:00,Cash,Expense,Food,-1.00,USD,,,me
2024-03-30T09:00:00+00:00,Cash,Expense,Food,-2.00,USD,,,me"
        );

        let export = parse_export(csv.as_bytes(), cutoff());

        assert!(export.groups.is_empty());
        assert_eq!(
            export.notes,
            vec!["can only process ended month: 2024-04-02".to_string()]
        );
    }

    #[test]
    fn test_parse_export_cutoff_is_inclusive() {
        let csv = format!(
            "{HEADER}
2024-03-31T23:59:59+00:00,Cash,Expense,Food,-2.00,USD,,,me
2024-04-01T00:00:00+00:00,Cash,Expense,Food,-1.00,USD,,,me"
        );

        let export = parse_export(csv.as_bytes(), cutoff());

        assert_eq!(export.record_count(), 1);
        assert_eq!(
            export.notes,
            vec!["can only process ended month: 2024-04-01".to_string()]
        );
    }

    #[test]
    fn test_parse_export_keeps_rows_before_malformed_row() {
        let csv = format!(
            "{HEADER}
2024-01-20T10:00:00+00:00,Cash,Expense,Food,-12.50,USD,Lunch,,me
2024-01-21T10:00:00+00:00,Cash,Expense
2024-01-22T10:00:00+00:00,Cash,Expense,Food,-1.00,USD,,,me"
        );

        let export = parse_export(csv.as_bytes(), cutoff());

        assert_eq!(export.record_count(), 1);
        assert!(export.notes.is_empty());
    }

    #[test]
    fn test_parse_export_stops_on_invalid_date() {
        let csv = format!(
            "{HEADER}
2024-01-20T10:00:00+00:00,Cash,Expense,Food,-12.50,USD,Lunch,,me
yesterday,Cash,Expense,Food,-1.00,USD,,,me
2024-01-22T10:00:00+00:00,Cash,Expense,Food,-1.00,USD,,,me"
        );

        let export = parse_export(csv.as_bytes(), cutoff());

        assert_eq!(export.record_count(), 1);
    }

    #[test]
    fn test_cutoff_checked_before_other_columns() {
        // Rows carry only the date column; the cutoff note must still appear
        let export = parse_export("Date,...\n2099-01-15T00:00:00Z,...".as_bytes(), cutoff());

        assert!(export.groups.is_empty());
        assert_eq!(
            export.notes,
            vec!["can only process ended month: 2099-01-15".to_string()]
        );
    }

    #[test]
    fn test_short_ended_month_row_stops_reading() {
        let export = parse_export("Date,...\n2024-01-15T00:00:00Z,...".as_bytes(), cutoff());

        assert!(export.groups.is_empty());
        assert!(export.notes.is_empty());
    }

    #[test]
    fn test_parse_export_empty_input() {
        let export = parse_export("".as_bytes(), cutoff());
        assert!(export.groups.is_empty());
        assert!(export.notes.is_empty());

        let export = parse_export(HEADER.as_bytes(), cutoff());
        assert!(export.groups.is_empty());
    }

    #[test]
    fn test_month_uses_record_offset() {
        // 2024-02-01 01:00 at +07:00 is still January in UTC, but the sheet
        // follows the date as written in the export
        let csv = format!(
            "{HEADER}
2024-02-01T01:00:00+07:00,Cash,Expense,Food,-5,IDR,,,me"
        );

        let export = parse_export(csv.as_bytes(), cutoff());

        assert!(export.groups.contains_key("02"));
        assert_eq!(export.groups["02"].rows()[1][0], "2024-02-01 01:00:00");
    }
}
