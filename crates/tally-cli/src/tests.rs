//! CLI command tests

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::commands;

const HEADER: &str = "Date,Wallet,Type,Category name,Amount,Currency,Note,Labels,Author";

fn export_file(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    file
}

// ========== Preview Command Tests ==========

#[test]
fn test_preview_groups_ended_months() {
    let file = export_file(&[
        "2024-01-04T10:00:00+01:00,Cash,Expense,Groceries,-23.10,EUR,Market,,me",
        "2024-01-28T10:00:00+01:00,Cash,Expense,Rent,-800,EUR,,home,me",
        "2024-02-02T10:00:00+01:00,Cash,Expense,Groceries,-12.00,EUR,,,me",
    ]);

    let export = commands::preview_export(file.path(), Some("2024-03-10T00:00:00Z")).unwrap();

    assert_eq!(export.groups.len(), 2);
    assert_eq!(export.groups["01"].records.len(), 2);
    assert_eq!(export.groups["01"].records[1].label, "home");
    assert_eq!(export.groups["02"].records[0].amount, "12.00");
    assert!(export.notes.is_empty());
}

#[test]
fn test_preview_stops_at_current_month() {
    let file = export_file(&[
        "2024-02-27T10:00:00+00:00,Cash,Expense,Groceries,-5,EUR,,,me",
        "2024-03-01T08:00:00+00:00,Cash,Expense,Groceries,-5,EUR,,,me",
    ]);

    let export = commands::preview_export(file.path(), Some("2024-03-10T00:00:00Z")).unwrap();

    assert_eq!(export.record_count(), 1);
    assert_eq!(
        export.notes,
        vec!["can only process ended month: 2024-03-01".to_string()]
    );
}

#[test]
fn test_preview_rejects_bad_now() {
    let file = export_file(&[]);
    let result = commands::preview_export(file.path(), Some("last tuesday"));
    assert!(result.is_err());
}

#[test]
fn test_preview_missing_file() {
    let result = commands::preview_export(Path::new("/nonexistent/export.csv"), None);
    let err = result.unwrap_err();
    assert!(err.to_string().contains("Failed to open file"));
}

#[test]
fn test_cmd_preview_prints() {
    let file = export_file(&["2020-06-01T00:00:00Z,Cash,Expense,Travel,-99,USD,Train,,me"]);
    assert!(commands::cmd_preview(file.path(), None).is_ok());
}

// ========== Config Tests ==========

#[test]
fn test_load_config_from_path() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "sheet_id = \"preview-sheet\"").unwrap();
    writeln!(file, "public_host = \"bot.example.com\"").unwrap();

    let config = commands::load_config(Some(file.path())).unwrap();

    // Environment may override the sheet id but never the webhook path
    assert!(config.sheet_id.is_some());
    assert!(config.webhook_url().unwrap().ends_with("/webhook"));
}

#[test]
fn test_load_config_invalid_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "not = [valid").unwrap();

    let err = commands::load_config(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to load configuration"));
}
