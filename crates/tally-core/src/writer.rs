//! Write-once-per-month sheet writer
//!
//! Each month goes to the sheet named after its two-digit code. A month is
//! only written when its `A1` cell is blank, so re-uploading an export never
//! duplicates rows. The check and the append are separate calls and are not
//! atomic against other writers.

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{MonthGroup, WriteOutcome, WriteStatus};
use crate::sheets::SheetStore;

/// Write every group that is not in the spreadsheet yet.
///
/// Notes for skipped and failed months are appended to `notes`. The first
/// failing read or append stops the batch and is returned; months written
/// before it stay written.
pub async fn write_month_groups(
    store: &dyn SheetStore,
    groups: &BTreeMap<String, MonthGroup>,
    notes: &mut Vec<String>,
) -> Result<Vec<WriteOutcome>> {
    let mut outcomes = Vec::with_capacity(groups.len());

    for (month, group) in groups {
        match write_group(store, group).await {
            Ok(status) => {
                let outcome = WriteOutcome {
                    month: month.clone(),
                    status,
                };
                if let Some(note) = outcome.note() {
                    warn!("{}", note);
                    notes.push(note);
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                error!(month = %month, error = %e, "Failed to write month");
                let outcome = WriteOutcome {
                    month: month.clone(),
                    status: WriteStatus::Failed(e.to_string()),
                };
                notes.extend(outcome.note());
                return Err(e);
            }
        }
    }

    Ok(outcomes)
}

async fn write_group(store: &dyn SheetStore, group: &MonthGroup) -> Result<WriteStatus> {
    let existing = store.get_values(&group.target_range()).await?;
    if !existing.is_empty() {
        return Ok(WriteStatus::AlreadyPresent);
    }

    let rows = group.rows();
    store.append_rows(&group.month, &rows).await?;
    info!(month = %group.month, rows = rows.len(), "Wrote month to sheet");

    Ok(WriteStatus::Written { rows: rows.len() })
}
