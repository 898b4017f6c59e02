//! PL-only streak tagging over each customer's chronological dues.

use tracing::{info, warn};

use crate::table::{Column, Table, TableError};

pub const PL_ONLY_TENOR: &str = "PL only";
pub const CURRENT_STREAK_COLUMN: &str = "current_pl_only_streak";
pub const STREAK_END_COLUMN: &str = "is_pl_streak_end";
pub const PREVIOUS_STREAK_COLUMN: &str = "previous_pl_only_streak";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakColumns {
    pub customer: String,
    pub due_date: String,
    pub tenor_type: String,
    pub pl_only_value: String,
}

impl Default for StreakColumns {
    fn default() -> Self {
        Self {
            customer: "lan".to_string(),
            due_date: "due_date".to_string(),
            tenor_type: "tenor_type".to_string(),
            pl_only_value: PL_ONLY_TENOR.to_string(),
        }
    }
}

pub fn add_streak_features(table: Table) -> Result<Table, TableError> {
    add_streak_features_with(table, &StreakColumns::default())
}

/// Appends `current_pl_only_streak`, `is_pl_streak_end` and
/// `previous_pl_only_streak`.
///
/// Each customer's dated rows are scanned in due-date order. The counter is
/// the 1-based position inside the current run of PL-only rows and 0 outside
/// one; a row ends a streak when it is PL-only and the next dated row of the
/// same customer is not (or there is none). The previous-streak column holds
/// the length of the customer's last streak that ended before the row, 0 if
/// none has. Rows without a customer id or due date keep missing cells and
/// neither extend nor break a streak. Output rows stay in the caller's order.
pub fn add_streak_features_with(
    table: Table,
    cols: &StreakColumns,
) -> Result<Table, TableError> {
    let n = table.num_rows();
    let mut current = vec![None; n];
    let mut is_end = vec![None; n];
    let mut previous = vec![None; n];
    let mut streaks = 0u64;
    let mut skipped = 0usize;

    {
        let runs = table.group_runs(&cols.customer, &cols.due_date)?;
        let tenors = table.text(&cols.tenor_type)?;
        let due_dates = table.timestamps(&cols.due_date)?;
        let is_pl = |row: usize| tenors[row].as_deref() == Some(cols.pl_only_value.as_str());

        for run in &runs {
            let dated: Vec<usize> = run
                .rows
                .iter()
                .copied()
                .filter(|&row| due_dates[row].is_some())
                .collect();
            skipped += run.rows.len() - dated.len();

            let mut length = 0i64;
            let mut last_completed = 0i64;
            for (pos, &row) in dated.iter().enumerate() {
                let pl = is_pl(row);
                length = if pl { length + 1 } else { 0 };
                let next_pl = dated.get(pos + 1).map_or(false, |&next| is_pl(next));
                let end = pl && !next_pl;
                current[row] = Some(length);
                is_end[row] = Some(end);
                previous[row] = Some(last_completed);
                if end {
                    streaks += 1;
                    last_completed = length;
                }
            }
        }

        skipped += n - runs.iter().map(|r| r.rows.len()).sum::<usize>();
        info!(
            component = "streaks",
            event = "streaks.tagged",
            rows = n,
            customers = runs.len(),
            completed_streaks = streaks
        );
    }

    if skipped > 0 {
        warn!(
            component = "streaks",
            event = "streaks.rows_untagged",
            rows = skipped,
            reason = "missing customer id or due date"
        );
    }

    table
        .with_column(Column::int(CURRENT_STREAK_COLUMN, current))?
        .with_column(Column::bool(STREAK_END_COLUMN, is_end))?
        .with_column(Column::int(PREVIOUS_STREAK_COLUMN, previous))
}
