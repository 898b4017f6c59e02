//! Whole-day gaps since a customer's previous event.

use chrono::NaiveDateTime;
use tracing::info;

use crate::table::{Column, Table, TableError};

const SECONDS_PER_DAY: i64 = 86_400;

pub const TIME_SINCE_LAST_DUE: &str = "time_since_last_due";
pub const TIME_SINCE_LAST_CONTACT: &str = "time_since_last_contact";
pub const TIME_SINCE_LAST_CALL: &str = "time_since_last_call";
pub const TIME_SINCE_LAST_SMS: &str = "time_since_last_sms";
pub const TIME_SINCE_LAST_FIELD: &str = "time_since_last_disposition_event";

/// Contact types and the delta column each one feeds.
pub const CONTACT_TYPE_DELTAS: [(&str, &str); 3] = [
    ("CALL", TIME_SINCE_LAST_CALL),
    ("SMS", TIME_SINCE_LAST_SMS),
    ("DISPOSITION", TIME_SINCE_LAST_FIELD),
];

/// Floor of the elapsed time in days.
pub fn days_between(previous: NaiveDateTime, current: NaiveDateTime) -> i64 {
    (current - previous).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Adds `output` holding the days since the same customer's previous record.
/// The first record of each customer, and any record whose own or previous
/// timestamp is missing, gets a missing delta.
pub fn add_time_since_last(
    table: Table,
    customer: &str,
    timestamp: &str,
    output: &str,
) -> Result<Table, TableError> {
    let deltas = compute_deltas(&table, customer, timestamp, None)?;
    log_deltas(output, &deltas);
    table.with_column(Column::int(output, deltas))
}

/// Like [`add_time_since_last`], but for each `(type_value, output)` pair the
/// previous record is looked up among the customer's rows with the same
/// `type_column` value. Rows of other types get a missing cell in `output`.
pub fn add_time_since_last_by_type(
    table: Table,
    customer: &str,
    timestamp: &str,
    type_column: &str,
    outputs: &[(&str, &str)],
) -> Result<Table, TableError> {
    let mut columns = Vec::with_capacity(outputs.len());
    {
        let types = table.text(type_column)?;
        for (type_value, output) in outputs {
            let mask: Vec<bool> = types
                .iter()
                .map(|t| t.as_deref() == Some(*type_value))
                .collect();
            let deltas = compute_deltas(&table, customer, timestamp, Some(&mask))?;
            log_deltas(output, &deltas);
            columns.push(Column::int(*output, deltas));
        }
    }

    columns
        .into_iter()
        .try_fold(table, |table, column| table.with_column(column))
}

pub fn add_due_deltas(dues: Table) -> Result<Table, TableError> {
    add_time_since_last(dues, "lan", "due_date", TIME_SINCE_LAST_DUE)
}

/// Overall contact gap plus one gap column per contact type.
pub fn add_disposition_deltas(dispositions: Table) -> Result<Table, TableError> {
    let table = add_time_since_last(dispositions, "lan", "created_at", TIME_SINCE_LAST_CONTACT)?;
    add_time_since_last_by_type(table, "lan", "created_at", "type", &CONTACT_TYPE_DELTAS)
}

fn compute_deltas(
    table: &Table,
    customer: &str,
    timestamp: &str,
    mask: Option<&[bool]>,
) -> Result<Vec<Option<i64>>, TableError> {
    let runs = table.group_runs(customer, timestamp)?;
    let ts = table.timestamps(timestamp)?;
    let mut deltas = vec![None; table.num_rows()];

    for run in &runs {
        let mut previous: Option<Option<NaiveDateTime>> = None;
        for &row in &run.rows {
            if mask.map_or(false, |m| !m[row]) {
                continue;
            }
            let current = ts[row];
            deltas[row] = match (previous, current) {
                (Some(Some(prev)), Some(cur)) => Some(days_between(prev, cur)),
                _ => None,
            };
            previous = Some(current);
        }
    }

    Ok(deltas)
}

fn log_deltas(output: &str, deltas: &[Option<i64>]) {
    info!(
        component = "deltas",
        event = "deltas.computed",
        column = output,
        rows = deltas.len(),
        defined = deltas.iter().filter(|d| d.is_some()).count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn days_between_floors_partial_days() {
        assert_eq!(days_between(at(1, 0), at(1, 23)), 0);
        assert_eq!(days_between(at(1, 12), at(3, 11)), 1);
        assert_eq!(days_between(at(1, 0), at(11, 0)), 10);
        assert_eq!(days_between(at(2, 0), at(1, 12)), -1);
    }
}
