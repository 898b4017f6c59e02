//! Time-aware joins between disposition and due streams.

use std::collections::{HashMap, HashSet};

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::table::{Column, Table, TableError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsofDirection {
    /// Latest right record at or before the left timestamp.
    Backward,
    /// Earliest right record at or after the left timestamp.
    Forward,
    /// Smallest absolute distance; ties go to the earlier right record.
    Nearest,
}

impl AsofDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backward => "backward",
            Self::Forward => "forward",
            Self::Nearest => "nearest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsofJoinSpec {
    pub left_customer: String,
    pub left_timestamp: String,
    pub right_customer: String,
    pub right_timestamp: String,
    pub direction: AsofDirection,
    /// Matches farther away than this are dropped.
    pub tolerance: Option<ChronoDuration>,
    /// `(right source column, output name)` pairs appended to the left table.
    pub columns: Vec<(String, String)>,
}

/// Left rows in their original order with the matched right row's selected
/// columns appended. Matching only considers right rows of the same customer;
/// unmatched rows, and left rows with a missing id or timestamp, get missing
/// cells. Among right rows sharing a timestamp the earliest in table order
/// wins.
pub fn asof_join(left: &Table, right: &Table, spec: &AsofJoinSpec) -> Result<Table, TableError> {
    let left_ids = left.keys(&spec.left_customer)?;
    let left_ts = left.timestamps(&spec.left_timestamp)?;

    let mut selected = Vec::with_capacity(spec.columns.len());
    let mut aliases = HashSet::new();
    for (source, alias) in &spec.columns {
        if left.has_column(alias) || !aliases.insert(alias.as_str()) {
            return Err(TableError::DuplicateColumn(alias.clone()));
        }
        selected.push((right.column(source)?, alias));
    }

    let index = right_index(right, &spec.right_customer, &spec.right_timestamp)?;
    let matches: Vec<Option<usize>> = left_ids
        .iter()
        .zip(left_ts)
        .map(|(id, ts)| {
            let (id, ts) = (id.as_ref()?, (*ts)?);
            let candidates = index.get(id)?;
            let (matched_ts, row) = find_match(candidates, ts, spec.direction)?;
            match spec.tolerance {
                Some(tol) if (matched_ts - ts).abs() > tol => None,
                _ => Some(row),
            }
        })
        .collect();

    let matched = matches.iter().filter(|m| m.is_some()).count();
    info!(
        component = "asof",
        event = "asof.joined",
        direction = spec.direction.as_str(),
        left_rows = left.num_rows(),
        right_rows = right.num_rows(),
        matched,
        unmatched = matches.len() - matched
    );

    let mut out = left.clone();
    for (column, alias) in selected {
        let data = column.data.take_optional(&matches);
        out = out.with_column(Column::new(alias.as_str(), data))?;
    }
    Ok(out)
}

/// Nearest due date for each disposition, appended as `due_date`.
pub fn impute_due_dates(dispositions: &Table, dues: &Table) -> Result<Table, TableError> {
    asof_join(
        dispositions,
        dues,
        &AsofJoinSpec {
            left_customer: "lan".to_string(),
            left_timestamp: "created_at".to_string(),
            right_customer: "lan".to_string(),
            right_timestamp: "due_date".to_string(),
            direction: AsofDirection::Nearest,
            tolerance: None,
            columns: vec![("due_date".to_string(), "due_date".to_string())],
        },
    )
}

/// Due-level outcome flags carried onto dispositions, `(source, alias)`.
pub const DUE_OUTCOME_COLUMNS: [(&str, &str); 5] = [
    ("due_date", "next_due_date"),
    ("fl_bounce", "next_fl_bounce"),
    ("fl_unresolved", "next_fl_unresolved"),
    ("fl_bounce_tp3", "next_fl_bounce_tp3"),
    ("fl_bounce_tp5", "next_fl_bounce_tp5"),
];

/// Labels each disposition with the outcome of the first due at or after it.
pub fn merge_dispositions_to_dues(dues: &Table, dispositions: &Table) -> Result<Table, TableError> {
    asof_join(
        dispositions,
        dues,
        &AsofJoinSpec {
            left_customer: "lan".to_string(),
            left_timestamp: "created_at".to_string(),
            right_customer: "lan".to_string(),
            right_timestamp: "due_date".to_string(),
            direction: AsofDirection::Forward,
            tolerance: None,
            columns: DUE_OUTCOME_COLUMNS
                .iter()
                .map(|(source, alias)| (source.to_string(), alias.to_string()))
                .collect(),
        },
    )
}

fn right_index(
    right: &Table,
    customer: &str,
    timestamp: &str,
) -> Result<HashMap<String, Vec<(NaiveDateTime, usize)>>, TableError> {
    let ts = right.timestamps(timestamp)?;
    let mut index = HashMap::new();
    for group in right.group_runs(customer, timestamp)? {
        let dated: Vec<(NaiveDateTime, usize)> = group
            .rows
            .iter()
            .filter_map(|&row| ts[row].map(|t| (t, row)))
            .collect();
        if !dated.is_empty() {
            index.insert(group.customer, dated);
        }
    }
    Ok(index)
}

/// `candidates` must be sorted by timestamp, stably.
fn find_match(
    candidates: &[(NaiveDateTime, usize)],
    at: NaiveDateTime,
    direction: AsofDirection,
) -> Option<(NaiveDateTime, usize)> {
    let forward = candidates
        .get(candidates.partition_point(|(ts, _)| *ts < at))
        .copied();
    let backward = match candidates.partition_point(|(ts, _)| *ts <= at) {
        0 => None,
        end => {
            let ts = candidates[end - 1].0;
            Some(candidates[candidates.partition_point(|(c, _)| *c < ts)])
        }
    };

    match direction {
        AsofDirection::Forward => forward,
        AsofDirection::Backward => backward,
        AsofDirection::Nearest => match (backward, forward) {
            (Some(b), Some(f)) if f.0 - at < at - b.0 => Some(f),
            (Some(b), _) => Some(b),
            (None, f) => f,
        },
    }
}
