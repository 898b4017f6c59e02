//! End-to-end wiring: row enrichment, cross-stream merge, customer summaries
//! and rolling-window summaries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::aggregate::{aggregate_dispositions, aggregate_dues, DispositionAggregateOptions};
use crate::asof::merge_dispositions_to_dues;
use crate::deltas::{add_disposition_deltas, add_due_deltas};
use crate::intervals::{training_set_split, IntervalError, IntervalSplit, MAX_INTERVALS};
use crate::streaks::add_streak_features;
use crate::table::{assert_schema_compatible, Table, TableError, TableSchema};

pub const DUE_DATE_COLUMN: &str = "due_date";
pub const CREATED_AT_COLUMN: &str = "created_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub start_date_for_split: NaiveDate,
    pub num_intervals: u32,
    /// Window length in months.
    pub interval_magnitude: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start_date_for_split: NaiveDate::from_ymd_opt(2023, 9, 5).unwrap_or_default(),
            num_intervals: 6,
            interval_magnitude: 12,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.interval_magnitude == 0 {
            return Err(PipelineError::InvalidConfig(
                "interval_magnitude must be >= 1".to_string(),
            ));
        }
        if self.num_intervals > MAX_INTERVALS {
            return Err(PipelineError::InvalidConfig(format!(
                "num_intervals must be <= {MAX_INTERVALS}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Interval(#[from] IntervalError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Dues with gap and streak columns.
    pub dues: Table,
    /// Dispositions with gap columns and the forward-merged due outcomes.
    pub dispositions: Table,
    pub due_summary: Table,
    pub disposition_summary: Table,
    pub due_windows: IntervalSplit,
    pub disposition_windows: IntervalSplit,
    pub due_window_summaries: IntervalSplit,
    pub disposition_window_summaries: IntervalSplit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowManifest {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub due_rows: u64,
    pub disposition_rows: u64,
    pub due_customers: u64,
    pub disposition_customers: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineManifest {
    pub config: PipelineConfig,
    pub due_summary_schema: TableSchema,
    pub disposition_summary_schema: TableSchema,
    pub due_customers: u64,
    pub disposition_customers: u64,
    pub windows: Vec<WindowManifest>,
}

impl PipelineOutput {
    pub fn manifest(&self, config: &PipelineConfig) -> PipelineManifest {
        let windows = self
            .due_windows
            .iter()
            .map(|window| {
                let rows = |split: &IntervalSplit| {
                    split.get(&window.label).map_or(0, |t| t.num_rows() as u64)
                };
                WindowManifest {
                    label: window.label.clone(),
                    start: window.bounds.start,
                    end: window.bounds.end,
                    due_rows: window.table.num_rows() as u64,
                    disposition_rows: rows(&self.disposition_windows),
                    due_customers: rows(&self.due_window_summaries),
                    disposition_customers: rows(&self.disposition_window_summaries),
                }
            })
            .collect();

        PipelineManifest {
            config: config.clone(),
            due_summary_schema: self.due_summary.schema(),
            disposition_summary_schema: self.disposition_summary.schema(),
            due_customers: self.due_summary.num_rows() as u64,
            disposition_customers: self.disposition_summary.num_rows() as u64,
            windows,
        }
    }
}

/// Due gaps, then PL-only streaks.
pub fn enrich_dues(dues: &Table) -> Result<Table, TableError> {
    add_streak_features(add_due_deltas(dues.clone())?)
}

/// Contact gaps, then the forward merge onto the next due.
pub fn enrich_dispositions(dispositions: &Table, dues: &Table) -> Result<Table, TableError> {
    let with_deltas = add_disposition_deltas(dispositions.clone())?;
    merge_dispositions_to_dues(dues, &with_deltas)
}

pub fn run_pipeline(
    dues: &Table,
    dispositions: &Table,
    cfg: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    cfg.validate()?;
    info!(
        component = "pipeline",
        event = "pipeline.start",
        due_rows = dues.num_rows(),
        disposition_rows = dispositions.num_rows(),
        start_date_for_split = %cfg.start_date_for_split,
        num_intervals = cfg.num_intervals,
        interval_magnitude = cfg.interval_magnitude
    );

    let dues = enrich_dues(dues)?;
    let dispositions = enrich_dispositions(dispositions, &dues)?;

    let disposition_opts = DispositionAggregateOptions::with_due_outcomes();
    let due_summary = aggregate_dues(&dues)?;
    let disposition_summary = aggregate_dispositions(&dispositions, &disposition_opts)?;

    let due_windows = training_set_split(
        cfg.start_date_for_split,
        cfg.num_intervals,
        cfg.interval_magnitude,
        &dues,
        DUE_DATE_COLUMN,
    )?;
    let disposition_windows = training_set_split(
        cfg.start_date_for_split,
        cfg.num_intervals,
        cfg.interval_magnitude,
        &dispositions,
        CREATED_AT_COLUMN,
    )?;

    let due_window_summaries = due_windows.clone().try_map(|t| aggregate_dues(&t))?;
    let disposition_window_summaries = disposition_windows
        .clone()
        .try_map(|t| aggregate_dispositions(&t, &disposition_opts))?;

    let due_schema = due_summary.schema();
    let disposition_schema = disposition_summary.schema();
    for window in &due_window_summaries {
        assert_schema_compatible(&due_schema, &window.table.schema())?;
    }
    for window in &disposition_window_summaries {
        assert_schema_compatible(&disposition_schema, &window.table.schema())?;
    }

    info!(
        component = "pipeline",
        event = "pipeline.finish",
        due_customers = due_summary.num_rows(),
        disposition_customers = disposition_summary.num_rows(),
        windows = due_windows.len(),
        due_schema_fingerprint = %due_schema.fingerprint,
        disposition_schema_fingerprint = %disposition_schema.fingerprint
    );

    Ok(PipelineOutput {
        dues,
        dispositions,
        due_summary,
        disposition_summary,
        due_windows,
        disposition_windows,
        due_window_summaries,
        disposition_window_summaries,
    })
}
