//! Bounce-prediction feature engineering core crate.
//!
//! Current implemented scope:
//! - columnar table model with missing values and schema fingerprints
//! - per-customer gap features and PL-only streak tagging
//! - as-of joins between dispositions and dues
//! - rolling calendar-month training windows
//! - per-customer due and disposition aggregation
//! - CSV/zip loading, synthetic inputs and the end-to-end pipeline

mod aggregate;
mod asof;
mod deltas;
mod intervals;
mod loader;
mod observability;
mod pipeline;
mod streaks;
mod synthetic;
mod table;

pub use aggregate::{
    aggregate_by_customer, aggregate_dispositions, aggregate_dues, disposition_aggregate_fields,
    due_aggregate_fields, with_all_zero_flag, AggregateExpr, AggregateField,
    DispositionAggregateOptions, CUSTOMER_COLUMN,
};
pub use asof::{
    asof_join, impute_due_dates, merge_dispositions_to_dues, AsofDirection, AsofJoinSpec,
    DUE_OUTCOME_COLUMNS,
};
pub use deltas::{
    add_disposition_deltas, add_due_deltas, add_time_since_last, add_time_since_last_by_type,
    days_between, CONTACT_TYPE_DELTAS, TIME_SINCE_LAST_CALL, TIME_SINCE_LAST_CONTACT,
    TIME_SINCE_LAST_DUE, TIME_SINCE_LAST_FIELD, TIME_SINCE_LAST_SMS,
};
pub use intervals::{
    training_set_split, window_bounds, window_label, IntervalError, IntervalSplit,
    IntervalWindow, WindowBounds, MAX_INTERVALS,
};
pub use loader::{
    load_table, parse_timestamp, read_table_csv, write_table, write_table_csv, LoadError,
    LoadOptions, LoadReport, LoadedTable, TimestampParseConfig,
};
pub use observability::{
    init_logging, log_app_start, log_input_selected, log_outputs_written,
    logging_config_from_env, logging_config_from_lookup, LogFormat, LoggingConfig,
    LoggingInitError, LOG_FORMAT_VAR, LOG_LEVEL_VAR, LOG_TARGET_VAR,
};
pub use pipeline::{
    enrich_dispositions, enrich_dues, run_pipeline, PipelineConfig, PipelineError,
    PipelineManifest, PipelineOutput, WindowManifest, CREATED_AT_COLUMN, DUE_DATE_COLUMN,
};
pub use streaks::{
    add_streak_features, add_streak_features_with, StreakColumns, CURRENT_STREAK_COLUMN,
    PL_ONLY_TENOR, PREVIOUS_STREAK_COLUMN, STREAK_END_COLUMN,
};
pub use synthetic::{generate_synthetic, SyntheticConfig, SyntheticData};
pub use table::{
    assert_schema_compatible, Column, ColumnDType, ColumnData, ColumnSpec, CustomerRows, Table,
    TableError, TableSchema,
};
