//! Delimited-text loading and writing of tables.

use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use zip::ZipArchive;

use crate::table::{Column, ColumnData, Table, TableError};

const MISSING_TOKENS: [&str; 7] = ["", "na", "n/a", "nan", "nat", "null", "none"];

const OFFSET_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

// Month-first before day-first for ambiguous slash dates.
const DATETIME_FORMATS: [&str; 9] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%Y%m%d",
];

const WRITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampParseConfig {
    /// Zone that offset-carrying timestamps are converted into before the
    /// offset is dropped.
    pub timezone: Tz,
}

impl Default for TimestampParseConfig {
    fn default() -> Self {
        Self { timezone: Tz::UTC }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub timestamp_columns: Vec<String>,
    /// Columns kept as text even when every value looks numeric.
    pub text_columns: Vec<String>,
    pub timestamps: TimestampParseConfig,
}

impl LoadOptions {
    pub fn dues() -> Self {
        Self {
            timestamp_columns: vec!["due_date".to_string()],
            text_columns: vec!["lan".to_string(), "tenor_type".to_string()],
            timestamps: TimestampParseConfig::default(),
        }
    }

    pub fn dispositions() -> Self {
        Self {
            timestamp_columns: vec!["created_at".to_string()],
            text_columns: [
                "lan",
                "type",
                "contact_category",
                "response_sentiment",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            timestamps: TimestampParseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub rows: u64,
    pub columns: u64,
    /// `(column, count)` of non-empty cells that could not be parsed.
    pub unparseable_timestamps: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    pub table: Table,
    pub report: LoadReport,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive at {path} has no entries")]
    EmptyZipArchive { path: PathBuf },
    #[error("archive at {path} has no CSV entry")]
    MissingCsvEntry { path: PathBuf },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Loads a `.csv` file, or the first CSV entry of a `.zip` archive.
pub fn load_table(path: &Path, opts: &LoadOptions) -> Result<LoadedTable, LoadError> {
    let is_zip = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("zip"));
    let loaded = if is_zip {
        read_table_csv(Cursor::new(read_zip_csv(path)?), opts)?
    } else {
        read_table_csv(fs::File::open(path)?, opts)?
    };

    info!(
        component = "loader",
        event = "loader.table.loaded",
        path = %path.display(),
        rows = loaded.report.rows,
        columns = loaded.report.columns
    );
    Ok(loaded)
}

/// Parses headed CSV. Listed timestamp columns are parsed leniently and
/// unparseable cells become missing; other columns are inferred as int,
/// then float, then bool, then text.
pub fn read_table_csv<R: Read>(reader: R, opts: &LoadOptions) -> Result<LoadedTable, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (idx, cells) in raw.iter_mut().enumerate() {
            cells.push(record.get(idx).unwrap_or_default().to_string());
        }
    }

    let header_set: HashSet<&str> = headers.iter().map(String::as_str).collect();
    for column in &opts.timestamp_columns {
        if !header_set.contains(column.as_str()) {
            return Err(TableError::MissingColumn(column.clone()).into());
        }
    }

    let mut columns = Vec::with_capacity(headers.len());
    let mut unparseable_timestamps = Vec::new();
    for (name, cells) in headers.iter().zip(raw) {
        let data = if opts.timestamp_columns.contains(name) {
            let (values, failed) = parse_timestamp_cells(&cells, &opts.timestamps);
            if failed > 0 {
                warn!(
                    component = "loader",
                    event = "loader.timestamps.unparseable",
                    column = %name,
                    count = failed
                );
                unparseable_timestamps.push((name.clone(), failed));
            }
            ColumnData::Timestamp(values)
        } else if opts.text_columns.contains(name) {
            ColumnData::Text(cells.iter().map(|c| text_cell(c)).collect())
        } else {
            infer_column(&cells)
        };
        columns.push(Column::new(name.clone(), data));
    }

    let table = Table::from_columns(columns)?;
    let report = LoadReport {
        rows: table.num_rows() as u64,
        columns: table.num_columns() as u64,
        unparseable_timestamps,
    };
    Ok(LoadedTable { table, report })
}

/// Tries offset-aware forms first, then naive date-times, then bare dates
/// (at midnight). Returns `None` for anything else.
pub fn parse_timestamp(raw: &str, cfg: &TimestampParseConfig) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if is_missing_token(raw) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&cfg.timezone).naive_local());
    }
    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&cfg.timezone).naive_local());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn write_table_csv(table: &Table, path: &Path) -> Result<(), LoadError> {
    let mut buf = Vec::new();
    write_table(table, &mut buf)?;
    write_atomic(path, &buf)?;
    info!(
        component = "loader",
        event = "loader.table.written",
        path = %path.display(),
        rows = table.num_rows()
    );
    Ok(())
}

pub fn write_table<W: Write>(table: &Table, writer: W) -> Result<(), LoadError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(table.column_names())?;
    for row in 0..table.num_rows() {
        let record: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format_cell(&c.data, row))
            .collect();
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

fn read_zip_csv(path: &Path) -> Result<Vec<u8>, LoadError> {
    let file = fs::File::open(path)?;
    let mut zip = ZipArchive::new(file)?;
    if zip.is_empty() {
        return Err(LoadError::EmptyZipArchive {
            path: path.to_path_buf(),
        });
    }

    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(".csv") {
            continue;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        return Ok(buf);
    }

    Err(LoadError::MissingCsvEntry {
        path: path.to_path_buf(),
    })
}

fn parse_timestamp_cells(
    cells: &[String],
    cfg: &TimestampParseConfig,
) -> (Vec<Option<NaiveDateTime>>, u64) {
    let mut failed = 0u64;
    let values = cells
        .iter()
        .map(|cell| {
            let parsed = parse_timestamp(cell, cfg);
            if parsed.is_none() && !is_missing_token(cell) {
                failed += 1;
            }
            parsed
        })
        .collect();
    (values, failed)
}

fn infer_column(cells: &[String]) -> ColumnData {
    let present = || cells.iter().filter(|c| !is_missing_token(c));

    if present().all(|c| c.parse::<i64>().is_ok()) {
        return ColumnData::Int(cells.iter().map(|c| typed_cell(c)).collect());
    }
    if present().all(|c| c.parse::<f64>().is_ok()) {
        return ColumnData::Float(cells.iter().map(|c| typed_cell(c)).collect());
    }
    if present().all(|c| parse_bool(c).is_some()) {
        return ColumnData::Bool(cells.iter().map(|c| parse_bool(c)).collect());
    }
    ColumnData::Text(cells.iter().map(|c| text_cell(c)).collect())
}

fn typed_cell<T: std::str::FromStr>(cell: &str) -> Option<T> {
    if is_missing_token(cell) {
        None
    } else {
        cell.parse().ok()
    }
}

fn text_cell(cell: &str) -> Option<String> {
    (!is_missing_token(cell)).then(|| cell.to_string())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn is_missing_token(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    MISSING_TOKENS.contains(&lowered.as_str())
}

fn format_cell(data: &ColumnData, row: usize) -> String {
    match data {
        ColumnData::Int(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
        // Debug keeps the decimal point so whole floats reload as floats.
        ColumnData::Float(v) => v[row].map(|x| format!("{x:?}")).unwrap_or_default(),
        ColumnData::Bool(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
        ColumnData::Text(v) => v[row].clone().unwrap_or_default(),
        ColumnData::Timestamp(v) => v[row]
            .map(|x| x.format(WRITE_TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default(),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LoadError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}
