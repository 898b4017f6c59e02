//! In-memory columnar tables shared by every enrichment and aggregation step.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnDType {
    Int,
    Float,
    Bool,
    Text,
    Timestamp,
}

impl ColumnDType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ColumnDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cell storage for one column. `None` marks a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> ColumnDType {
        match self {
            Self::Int(_) => ColumnDType::Int,
            Self::Float(_) => ColumnDType::Float,
            Self::Bool(_) => ColumnDType::Bool,
            Self::Text(_) => ColumnDType::Text,
            Self::Timestamp(_) => ColumnDType::Timestamp,
        }
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::Int(v) => v.get(row).map_or(true, Option::is_none),
            Self::Float(v) => v.get(row).map_or(true, Option::is_none),
            Self::Bool(v) => v.get(row).map_or(true, Option::is_none),
            Self::Text(v) => v.get(row).map_or(true, Option::is_none),
            Self::Timestamp(v) => v.get(row).map_or(true, Option::is_none),
        }
    }

    pub(crate) fn take(&self, indices: &[usize]) -> Self {
        match self {
            Self::Int(v) => Self::Int(gather(v, indices)),
            Self::Float(v) => Self::Float(gather(v, indices)),
            Self::Bool(v) => Self::Bool(gather(v, indices)),
            Self::Text(v) => Self::Text(gather(v, indices)),
            Self::Timestamp(v) => Self::Timestamp(gather(v, indices)),
        }
    }

    pub(crate) fn take_optional(&self, indices: &[Option<usize>]) -> Self {
        match self {
            Self::Int(v) => Self::Int(gather_optional(v, indices)),
            Self::Float(v) => Self::Float(gather_optional(v, indices)),
            Self::Bool(v) => Self::Bool(gather_optional(v, indices)),
            Self::Text(v) => Self::Text(gather_optional(v, indices)),
            Self::Timestamp(v) => Self::Timestamp(gather_optional(v, indices)),
        }
    }
}

fn gather<T: Clone>(values: &[Option<T>], indices: &[usize]) -> Vec<Option<T>> {
    indices
        .iter()
        .map(|&idx| values.get(idx).cloned().flatten())
        .collect()
}

fn gather_optional<T: Clone>(values: &[Option<T>], indices: &[Option<usize>]) -> Vec<Option<T>> {
    indices
        .iter()
        .map(|idx| idx.and_then(|idx| values.get(idx).cloned().flatten()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn int(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        Self::new(name, ColumnData::Int(values))
    }

    pub fn float(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Float(values))
    }

    pub fn bool(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        Self::new(name, ColumnData::Bool(values))
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self::new(name, ColumnData::Text(values))
    }

    pub fn timestamp(name: impl Into<String>, values: Vec<Option<NaiveDateTime>>) -> Self {
        Self::new(name, ColumnData::Timestamp(values))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("required column '{0}' is missing")]
    MissingColumn(String),
    #[error("column '{column}' has type {actual}, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        actual: ColumnDType,
    },
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
    pub fingerprint: String,
}

/// Row indices belonging to one customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRows {
    pub customer: String,
    pub rows: Vec<usize>,
}

/// Ordered set of equal-length named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let expected = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if column.len() != expected {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected,
                    actual: column.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// Fails on the first absent column.
    pub fn require(&self, names: &[&str]) -> Result<(), TableError> {
        for name in names {
            self.column(name)?;
        }
        Ok(())
    }

    pub fn ints(&self, name: &str) -> Result<&[Option<i64>], TableError> {
        match &self.column(name)?.data {
            ColumnData::Int(v) => Ok(v),
            other => Err(type_error(name, "int", other)),
        }
    }

    pub fn floats(&self, name: &str) -> Result<&[Option<f64>], TableError> {
        match &self.column(name)?.data {
            ColumnData::Float(v) => Ok(v),
            other => Err(type_error(name, "float", other)),
        }
    }

    pub fn bools(&self, name: &str) -> Result<&[Option<bool>], TableError> {
        match &self.column(name)?.data {
            ColumnData::Bool(v) => Ok(v),
            other => Err(type_error(name, "bool", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&[Option<String>], TableError> {
        match &self.column(name)?.data {
            ColumnData::Text(v) => Ok(v),
            other => Err(type_error(name, "text", other)),
        }
    }

    pub fn timestamps(&self, name: &str) -> Result<&[Option<NaiveDateTime>], TableError> {
        match &self.column(name)?.data {
            ColumnData::Timestamp(v) => Ok(v),
            other => Err(type_error(name, "timestamp", other)),
        }
    }

    /// Int, float and bool columns widened to `f64` (`true` is 1.0).
    pub fn numeric(&self, name: &str) -> Result<Vec<Option<f64>>, TableError> {
        match &self.column(name)?.data {
            ColumnData::Int(v) => Ok(v.iter().map(|x| x.map(|x| x as f64)).collect()),
            ColumnData::Float(v) => Ok(v.clone()),
            ColumnData::Bool(v) => Ok(v
                .iter()
                .map(|x| x.map(|x| if x { 1.0 } else { 0.0 }))
                .collect()),
            other => Err(type_error(name, "numeric", other)),
        }
    }

    /// Customer identifiers as strings. Integer ids are accepted so that
    /// numerically-typed account numbers group the same way text ids do.
    pub fn keys(&self, name: &str) -> Result<Vec<Option<String>>, TableError> {
        match &self.column(name)?.data {
            ColumnData::Text(v) => Ok(v.clone()),
            ColumnData::Int(v) => Ok(v.iter().map(|x| x.map(|x| x.to_string())).collect()),
            other => Err(type_error(name, "text or int", other)),
        }
    }

    /// Adds `column`, replacing any existing column of the same name in place.
    pub fn with_column(mut self, column: Column) -> Result<Self, TableError> {
        let actual = column.len();
        if !self.columns.is_empty() && actual != self.num_rows() {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.num_rows(),
                actual,
            });
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(indices)))
                .collect(),
        }
    }

    /// Gathers rows; a `None` index yields a missing cell in every column.
    pub fn take_optional(&self, indices: &[Option<usize>]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take_optional(indices)))
                .collect(),
        }
    }

    pub fn filter(&self, mask: &[bool]) -> Self {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, &keep)| keep.then_some(idx))
            .collect();
        self.take(&indices)
    }

    /// Customers in ascending id order, each with its rows in table order.
    /// Integer ids order numerically, text ids lexically. Rows with a missing
    /// id belong to no customer.
    pub fn group_by_customer(&self, customer: &str) -> Result<Vec<CustomerRows>, TableError> {
        match &self.column(customer)?.data {
            ColumnData::Int(ids) => Ok(group_rows(ids)
                .into_iter()
                .map(|(id, rows)| CustomerRows {
                    customer: id.to_string(),
                    rows,
                })
                .collect()),
            ColumnData::Text(ids) => Ok(group_rows(ids)
                .into_iter()
                .map(|(customer, rows)| CustomerRows {
                    customer: customer.clone(),
                    rows,
                })
                .collect()),
            other => Err(type_error(customer, "text or int", other)),
        }
    }

    /// Customers in ascending id order, each with its rows stably sorted by
    /// `timestamp`. Rows with a missing timestamp trail their customer's run.
    pub fn group_runs(
        &self,
        customer: &str,
        timestamp: &str,
    ) -> Result<Vec<CustomerRows>, TableError> {
        let ts = self.timestamps(timestamp)?;
        let mut groups = self.group_by_customer(customer)?;
        for group in &mut groups {
            group
                .rows
                .sort_by(|&a, &b| cmp_missing_last(ts[a].as_ref(), ts[b].as_ref()));
        }
        Ok(groups)
    }

    pub fn schema(&self) -> TableSchema {
        let columns: Vec<ColumnSpec> = self
            .columns
            .iter()
            .map(|c| ColumnSpec {
                name: c.name.clone(),
                dtype: c.data.dtype(),
            })
            .collect();
        let fingerprint = schema_fingerprint(&columns);
        TableSchema {
            columns,
            fingerprint,
        }
    }
}

pub fn assert_schema_compatible(
    expected: &TableSchema,
    actual: &TableSchema,
) -> Result<(), TableError> {
    if expected.fingerprint != actual.fingerprint {
        return Err(TableError::SchemaMismatch {
            expected: expected.fingerprint.clone(),
            actual: actual.fingerprint.clone(),
        });
    }
    Ok(())
}

fn group_rows<T: Ord>(ids: &[Option<T>]) -> BTreeMap<&T, Vec<usize>> {
    let mut groups: BTreeMap<&T, Vec<usize>> = BTreeMap::new();
    for (row, id) in ids.iter().enumerate() {
        if let Some(id) = id {
            groups.entry(id).or_default().push(row);
        }
    }
    groups
}

fn cmp_missing_last<T: Ord>(a: Option<&T>, b: Option<&T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn type_error(name: &str, expected: &'static str, data: &ColumnData) -> TableError {
    TableError::ColumnType {
        column: name.to_string(),
        expected,
        actual: data.dtype(),
    }
}

fn schema_fingerprint(columns: &[ColumnSpec]) -> String {
    let mut hasher = Sha256::new();
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(format!(":{};", column.dtype));
    }
    hex::encode(hasher.finalize())
}
