//! Rolling calendar-month training windows.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::table::{Table, TableError};

/// Labels carry a two-digit year, so more windows than this would repeat one.
pub const MAX_INTERVALS: u32 = 1200;

#[derive(Debug, Error)]
pub enum IntervalError {
    #[error("invalid interval config: {0}")]
    InvalidConfig(String),
    #[error("window {index} starting from {start} leaves the supported date range")]
    DateOutOfRange { start: NaiveDate, index: u32 },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Inclusive calendar bounds of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WindowBounds {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalWindow {
    pub label: String,
    pub bounds: WindowBounds,
    pub table: Table,
}

/// Windows keyed by label, kept in start-date order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalSplit {
    windows: Vec<IntervalWindow>,
}

impl IntervalSplit {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.windows.iter().map(|w| w.label.as_str()).collect()
    }

    pub fn get(&self, label: &str) -> Option<&Table> {
        self.window(label).map(|w| &w.table)
    }

    pub fn window(&self, label: &str) -> Option<&IntervalWindow> {
        self.windows.iter().find(|w| w.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntervalWindow> {
        self.windows.iter()
    }

    /// New split with every table replaced by `transform(table)`.
    pub fn map<F>(&self, mut transform: F) -> IntervalSplit
    where
        F: FnMut(&Table) -> Table,
    {
        IntervalSplit {
            windows: self
                .windows
                .iter()
                .map(|w| IntervalWindow {
                    label: w.label.clone(),
                    bounds: w.bounds,
                    table: transform(&w.table),
                })
                .collect(),
        }
    }

    /// Consumes the split and rewrites each table in place, stopping at the
    /// first failing window.
    pub fn try_map<F, E>(mut self, mut transform: F) -> Result<IntervalSplit, E>
    where
        F: FnMut(Table) -> Result<Table, E>,
    {
        for window in &mut self.windows {
            let table = std::mem::take(&mut window.table);
            window.table = transform(table)?;
            debug!(
                component = "intervals",
                event = "intervals.window.mapped",
                label = %window.label,
                rows = window.table.num_rows()
            );
        }
        Ok(self)
    }
}

impl<'a> IntoIterator for &'a IntervalSplit {
    type Item = &'a IntervalWindow;
    type IntoIter = std::slice::Iter<'a, IntervalWindow>;

    fn into_iter(self) -> Self::IntoIter {
        self.windows.iter()
    }
}

/// Lower-cased abbreviated month and two-digit year, e.g. `sep_23`.
pub fn window_label(start: NaiveDate) -> String {
    start.format("%b_%y").to_string().to_lowercase()
}

/// Bounds of window `index`: starts `index` months after `start` and ends
/// one day before `interval_magnitude` further months. Month arithmetic
/// clamps to the end of shorter months.
pub fn window_bounds(
    start: NaiveDate,
    index: u32,
    interval_magnitude: u32,
) -> Result<WindowBounds, IntervalError> {
    let out_of_range = || IntervalError::DateOutOfRange { start, index };
    let window_start = start
        .checked_add_months(Months::new(index))
        .ok_or_else(out_of_range)?;
    let window_end = window_start
        .checked_add_months(Months::new(interval_magnitude))
        .and_then(|d| d.pred_opt())
        .ok_or_else(out_of_range)?;
    Ok(WindowBounds {
        start: window_start,
        end: window_end,
    })
}

/// Splits `table` into `num_intervals` overlapping windows of
/// `interval_magnitude` months, sliding the start one month at a time. A row
/// lands in every window whose inclusive bounds contain the calendar date of
/// its `date_column`; rows with a missing date land in none.
pub fn training_set_split(
    start: NaiveDate,
    num_intervals: u32,
    interval_magnitude: u32,
    table: &Table,
    date_column: &str,
) -> Result<IntervalSplit, IntervalError> {
    if interval_magnitude == 0 {
        return Err(IntervalError::InvalidConfig(
            "interval_magnitude must be >= 1".to_string(),
        ));
    }
    if num_intervals > MAX_INTERVALS {
        return Err(IntervalError::InvalidConfig(format!(
            "num_intervals {num_intervals} exceeds {MAX_INTERVALS}; window labels would repeat"
        )));
    }

    let dates: Vec<Option<NaiveDate>> = table
        .timestamps(date_column)?
        .iter()
        .map(|ts| ts.map(|t| t.date()))
        .collect();

    let mut windows = Vec::with_capacity(num_intervals as usize);
    for index in 0..num_intervals {
        let bounds = window_bounds(start, index, interval_magnitude)?;
        let label = window_label(bounds.start);

        let mask: Vec<bool> = dates
            .iter()
            .map(|d| d.map_or(false, |d| bounds.contains(d)))
            .collect();
        let window_table = table.filter(&mask);
        debug!(
            component = "intervals",
            event = "intervals.window.built",
            label = %label,
            start = %bounds.start,
            end = %bounds.end,
            rows = window_table.num_rows()
        );
        windows.push(IntervalWindow {
            label,
            bounds,
            table: window_table,
        });
    }

    info!(
        component = "intervals",
        event = "intervals.split.finish",
        date_column,
        num_intervals,
        interval_magnitude,
        input_rows = table.num_rows(),
        undated_rows = dates.iter().filter(|d| d.is_none()).count()
    );

    Ok(IntervalSplit { windows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bounds_span_magnitude_months_minus_one_day() {
        let bounds = window_bounds(date(2023, 9, 5), 0, 12).unwrap();
        assert_eq!(bounds.start, date(2023, 9, 5));
        assert_eq!(bounds.end, date(2024, 9, 4));

        let shifted = window_bounds(date(2023, 9, 5), 5, 12).unwrap();
        assert_eq!(shifted.start, date(2024, 2, 5));
        assert_eq!(shifted.end, date(2025, 2, 4));
    }

    #[test]
    fn month_end_starts_clamp() {
        let bounds = window_bounds(date(2024, 1, 31), 1, 1).unwrap();
        assert_eq!(bounds.start, date(2024, 2, 29));
        assert_eq!(bounds.end, date(2024, 3, 28));
    }

    #[test]
    fn labels_are_lowercase_month_and_year() {
        assert_eq!(window_label(date(2023, 9, 5)), "sep_23");
        assert_eq!(window_label(date(2024, 2, 1)), "feb_24");
    }

    #[test]
    fn too_many_intervals_is_rejected_before_allocating() {
        let err = training_set_split(date(2023, 9, 5), u32::MAX, 12, &Table::default(), "due_date")
            .unwrap_err();
        assert!(matches!(err, IntervalError::InvalidConfig(_)));
    }

    #[test]
    fn max_intervals_yields_distinct_labels() {
        let table = Table::from_columns(vec![crate::table::Column::timestamp(
            "due_date",
            Vec::new(),
        )])
        .unwrap();
        let split = training_set_split(date(2023, 9, 5), MAX_INTERVALS, 1, &table, "due_date")
            .unwrap();
        let mut labels = split.labels();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), MAX_INTERVALS as usize);
    }
}
