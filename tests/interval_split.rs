use bounce_features::{training_set_split, Column, IntervalError, Table};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(12, 30, 0).expect("valid timestamp")
}

fn dated_table(dates: Vec<Option<NaiveDateTime>>) -> Table {
    let ids = (0..dates.len()).map(|i| Some(format!("L{i}"))).collect();
    Table::from_columns(vec![
        Column::text("lan", ids),
        Column::timestamp("due_date", dates),
    ])
    .expect("table should build")
}

#[test]
fn six_yearly_windows_slide_monthly_from_september() {
    let table = dated_table(vec![Some(at(2023, 9, 5))]);
    let split =
        training_set_split(date(2023, 9, 5), 6, 12, &table, "due_date").expect("split succeeds");

    assert_eq!(
        split.labels(),
        vec!["sep_23", "oct_23", "nov_23", "dec_23", "jan_24", "feb_24"]
    );
    let label_shape = Regex::new(r"^[a-z]{3}_\d{2}$").expect("valid regex");
    assert!(split.labels().iter().all(|l| label_shape.is_match(l)));

    let windows: Vec<_> = split.iter().collect();
    assert_eq!(windows[0].bounds.start, date(2023, 9, 5));
    assert_eq!(windows[0].bounds.end, date(2024, 9, 4));
    assert_eq!(windows[5].bounds.start, date(2024, 2, 5));
    assert_eq!(windows[5].bounds.end, date(2025, 2, 4));
    for pair in windows.windows(2) {
        // Consecutive windows share eleven months.
        assert_eq!(
            pair[1].bounds.start,
            pair[0].bounds.start.checked_add_months(chrono::Months::new(1)).unwrap()
        );
        assert!(pair[1].bounds.start < pair[0].bounds.end);
    }
}

#[test]
fn bounds_are_inclusive_on_both_ends() {
    let table = dated_table(vec![
        Some(at(2023, 9, 4)),
        Some(at(2023, 9, 5)),
        Some(at(2023, 12, 4)),
        Some(at(2023, 12, 5)),
    ]);

    let split =
        training_set_split(date(2023, 9, 5), 1, 3, &table, "due_date").expect("split succeeds");
    let window = split.get("sep_23").expect("window exists");

    assert_eq!(window.num_rows(), 2);
    assert_eq!(
        window.text("lan").unwrap(),
        &[Some("L1".to_string()), Some("L2".to_string())]
    );
}

#[test]
fn zero_intervals_yield_empty_split() {
    let table = dated_table(vec![Some(at(2023, 9, 5))]);
    let split =
        training_set_split(date(2023, 9, 5), 0, 12, &table, "due_date").expect("split succeeds");
    assert!(split.is_empty());
}

#[test]
fn zero_magnitude_is_rejected() {
    let table = dated_table(vec![Some(at(2023, 9, 5))]);
    let err = training_set_split(date(2023, 9, 5), 3, 0, &table, "due_date")
        .expect_err("zero-month windows must fail");
    assert!(matches!(err, IntervalError::InvalidConfig(_)));
}

#[test]
fn rows_without_dates_land_in_no_window() {
    let table = dated_table(vec![Some(at(2024, 1, 1)), None, Some(at(2024, 1, 2))]);
    let split =
        training_set_split(date(2023, 9, 5), 2, 12, &table, "due_date").expect("split succeeds");

    for window in &split {
        assert_eq!(window.table.num_rows(), 2);
    }
}

#[test]
fn identity_map_preserves_every_window() {
    let table = dated_table(vec![
        Some(at(2023, 9, 10)),
        Some(at(2024, 3, 1)),
        Some(at(2025, 1, 1)),
    ]);
    let split =
        training_set_split(date(2023, 9, 5), 4, 12, &table, "due_date").expect("split succeeds");

    assert_eq!(split.map(Table::clone), split);
    let consumed = split
        .clone()
        .try_map(Ok::<_, IntervalError>)
        .expect("identity map succeeds");
    assert_eq!(consumed, split);
}

#[test]
fn missing_date_column_fails_fast() {
    let table = dated_table(vec![Some(at(2023, 9, 5))]);
    let err = training_set_split(date(2023, 9, 5), 1, 12, &table, "created_at")
        .expect_err("unknown column must fail");
    assert!(matches!(err, IntervalError::Table(_)));
}
