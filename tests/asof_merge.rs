use bounce_features::{
    asof_join, impute_due_dates, merge_dispositions_to_dues, AsofDirection, AsofJoinSpec, Column,
    Table, TableError,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};

fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid timestamp")
}

fn lans(values: &[&str]) -> Column {
    Column::text("lan", values.iter().map(|v| Some(v.to_string())).collect())
}

fn dues() -> Table {
    Table::from_columns(vec![
        lans(&["A", "A", "B"]),
        Column::timestamp(
            "due_date",
            vec![Some(day(2023, 1, 10)), Some(day(2023, 2, 10)), Some(day(2023, 1, 20))],
        ),
        Column::int("fl_bounce", vec![Some(1), Some(0), Some(1)]),
        Column::int("fl_unresolved", vec![Some(1), Some(0), Some(0)]),
        Column::int("fl_bounce_tp3", vec![Some(0), Some(0), Some(0)]),
        Column::int("fl_bounce_tp5", vec![Some(0), Some(0), Some(0)]),
    ])
    .expect("due table should build")
}

fn dispositions(rows: &[(&str, NaiveDateTime)]) -> Table {
    let ids: Vec<&str> = rows.iter().map(|(lan, _)| *lan).collect();
    Table::from_columns(vec![
        lans(&ids),
        Column::timestamp("created_at", rows.iter().map(|(_, ts)| Some(*ts)).collect()),
    ])
    .expect("disposition table should build")
}

#[test]
fn forward_merge_picks_first_due_at_or_after_contact() {
    let contacts = dispositions(&[
        ("A", day(2023, 1, 9)),
        ("A", day(2023, 1, 10)),
        ("A", day(2023, 1, 11)),
        ("B", day(2023, 1, 1)),
    ]);

    let out = merge_dispositions_to_dues(&dues(), &contacts).expect("merge should succeed");

    assert_eq!(out.num_rows(), 4);
    assert_eq!(
        out.timestamps("next_due_date").unwrap(),
        &[
            Some(day(2023, 1, 10)),
            Some(day(2023, 1, 10)),
            Some(day(2023, 2, 10)),
            Some(day(2023, 1, 20))
        ]
    );
    assert_eq!(
        out.ints("next_fl_bounce").unwrap(),
        &[Some(1), Some(1), Some(0), Some(1)]
    );
}

#[test]
fn contact_after_last_due_gets_missing_outcome() {
    let contacts = dispositions(&[("A", day(2023, 3, 1)), ("C", day(2023, 1, 1))]);

    let out = merge_dispositions_to_dues(&dues(), &contacts).expect("merge should succeed");

    assert_eq!(out.timestamps("next_due_date").unwrap(), &[None, None]);
    assert_eq!(out.ints("next_fl_unresolved").unwrap(), &[None, None]);
}

#[test]
fn nearest_imputation_uses_closest_due_either_side() {
    let contacts = dispositions(&[
        ("A", day(2023, 1, 9)),
        ("A", day(2023, 2, 1)),
        ("A", day(2023, 3, 30)),
    ]);

    let out = impute_due_dates(&contacts, &dues()).expect("imputation should succeed");

    assert_eq!(
        out.timestamps("due_date").unwrap(),
        &[
            Some(day(2023, 1, 10)),
            Some(day(2023, 2, 10)),
            Some(day(2023, 2, 10))
        ]
    );
}

#[test]
fn tolerance_drops_distant_matches() {
    let contacts = dispositions(&[("A", day(2023, 1, 9)), ("A", day(2023, 1, 20))]);
    let spec = AsofJoinSpec {
        left_customer: "lan".to_string(),
        left_timestamp: "created_at".to_string(),
        right_customer: "lan".to_string(),
        right_timestamp: "due_date".to_string(),
        direction: AsofDirection::Backward,
        tolerance: Some(Duration::days(15)),
        columns: vec![("fl_bounce".to_string(), "last_fl_bounce".to_string())],
    };

    let out = asof_join(&contacts, &dues(), &spec).expect("join should succeed");

    // First contact precedes every due; second is 10 days after the jan due.
    assert_eq!(out.ints("last_fl_bounce").unwrap(), &[None, Some(1)]);
}

#[test]
fn alias_colliding_with_left_column_is_rejected() {
    let contacts = dispositions(&[("A", day(2023, 1, 9))]);
    let spec = AsofJoinSpec {
        left_customer: "lan".to_string(),
        left_timestamp: "created_at".to_string(),
        right_customer: "lan".to_string(),
        right_timestamp: "due_date".to_string(),
        direction: AsofDirection::Forward,
        tolerance: None,
        columns: vec![("due_date".to_string(), "created_at".to_string())],
    };

    let err = asof_join(&contacts, &dues(), &spec).expect_err("duplicate alias must fail");
    assert_eq!(err, TableError::DuplicateColumn("created_at".to_string()));
}

#[test]
fn repeated_alias_is_rejected() {
    let contacts = dispositions(&[("A", day(2023, 1, 9))]);
    let spec = AsofJoinSpec {
        left_customer: "lan".to_string(),
        left_timestamp: "created_at".to_string(),
        right_customer: "lan".to_string(),
        right_timestamp: "due_date".to_string(),
        direction: AsofDirection::Forward,
        tolerance: None,
        columns: vec![
            ("fl_bounce".to_string(), "o".to_string()),
            ("fl_unresolved".to_string(), "o".to_string()),
        ],
    };

    let err = asof_join(&contacts, &dues(), &spec).expect_err("repeated alias must fail");
    assert_eq!(err, TableError::DuplicateColumn("o".to_string()));
}
