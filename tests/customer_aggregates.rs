use std::collections::BTreeSet;

use bounce_features::{
    add_disposition_deltas, add_due_deltas, add_streak_features, aggregate_by_customer,
    aggregate_dispositions, aggregate_dues, AggregateField, Column, DispositionAggregateOptions,
    Table, TableError,
};
use chrono::{NaiveDate, NaiveDateTime};

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid timestamp")
}

fn text(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some(v.to_string())).collect()
}

fn ints(values: &[i64]) -> Vec<Option<i64>> {
    values.iter().copied().map(Some).collect()
}

fn floats(n: usize, value: f64) -> Vec<Option<f64>> {
    vec![Some(value); n]
}

fn enriched_dues() -> Table {
    let lans = ["B", "A", "A", "B", "A"];
    let n = lans.len();
    let mut columns = vec![
        Column::text("lan", text(&lans)),
        Column::timestamp(
            "due_date",
            vec![
                Some(at(2023, 1, 5)),
                Some(at(2023, 1, 5)),
                Some(at(2023, 2, 5)),
                Some(at(2023, 2, 5)),
                Some(at(2023, 3, 5)),
            ],
        ),
        Column::text(
            "tenor_type",
            text(&["EMI only", "PL only", "PL only", "PL only", "mixed"]),
        ),
        Column::int("mob_due", ints(&[1, 1, 2, 2, 3])),
        Column::int("due_loan_count", ints(&[1, 2, 2, 1, 2])),
        Column::int("fl_bounce", ints(&[0, 1, 1, 0, 0])),
        Column::int("fl_unresolved", ints(&[0, 1, 0, 0, 0])),
        Column::int("fl_current_due", ints(&[0, 0, 0, 1, 1])),
        Column::int("fl_bounce_tp3", ints(&[0, 0, 0, 0, 0])),
        Column::int("fl_bounce_tp5", ints(&[0, 0, 0, 0, 0])),
    ];
    for name in [
        "pre_due_pos",
        "monthend_pos",
        "bounce_pos",
        "unresolved_pos",
        "current_bounce_pos",
        "current_unresolved_pos",
        "emi_amount_expected_retro",
        "bounce_tp3_pos",
        "bounce_tp5_pos",
        "current_monthend_pos",
        "proportion_of_payment",
        "credit_utilization",
    ] {
        columns.push(Column::float(name, floats(n, 100.0)));
    }
    let table = Table::from_columns(columns).expect("due table should build");
    add_streak_features(add_due_deltas(table).expect("deltas")).expect("streaks")
}

#[test]
fn due_summary_has_one_sorted_row_per_customer() {
    let summary = aggregate_dues(&enriched_dues()).expect("aggregation succeeds");

    assert_eq!(summary.num_rows(), 2);
    assert_eq!(
        summary.text("lan").unwrap(),
        &[Some("A".to_string()), Some("B".to_string())]
    );
    assert_eq!(summary.ints("total_num_dues").unwrap(), &[Some(3), Some(2)]);
    assert_eq!(summary.ints("num_pl_streaks").unwrap(), &[Some(1), Some(1)]);
    assert_eq!(
        summary.floats("avg_pl_streak_length").unwrap(),
        &[Some(2.0), Some(1.0)]
    );
    assert_eq!(
        summary.floats("avg_duration_between_dues").unwrap(),
        &[Some(29.5), Some(31.0)]
    );
    assert_eq!(
        summary.floats("prop_fl_bounce").unwrap(),
        &[Some(2.0 / 3.0), Some(0.0)]
    );
    assert_eq!(
        summary.floats("avg_previous_pl_only_streak").unwrap(),
        &[Some(2.0 / 3.0), Some(0.0)]
    );
}

#[test]
fn proportions_stay_within_unit_interval() {
    let summary = aggregate_dues(&enriched_dues()).expect("aggregation succeeds");

    for column in summary.columns() {
        if !column.name.starts_with("prop_") {
            continue;
        }
        for value in summary.floats(&column.name).unwrap().iter().flatten() {
            assert!((0.0..=1.0).contains(value), "{} = {value}", column.name);
        }
    }
}

#[test]
fn summary_rows_match_distinct_customer_ids() {
    let dues = enriched_dues();
    let distinct: BTreeSet<_> = dues.text("lan").unwrap().iter().flatten().collect();
    let summary = aggregate_dues(&dues).expect("aggregation succeeds");
    assert_eq!(summary.num_rows(), distinct.len());
}

#[test]
fn missing_source_column_fails_even_without_rows() {
    let table = Table::from_columns(vec![
        Column::text("lan", Vec::new()),
        Column::float("call_duration", Vec::new()),
    ])
    .expect("empty table should build");

    let err = aggregate_by_customer(
        &table,
        "lan",
        &[AggregateField::mean("avg_pre_due_pos", "pre_due_pos")],
    )
    .expect_err("missing column must fail");
    assert_eq!(err, TableError::MissingColumn("pre_due_pos".to_string()));
}

#[test]
fn disposition_summary_counts_contacts_and_flags_message_only() {
    let table = Table::from_columns(vec![
        Column::text("lan", text(&["A", "A", "A", "B", "B"])),
        Column::timestamp(
            "created_at",
            vec![
                Some(at(2023, 1, 1)),
                Some(at(2023, 1, 3)),
                Some(at(2023, 1, 7)),
                Some(at(2023, 1, 1)),
                Some(at(2023, 1, 2)),
            ],
        ),
        Column::text("type", text(&["CALL", "SMS", "CALL", "SMS", "SMS"])),
        Column::text(
            "contact_category",
            vec![
                Some("answered/contactable".to_string()),
                None,
                Some("not answered/uncontactable".to_string()),
                None,
                None,
            ],
        ),
        Column::text(
            "response_sentiment",
            vec![Some("positive response".to_string()), None, None, None, None],
        ),
        Column::float(
            "call_duration",
            vec![Some(120.0), None, Some(0.0), None, None],
        ),
    ])
    .expect("disposition table should build");
    let enriched = add_disposition_deltas(table).expect("deltas");

    let summary = aggregate_dispositions(&enriched, &DispositionAggregateOptions::default())
        .expect("aggregation succeeds");

    assert_eq!(summary.ints("call_count").unwrap(), &[Some(2), Some(0)]);
    assert_eq!(summary.ints("sms_count").unwrap(), &[Some(1), Some(2)]);
    assert_eq!(summary.ints("total_contacts").unwrap(), &[Some(3), Some(2)]);
    assert_eq!(summary.ints("answered").unwrap(), &[Some(1), Some(0)]);
    assert_eq!(summary.ints("pos_response").unwrap(), &[Some(1), Some(0)]);
    assert_eq!(
        summary.floats("avg_time_between_calls").unwrap(),
        &[Some(6.0), None]
    );
    assert_eq!(
        summary.floats("avg_call_duration").unwrap(),
        &[Some(60.0), None]
    );
    assert_eq!(
        summary.bools("is_message_only").unwrap(),
        &[Some(false), Some(true)]
    );
    assert!(!summary.has_column("prop_next_fl_bounce"));
}

#[test]
fn outcome_flags_require_merged_columns() {
    let table = Table::from_columns(vec![
        Column::text("lan", text(&["A"])),
        Column::timestamp("created_at", vec![Some(at(2023, 1, 1))]),
        Column::text("type", text(&["SMS"])),
        Column::text("contact_category", vec![None]),
        Column::text("response_sentiment", vec![None]),
        Column::float("call_duration", vec![None]),
    ])
    .expect("disposition table should build");
    let enriched = add_disposition_deltas(table).expect("deltas");

    let err = aggregate_dispositions(&enriched, &DispositionAggregateOptions::with_due_outcomes())
        .expect_err("outcome flags need the due merge");
    assert!(matches!(err, TableError::MissingColumn(_)));
}

#[test]
fn proportion_is_zero_when_indicator_is_all_missing() {
    let table = Table::from_columns(vec![
        Column::text("lan", text(&["A", "A", "B"])),
        Column::int("fl_bounce", vec![None, None, Some(1)]),
    ])
    .expect("table should build");

    let summary = aggregate_by_customer(
        &table,
        "lan",
        &[AggregateField::proportion("prop_fl_bounce", "fl_bounce")],
    )
    .expect("aggregation succeeds");

    assert_eq!(
        summary.floats("prop_fl_bounce").unwrap(),
        &[Some(0.0), Some(1.0)]
    );
}

#[test]
fn due_summary_proportions_are_zero_without_indicator_values() {
    let dues = enriched_dues()
        .with_column(Column::int("fl_unresolved", vec![None; 5]))
        .expect("replace column");

    let summary = aggregate_dues(&dues).expect("aggregation succeeds");

    assert_eq!(
        summary.floats("prop_fl_unresolved").unwrap(),
        &[Some(0.0), Some(0.0)]
    );
}

#[test]
fn integer_customer_ids_sort_numerically() {
    let table = Table::from_columns(vec![
        Column::int("lan", ints(&[10, 9, 100, 9])),
        Column::int("fl_bounce", ints(&[1, 0, 1, 1])),
    ])
    .expect("table should build");

    let summary = aggregate_by_customer(
        &table,
        "lan",
        &[AggregateField::count("rows", "fl_bounce")],
    )
    .expect("aggregation succeeds");

    assert_eq!(
        summary.text("lan").unwrap(),
        &[
            Some("9".to_string()),
            Some("10".to_string()),
            Some("100".to_string())
        ]
    );
    assert_eq!(summary.ints("rows").unwrap(), &[Some(2), Some(1), Some(1)]);
}
