//! One-row-per-customer summaries of due and disposition tables.

use tracing::info;

use crate::deltas::{
    TIME_SINCE_LAST_CALL, TIME_SINCE_LAST_CONTACT, TIME_SINCE_LAST_DUE, TIME_SINCE_LAST_FIELD,
    TIME_SINCE_LAST_SMS,
};
use crate::streaks::{
    CURRENT_STREAK_COLUMN, PL_ONLY_TENOR, PREVIOUS_STREAK_COLUMN, STREAK_END_COLUMN,
};
use crate::table::{Column, ColumnData, CustomerRows, Table, TableError};

pub const CUSTOMER_COLUMN: &str = "lan";

const DUE_MEAN_COLUMNS: [&str; 16] = [
    "mob_due",
    "pre_due_pos",
    "due_loan_count",
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
    CURRENT_STREAK_COLUMN,
    PREVIOUS_STREAK_COLUMN,
];

const DUE_FLAG_COLUMNS: [&str; 5] = [
    "fl_bounce",
    "fl_unresolved",
    "fl_current_due",
    "fl_bounce_tp3",
    "fl_bounce_tp5",
];

/// How one output column is reduced from a customer's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateExpr {
    /// Non-missing cells.
    Count(String),
    /// Text cells equal to the value.
    CountEq { column: String, value: String },
    /// Indicator cells equal to 1.
    CountTrue(String),
    /// Mean of non-missing cells; missing when there are none.
    Mean(String),
    /// Mean of `column` over rows whose `flag` is 1.
    MeanWhere { column: String, flag: String },
    /// Indicator cells equal to 1 over non-missing cells, 0.0 when empty.
    Proportion(String),
    /// Text cells equal to the value over non-missing cells, 0.0 when empty.
    ProportionEq { column: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateField {
    pub name: String,
    pub expr: AggregateExpr,
}

impl AggregateField {
    pub fn new(name: impl Into<String>, expr: AggregateExpr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }

    pub fn count(name: &str, column: &str) -> Self {
        Self::new(name, AggregateExpr::Count(column.to_string()))
    }

    pub fn count_eq(name: &str, column: &str, value: &str) -> Self {
        Self::new(
            name,
            AggregateExpr::CountEq {
                column: column.to_string(),
                value: value.to_string(),
            },
        )
    }

    pub fn mean(name: &str, column: &str) -> Self {
        Self::new(name, AggregateExpr::Mean(column.to_string()))
    }

    pub fn proportion(name: &str, column: &str) -> Self {
        Self::new(name, AggregateExpr::Proportion(column.to_string()))
    }

    pub fn proportion_eq(name: &str, column: &str, value: &str) -> Self {
        Self::new(
            name,
            AggregateExpr::ProportionEq {
                column: column.to_string(),
                value: value.to_string(),
            },
        )
    }
}

/// Collapses `table` to one row per distinct non-missing `customer`, sorted
/// by id. Every source column is resolved before any group is reduced, so a
/// missing column fails even on an empty table.
pub fn aggregate_by_customer(
    table: &Table,
    customer: &str,
    fields: &[AggregateField],
) -> Result<Table, TableError> {
    let groups = table.group_by_customer(customer)?;
    let mut columns = Vec::with_capacity(fields.len() + 1);
    columns.push(Column::text(
        customer,
        groups.iter().map(|g| Some(g.customer.clone())).collect(),
    ));
    for field in fields {
        columns.push(Column::new(
            field.name.clone(),
            reduce(table, &field.expr, &groups)?,
        ));
    }
    Table::from_columns(columns)
}

pub fn due_aggregate_fields() -> Vec<AggregateField> {
    let mut fields = vec![
        AggregateField::mean("avg_duration_between_dues", TIME_SINCE_LAST_DUE),
        AggregateField::count("total_num_dues", "due_date"),
        AggregateField::new(
            "num_pl_streaks",
            AggregateExpr::CountTrue(STREAK_END_COLUMN.to_string()),
        ),
        AggregateField::new(
            "avg_pl_streak_length",
            AggregateExpr::MeanWhere {
                column: CURRENT_STREAK_COLUMN.to_string(),
                flag: STREAK_END_COLUMN.to_string(),
            },
        ),
    ];
    for column in DUE_MEAN_COLUMNS {
        fields.push(AggregateField::mean(&format!("avg_{column}"), column));
    }
    for column in DUE_FLAG_COLUMNS {
        fields.push(AggregateField::proportion(&format!("prop_{column}"), column));
    }
    fields.push(AggregateField::proportion_eq(
        "prop_fl_pl_only",
        "tenor_type",
        PL_ONLY_TENOR,
    ));
    fields
}

/// Customer-level due summary. Expects the delta and streak columns.
pub fn aggregate_dues(dues: &Table) -> Result<Table, TableError> {
    let out = aggregate_by_customer(dues, CUSTOMER_COLUMN, &due_aggregate_fields())?;
    log_aggregate("dues", dues, &out);
    Ok(out)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispositionAggregateOptions {
    /// Indicator columns summarized as `prop_<flag>`; each must be present.
    pub outcome_flags: Vec<String>,
}

impl DispositionAggregateOptions {
    /// Outcome flags attached by the forward due merge.
    pub fn with_due_outcomes() -> Self {
        Self {
            outcome_flags: [
                "next_fl_bounce",
                "next_fl_unresolved",
                "next_fl_bounce_tp3",
                "next_fl_bounce_tp5",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

pub fn disposition_aggregate_fields(opts: &DispositionAggregateOptions) -> Vec<AggregateField> {
    let mut fields = vec![
        AggregateField::count_eq("call_count", "type", "CALL"),
        AggregateField::count_eq("sms_count", "type", "SMS"),
        AggregateField::count_eq("field_count", "type", "DISPOSITION"),
        AggregateField::count("total_contacts", "type"),
        AggregateField::count_eq("answered", "contact_category", "answered/contactable"),
        AggregateField::count_eq(
            "not_answered",
            "contact_category",
            "not answered/uncontactable",
        ),
        AggregateField::count_eq("pos_response", "response_sentiment", "positive response"),
        AggregateField::count_eq("neg_response", "response_sentiment", "negative response"),
        AggregateField::count_eq("neu_response", "response_sentiment", "neutral response"),
        AggregateField::count_eq(
            "unknown_response",
            "response_sentiment",
            "unclassified_response_sentiment",
        ),
        AggregateField::mean("avg_time_between_calls", TIME_SINCE_LAST_CALL),
        AggregateField::mean("avg_time_between_sms", TIME_SINCE_LAST_SMS),
        AggregateField::mean("avg_time_between_field", TIME_SINCE_LAST_FIELD),
        AggregateField::mean("avg_time_between_all", TIME_SINCE_LAST_CONTACT),
        AggregateField::mean("avg_call_duration", "call_duration"),
        AggregateField::proportion_eq("call_proportion", "type", "CALL"),
        AggregateField::proportion_eq("sms_proportion", "type", "SMS"),
        AggregateField::proportion_eq("field_proportion", "type", "DISPOSITION"),
    ];
    for flag in &opts.outcome_flags {
        fields.push(AggregateField::proportion(&format!("prop_{flag}"), flag));
    }
    fields
}

/// Customer-level disposition summary, plus `is_message_only` for customers
/// reached by neither a call nor a field visit.
pub fn aggregate_dispositions(
    dispositions: &Table,
    opts: &DispositionAggregateOptions,
) -> Result<Table, TableError> {
    let out = aggregate_by_customer(
        dispositions,
        CUSTOMER_COLUMN,
        &disposition_aggregate_fields(opts),
    )?;
    let out = with_all_zero_flag(out, "is_message_only", &["call_count", "field_count"])?;
    log_aggregate("dispositions", dispositions, &out);
    Ok(out)
}

/// Adds a boolean column that is true where every listed count is zero.
pub fn with_all_zero_flag(
    table: Table,
    output: &str,
    columns: &[&str],
) -> Result<Table, TableError> {
    let mut flags = vec![Some(true); table.num_rows()];
    for column in columns {
        for (flag, count) in flags.iter_mut().zip(table.ints(column)?) {
            if *count != Some(0) {
                *flag = Some(false);
            }
        }
    }
    table.with_column(Column::bool(output, flags))
}

fn reduce(
    table: &Table,
    expr: &AggregateExpr,
    groups: &[CustomerRows],
) -> Result<ColumnData, TableError> {
    let data = match expr {
        AggregateExpr::Count(column) => {
            let data = &table.column(column)?.data;
            ColumnData::Int(
                groups
                    .iter()
                    .map(|g| Some(g.rows.iter().filter(|&&r| !data.is_missing(r)).count() as i64))
                    .collect(),
            )
        }
        AggregateExpr::CountEq { column, value } => {
            let values = table.text(column)?;
            ColumnData::Int(
                groups
                    .iter()
                    .map(|g| Some(count_eq(values, &g.rows, value) as i64))
                    .collect(),
            )
        }
        AggregateExpr::CountTrue(column) => {
            let values = table.numeric(column)?;
            ColumnData::Int(
                groups
                    .iter()
                    .map(|g| Some(count_true(&values, &g.rows) as i64))
                    .collect(),
            )
        }
        AggregateExpr::Mean(column) => {
            let values = table.numeric(column)?;
            ColumnData::Float(
                groups
                    .iter()
                    .map(|g| mean(g.rows.iter().map(|&r| values[r])))
                    .collect(),
            )
        }
        AggregateExpr::MeanWhere { column, flag } => {
            let values = table.numeric(column)?;
            let flags = table.numeric(flag)?;
            ColumnData::Float(
                groups
                    .iter()
                    .map(|g| {
                        mean(
                            g.rows
                                .iter()
                                .filter(|&&r| flags[r] == Some(1.0))
                                .map(|&r| values[r]),
                        )
                    })
                    .collect(),
            )
        }
        AggregateExpr::Proportion(column) => {
            let values = table.numeric(column)?;
            ColumnData::Float(
                groups
                    .iter()
                    .map(|g| {
                        let present = g.rows.iter().filter(|&&r| values[r].is_some()).count();
                        Some(ratio(count_true(&values, &g.rows), present))
                    })
                    .collect(),
            )
        }
        AggregateExpr::ProportionEq { column, value } => {
            let values = table.text(column)?;
            ColumnData::Float(
                groups
                    .iter()
                    .map(|g| {
                        let present = g.rows.iter().filter(|&&r| values[r].is_some()).count();
                        Some(ratio(count_eq(values, &g.rows, value), present))
                    })
                    .collect(),
            )
        }
    };
    Ok(data)
}

fn count_eq(values: &[Option<String>], rows: &[usize], value: &str) -> usize {
    rows.iter()
        .filter(|&&r| values[r].as_deref() == Some(value))
        .count()
}

fn count_true(values: &[Option<f64>], rows: &[usize]) -> usize {
    rows.iter().filter(|&&r| values[r] == Some(1.0)).count()
}

fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn log_aggregate(kind: &str, input: &Table, output: &Table) {
    info!(
        component = "aggregate",
        event = "aggregate.finish",
        kind,
        input_rows = input.num_rows(),
        customers = output.num_rows(),
        columns = output.num_columns()
    );
}
