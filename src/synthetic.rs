//! Deterministic synthetic due and disposition tables for end-to-end runs
//! without real data.
//!
//! All randomness comes from one PCG stream seeded from `SyntheticConfig::seed`,
//! so the same config always yields the same tables.

use chrono::{Duration as ChronoDuration, Months, NaiveDate, NaiveDateTime};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::asof::impute_due_dates;
use crate::streaks::PL_ONLY_TENOR;
use crate::table::{Column, Table, TableError};

const TENOR_TYPES: [&str; 3] = [PL_ONLY_TENOR, "EMI only", "mixed"];
const TENOR_WEIGHTS: [f64; 3] = [0.45, 0.35, 0.20];
const TENOR_STICKINESS: f64 = 0.6;

const CONTACT_TYPES: [&str; 3] = ["CALL", "SMS", "DISPOSITION"];
const CONTACT_WEIGHTS: [f64; 3] = [0.5, 0.35, 0.15];

const SENTIMENTS: [&str; 4] = [
    "positive response",
    "negative response",
    "neutral response",
    "unclassified_response_sentiment",
];
const SENTIMENT_WEIGHTS: [f64; 4] = [0.3, 0.25, 0.3, 0.15];

const BOUNCE_PROBABILITY: f64 = 0.25;
const ANSWER_PROBABILITY: f64 = 0.6;
const MAX_DAYS_BEFORE_DUE: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub num_customers: usize,
    pub num_dues_per_customer: usize,
    /// Each due gets between 0 and this many dispositions before it.
    pub max_dispositions_per_due: usize,
    pub first_due_date: NaiveDate,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            num_customers: 10,
            num_dues_per_customer: 5,
            max_dispositions_per_due: 3,
            first_due_date: NaiveDate::from_ymd_opt(2023, 9, 5).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticData {
    pub dues: Table,
    pub dispositions: Table,
}

#[derive(Default)]
struct DueColumns {
    lan: Vec<Option<String>>,
    due_date: Vec<Option<NaiveDateTime>>,
    tenor_type: Vec<Option<String>>,
    ints: Vec<(&'static str, Vec<Option<i64>>)>,
    floats: Vec<(&'static str, Vec<Option<f64>>)>,
}

impl DueColumns {
    fn push_int(&mut self, name: &'static str, value: i64) {
        push_named(&mut self.ints, name, value);
    }

    fn push_float(&mut self, name: &'static str, value: f64) {
        push_named(&mut self.floats, name, value);
    }

    fn into_table(self) -> Result<Table, TableError> {
        let mut columns = vec![
            Column::text("lan", self.lan),
            Column::timestamp("due_date", self.due_date),
            Column::text("tenor_type", self.tenor_type),
        ];
        columns.extend(self.ints.into_iter().map(|(n, v)| Column::int(n, v)));
        columns.extend(self.floats.into_iter().map(|(n, v)| Column::float(n, v)));
        Table::from_columns(columns)
    }
}

fn push_named<T>(columns: &mut Vec<(&'static str, Vec<Option<T>>)>, name: &'static str, value: T) {
    match columns.iter_mut().find(|(n, _)| *n == name) {
        Some((_, values)) => values.push(Some(value)),
        None => columns.push((name, vec![Some(value)])),
    }
}

#[derive(Default)]
struct DispositionColumns {
    lan: Vec<Option<String>>,
    created_at: Vec<Option<NaiveDateTime>>,
    contact_type: Vec<Option<String>>,
    contact_category: Vec<Option<String>>,
    response_sentiment: Vec<Option<String>>,
    call_duration: Vec<Option<f64>>,
}

impl DispositionColumns {
    fn into_table(self) -> Result<Table, TableError> {
        Table::from_columns(vec![
            Column::text("lan", self.lan),
            Column::timestamp("created_at", self.created_at),
            Column::text("type", self.contact_type),
            Column::text("contact_category", self.contact_category),
            Column::text("response_sentiment", self.response_sentiment),
            Column::float("call_duration", self.call_duration),
        ])
    }
}

/// Builds `num_customers` customers with monthly dues and the contact events
/// leading up to each due. Dispositions carry the nearest due date.
pub fn generate_synthetic(cfg: &SyntheticConfig) -> Result<SyntheticData, TableError> {
    let mut rng = Pcg64Mcg::seed_from_u64(cfg.seed);
    let mut dues = DueColumns::default();
    let mut dispositions = DispositionColumns::default();

    for customer in 0..cfg.num_customers {
        let lan = format!("LAN{:06}", customer + 1);
        let mut tenor = weighted_pick(&mut rng, &TENOR_TYPES, &TENOR_WEIGHTS);

        for due_idx in 0..cfg.num_dues_per_customer {
            let Some(due_day) = cfg
                .first_due_date
                .checked_add_months(Months::new(due_idx as u32))
                .and_then(|d| d.checked_add_signed(ChronoDuration::days(rng.gen_range(0..3))))
            else {
                continue;
            };
            let Some(due_at) = due_day.and_hms_opt(0, 0, 0) else {
                continue;
            };

            if due_idx > 0 && !rng.gen_bool(TENOR_STICKINESS) {
                tenor = weighted_pick(&mut rng, &TENOR_TYPES, &TENOR_WEIGHTS);
            }
            push_due(&mut dues, &mut rng, &lan, due_at, tenor, due_idx, cfg);

            let contacts = rng.gen_range(0..=cfg.max_dispositions_per_due);
            for _ in 0..contacts {
                let minutes_before = rng.gen_range(0..MAX_DAYS_BEFORE_DUE * 24 * 60);
                let created_at = due_at - ChronoDuration::minutes(minutes_before);
                push_disposition(&mut dispositions, &mut rng, &lan, created_at);
            }
        }
    }

    let dues = dues.into_table()?;
    let dispositions = impute_due_dates(&dispositions.into_table()?, &dues)?;

    info!(
        component = "synthetic",
        event = "synthetic.generated",
        seed = cfg.seed,
        customers = cfg.num_customers,
        due_rows = dues.num_rows(),
        disposition_rows = dispositions.num_rows()
    );

    Ok(SyntheticData { dues, dispositions })
}

fn push_due(
    dues: &mut DueColumns,
    rng: &mut Pcg64Mcg,
    lan: &str,
    due_at: NaiveDateTime,
    tenor: &str,
    due_idx: usize,
    cfg: &SyntheticConfig,
) {
    let pre_due_pos: f64 = rng.gen_range(10_000.0..500_000.0);
    let emi: f64 = (pre_due_pos * rng.gen_range(0.02..0.08)).round();
    let bounce = rng.gen_bool(BOUNCE_PROBABILITY);
    let unresolved = bounce && rng.gen_bool(0.5);
    let bounce_tp3 = unresolved && rng.gen_bool(0.6);
    let bounce_tp5 = bounce_tp3 && rng.gen_bool(0.6);
    let current_due = due_idx + 1 == cfg.num_dues_per_customer;
    let monthend_pos = (pre_due_pos - if bounce { 0.0 } else { emi }).max(0.0);
    let when = |flag: bool, value: f64| if flag { value } else { 0.0 };

    dues.lan.push(Some(lan.to_string()));
    dues.due_date.push(Some(due_at));
    dues.tenor_type.push(Some(tenor.to_string()));

    dues.push_int("mob_due", due_idx as i64 + 1);
    dues.push_int("due_loan_count", rng.gen_range(1..=3));
    dues.push_int("fl_bounce", bounce as i64);
    dues.push_int("fl_unresolved", unresolved as i64);
    dues.push_int("fl_current_due", current_due as i64);
    dues.push_int("fl_bounce_tp3", bounce_tp3 as i64);
    dues.push_int("fl_bounce_tp5", bounce_tp5 as i64);

    dues.push_float("pre_due_pos", pre_due_pos.round());
    dues.push_float("monthend_pos", monthend_pos.round());
    dues.push_float("bounce_pos", when(bounce, pre_due_pos).round());
    dues.push_float("unresolved_pos", when(unresolved, pre_due_pos).round());
    dues.push_float("current_bounce_pos", when(bounce && current_due, pre_due_pos).round());
    dues.push_float(
        "current_unresolved_pos",
        when(unresolved && current_due, pre_due_pos).round(),
    );
    dues.push_float("emi_amount_expected_retro", emi);
    dues.push_float("bounce_tp3_pos", when(bounce_tp3, pre_due_pos).round());
    dues.push_float("bounce_tp5_pos", when(bounce_tp5, pre_due_pos).round());
    dues.push_float("current_monthend_pos", when(current_due, monthend_pos).round());
    dues.push_float(
        "proportion_of_payment",
        if bounce { rng.gen_range(0.0..0.5) } else { 1.0 },
    );
    dues.push_float("credit_utilization", rng.gen_range(0.05..0.95));
}

fn push_disposition(
    dispositions: &mut DispositionColumns,
    rng: &mut Pcg64Mcg,
    lan: &str,
    created_at: NaiveDateTime,
) {
    let contact_type = weighted_pick(rng, &CONTACT_TYPES, &CONTACT_WEIGHTS);
    let (category, sentiment, duration) = if contact_type == "SMS" {
        (None, None, None)
    } else if rng.gen_bool(ANSWER_PROBABILITY) {
        let duration = (contact_type == "CALL").then(|| rng.gen_range(15.0..600.0_f64).round());
        (
            Some("answered/contactable"),
            Some(weighted_pick(rng, &SENTIMENTS, &SENTIMENT_WEIGHTS)),
            duration,
        )
    } else {
        let duration = (contact_type == "CALL").then_some(0.0);
        (Some("not answered/uncontactable"), None, duration)
    };

    dispositions.lan.push(Some(lan.to_string()));
    dispositions.created_at.push(Some(created_at));
    dispositions.contact_type.push(Some(contact_type.to_string()));
    dispositions
        .contact_category
        .push(category.map(str::to_string));
    dispositions
        .response_sentiment
        .push(sentiment.map(str::to_string));
    dispositions.call_duration.push(duration);
}

fn weighted_pick<R: Rng>(rng: &mut R, values: &[&'static str], weights: &[f64]) -> &'static str {
    let roll: f64 = rng.gen_range(0.0..weights.iter().sum::<f64>());
    let mut cumulative = 0.0;
    for (value, weight) in values.iter().copied().zip(weights) {
        cumulative += weight;
        if roll < cumulative {
            return value;
        }
    }
    values[values.len() - 1]
}
