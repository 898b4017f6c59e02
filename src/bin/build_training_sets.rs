use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use bounce_features::{
    generate_synthetic, init_logging, load_table, log_app_start, log_input_selected,
    log_outputs_written, logging_config_from_env, run_pipeline, write_table_csv, IntervalSplit,
    LoadOptions, PipelineConfig, SyntheticConfig, Table,
};
use chrono::NaiveDate;
use tracing::warn;

const DUES_PATH_VAR: &str = "BOUNCE_DUES_PATH";
const DISPOSITIONS_PATH_VAR: &str = "BOUNCE_DISPOSITIONS_PATH";
const OUTPUT_DIR_VAR: &str = "BOUNCE_OUTPUT_DIR";
const SPLIT_START_VAR: &str = "BOUNCE_SPLIT_START";
const NUM_INTERVALS_VAR: &str = "BOUNCE_NUM_INTERVALS";
const INTERVAL_MONTHS_VAR: &str = "BOUNCE_INTERVAL_MONTHS";
const SYNTHETIC_SEED_VAR: &str = "BOUNCE_SYNTHETIC_SEED";

fn main() -> Result<(), Box<dyn Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let cfg = pipeline_config_from_env()?;
    let output_dir = env::var(OUTPUT_DIR_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("output"));

    let (dues, dispositions) = load_inputs()?;
    let output = run_pipeline(&dues, &dispositions, &cfg)?;

    fs::create_dir_all(&output_dir)?;
    let mut written = 0;
    for (name, table) in [
        ("dues_enriched", &output.dues),
        ("dispositions_enriched", &output.dispositions),
        ("due_summary", &output.due_summary),
        ("disposition_summary", &output.disposition_summary),
    ] {
        write_csv(&output_dir, name, table)?;
        written += 1;
    }
    written += write_windows(&output_dir, "due_summary", &output.due_window_summaries)?;
    written += write_windows(
        &output_dir,
        "disposition_summary",
        &output.disposition_window_summaries,
    )?;

    let manifest = serde_json::to_vec_pretty(&output.manifest(&cfg))?;
    fs::write(output_dir.join("manifest.json"), manifest)?;
    written += 1;

    log_outputs_written(&output_dir, written);
    Ok(())
}

fn pipeline_config_from_env() -> Result<PipelineConfig, Box<dyn Error>> {
    let mut cfg = PipelineConfig::default();
    if let Some(raw) = non_empty_var(SPLIT_START_VAR) {
        cfg.start_date_for_split = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|err| format!("{SPLIT_START_VAR}={raw:?} is not a YYYY-MM-DD date: {err}"))?;
    }
    if let Some(raw) = non_empty_var(NUM_INTERVALS_VAR) {
        cfg.num_intervals = raw
            .parse()
            .map_err(|err| format!("{NUM_INTERVALS_VAR}={raw:?}: {err}"))?;
    }
    if let Some(raw) = non_empty_var(INTERVAL_MONTHS_VAR) {
        cfg.interval_magnitude = raw
            .parse()
            .map_err(|err| format!("{INTERVAL_MONTHS_VAR}={raw:?}: {err}"))?;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Both tables come from files when both paths are set, otherwise from the
/// synthetic generator.
fn load_inputs() -> Result<(Table, Table), Box<dyn Error>> {
    let dues_path = non_empty_var(DUES_PATH_VAR).map(PathBuf::from);
    let dispositions_path = non_empty_var(DISPOSITIONS_PATH_VAR).map(PathBuf::from);

    match (dues_path, dispositions_path) {
        (Some(dues_path), Some(dispositions_path)) => {
            log_input_selected("dues", Some(&dues_path));
            let dues = load_table(&dues_path, &LoadOptions::dues())?;
            log_input_selected("dispositions", Some(&dispositions_path));
            let dispositions = load_table(&dispositions_path, &LoadOptions::dispositions())?;
            Ok((dues.table, dispositions.table))
        }
        (dues_path, dispositions_path) => {
            if dues_path.is_some() || dispositions_path.is_some() {
                warn!(
                    component = "build_training_sets",
                    event = "input.partial_paths",
                    "only one input path set; falling back to synthetic data"
                );
            }
            let mut synthetic_cfg = SyntheticConfig::default();
            if let Some(raw) = non_empty_var(SYNTHETIC_SEED_VAR) {
                synthetic_cfg.seed = raw
                    .parse()
                    .map_err(|err| format!("{SYNTHETIC_SEED_VAR}={raw:?}: {err}"))?;
            }
            log_input_selected("dues", None);
            log_input_selected("dispositions", None);
            let data = generate_synthetic(&synthetic_cfg)?;
            Ok((data.dues, data.dispositions))
        }
    }
}

fn write_windows(dir: &Path, prefix: &str, split: &IntervalSplit) -> Result<usize, Box<dyn Error>> {
    for window in split {
        write_csv(dir, &format!("{prefix}_{}", window.label), &window.table)?;
    }
    Ok(split.len())
}

fn write_csv(dir: &Path, name: &str, table: &Table) -> Result<(), Box<dyn Error>> {
    write_table_csv(table, &dir.join(format!("{name}.csv")))?;
    Ok(())
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}
