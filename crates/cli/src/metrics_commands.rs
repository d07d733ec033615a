use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use {
    allervie_dashboard::{METRIC_KEYS, RawPerformance, format_performance, validate_payload},
    anyhow::{Context, Result},
    clap::Subcommand,
    serde_json::Value,
};

#[derive(Subcommand)]
pub enum MetricsAction {
    /// Reshape a raw metrics payload into the dashboard schema.
    Format {
        /// JSON file with `current` (and optionally `previous`) totals, or `-`
        /// for stdin.
        #[arg(long)]
        input: PathBuf,
    },
    /// Validate a payload already in dashboard shape.
    Check {
        /// JSON file, or `-` for stdin.
        #[arg(long)]
        input: PathBuf,
    },
}

pub fn handle_metrics(action: MetricsAction) -> Result<()> {
    match action {
        MetricsAction::Format { input } => {
            println!("{}", format_file(&input)?);
            Ok(())
        },
        MetricsAction::Check { input } => {
            for line in check_file(&input)? {
                println!("{line}");
            }
            Ok(())
        },
    }
}

fn format_file(input: &Path) -> Result<String> {
    let raw: RawPerformance = serde_json::from_str(&read_input(input)?)
        .context("invalid raw performance payload")?;
    let report = format_performance(&raw);
    Ok(serde_json::to_string_pretty(&report)?)
}

/// One `metric: value (change: x%)` line per metric when the payload is valid.
fn check_file(input: &Path) -> Result<Vec<String>> {
    let payload: Value =
        serde_json::from_str(&read_input(input)?).context("payload is not valid JSON")?;
    validate_payload(&payload)?;

    Ok(METRIC_KEYS
        .iter()
        .map(|key| {
            let metric = &payload[*key];
            format!("{key}: {} (change: {}%)", metric["value"], metric["change"])
        })
        .collect())
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))
}
