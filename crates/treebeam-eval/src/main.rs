//! Command-line evaluator for persisted beam-search predictions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use treebeam_eval::{evaluate_file, EvalReport, LengthNorm};

/// Re-rank persisted predictions and report edit similarity at k
#[derive(Debug, Parser)]
#[command(name = "treebeam-eval", version)]
struct Cli {
    /// Prediction JSONL files to evaluate
    #[arg(short = 'p', long = "pred-paths", value_name = "PATH", num_args = 1.., required = true)]
    pred_paths: Vec<PathBuf>,

    /// Report the best hypothesis among the top K, for each K
    #[arg(short = 'k', long = "top-ks", value_name = "K", num_args = 1.., required = true)]
    top_ks: Vec<usize>,

    /// Length-normalization base
    #[arg(long, value_name = "BASE", default_value = "10.0")]
    len_norm_base: f64,

    /// Length-normalization power
    #[arg(long, value_name = "POW", default_value = "0.7")]
    len_norm_pow: f64,

    /// Write the aggregated reports as JSON
    #[arg(long, value_name = "PATH")]
    json_out: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let norm = LengthNorm::new(cli.len_norm_base, cli.len_norm_pow);
    let mut reports: Vec<EvalReport> = Vec::new();
    for path in &cli.pred_paths {
        reports.extend(evaluate_file(path, &cli.top_ks, norm)?);
    }

    if let Some(out) = &cli.json_out {
        let json = serde_json::to_string_pretty(&reports)?;
        std::fs::write(out, json)
            .with_context(|| format!("failed to write report to {}", out.display()))?;
    }
    Ok(())
}

fn setup_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
