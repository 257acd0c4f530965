use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};

mod error;
mod features;
mod io;
mod modeling;
mod models;
mod pipeline;
mod preprocessing;
mod report;
mod soh;

use modeling::{
    FittedModel, GradientBoostedModel, LinearModel, ModelArtifact, ModelConfig,
    RandomForestModel, Regressor,
};
use models::Measurement;
use soh::DEFAULT_EOL_THRESHOLD;

#[derive(Parser)]
#[command(name = "battery-soh")]
#[command(about = "Battery state-of-health analysis from checkup time series", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelKind {
    /// Ordinary least squares baseline
    Linear,
    /// Random forest ensemble
    Forest,
    /// Gradient-boosted trees
    Boosted,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a small synthetic measurement dataset
    Sample {
        #[arg(long, default_value = "measurements.csv")]
        out: PathBuf,
    },
    /// Run the SOH pipeline and write the per-checkup table
    Analyze {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "soh.csv")]
        out: PathBuf,
        #[arg(long, default_value_t = DEFAULT_EOL_THRESHOLD)]
        eol_threshold: f64,
    },
    /// Fit a regressor mapping checkup index to SOH
    Train {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = ModelKind::Linear)]
        model: ModelKind,
        /// Write the fitted model as a versioned JSON artifact
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_EOL_THRESHOLD)]
        eol_threshold: f64,
    },
    /// Generate a markdown fleet-health report
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = DEFAULT_EOL_THRESHOLD)]
        eol_threshold: f64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sample { out } => {
            let rows = synthetic_measurements();
            io::save_table(&rows, &out)?;
            println!("Wrote {} sample measurements to {}.", rows.len(), out.display());
        }
        Commands::Analyze {
            input,
            out,
            eol_threshold,
        } => {
            let measurements = io::load_measurements(&input)?;
            let records = pipeline::run(measurements, eol_threshold);
            if records.is_empty() {
                println!("No checkups found in {}.", input.display());
                return Ok(());
            }

            let below = records.iter().filter(|r| r.below_eol).count();
            io::save_table(&records, &out)?;
            println!(
                "Analyzed {} checkups, {} below the {:.0}% EOL threshold.",
                records.len(),
                below,
                eol_threshold * 100.0
            );
            println!("SOH table written to {}.", out.display());
        }
        Commands::Train {
            input,
            model,
            out,
            eol_threshold,
        } => {
            let measurements = io::load_measurements(&input)?;
            let records = pipeline::run(measurements, eol_threshold);
            let (x, y) = pipeline::training_data(&records);

            let config = ModelConfig::default();
            let fitted = match model {
                ModelKind::Linear => FittedModel::Linear(
                    LinearModel::fit(&x, &y).context("linear fit failed")?,
                ),
                ModelKind::Forest => FittedModel::Forest(
                    RandomForestModel::fit(&x, &y, &config)
                        .context("random forest fit failed")?,
                ),
                ModelKind::Boosted => FittedModel::Boosted(
                    GradientBoostedModel::fit(&x, &y, &config)
                        .context("gradient boosting fit failed")?,
                ),
            };

            let predictions = fitted.predict_batch(&x);
            let r2 = modeling::r_squared(&y, &predictions);
            println!(
                "Fitted {} model on {} checkups, R^2 = {:.4}.",
                fitted.kind(),
                y.len(),
                r2
            );

            if let Some(path) = out {
                ModelArtifact::new(fitted).save(&path)?;
                println!("Model artifact written to {}.", path.display());
            }
        }
        Commands::Report {
            input,
            out,
            eol_threshold,
        } => {
            let measurements = io::load_measurements(&input)?;
            let records = pipeline::run(measurements, eol_threshold);
            let report =
                report::build_report(&records, eol_threshold, Utc::now().date_naive());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Deterministic three-cell dataset: constant-current discharge checkups
/// whose discharge window shrinks cycle over cycle, at different fade rates
/// per cell. Small enough to eyeball, rich enough to exercise every stage.
fn synthetic_measurements() -> Vec<Measurement> {
    let cells: [(&str, f64, f64); 3] = [
        ("cell-001", 2.0, 0.015),
        ("cell-002", 2.5, 0.030),
        ("cell-003", 1.8, 0.055),
    ];
    let checkups = 6u32;
    let base_window_s = 1800.0;
    let step_s = 60.0;

    let mut rows = Vec::new();
    for (cell_id, current, fade_per_checkup) in cells {
        for checkup in 0..checkups {
            let window = base_window_s * (1.0 - fade_per_checkup * checkup as f64);
            let steps = (window / step_s) as u32;
            for step in 0..=steps {
                let time_s = step as f64 * step_s;
                rows.push(Measurement {
                    cell_id: cell_id.to_string(),
                    checkup_num: checkup,
                    time_s,
                    current_a: -current,
                    voltage_v: 4.1 - 0.9 * (time_s / base_window_s),
                    temperature_c: Some(23.0 + 2.0 * (time_s / base_window_s)),
                });
            }
        }
    }

    rows
}
