/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use kvsim_monitor::config::RunConfig;
use kvsim_monitor::engine::http::DEFAULT_BACKEND_URL;
use kvsim_monitor::engine::HttpEngine;
use kvsim_monitor::run::RunOrchestrator;
use kvsim_monitor::store::{ResultSnapshot, ResultStore};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Submits one simulation run and reports its results.
///
/// Example:
///   kvsim-monitor --trace traces/burst.txt --config run.yaml --seed 42 \
///                 --series-out burst_series.csv
#[derive(Debug, Parser)]
#[command(
    name = "kvsim-monitor",
    about = "Run the KV-cache scheduling simulator and summarise the result",
    long_about = None,
)]
struct Cli {
    /// Request trace file sent to the engine verbatim.
    #[arg(short = 't', long = "trace")]
    trace: PathBuf,

    /// YAML run configuration (global fields and per-device overrides).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Random seed; overrides the seed in the configuration file.
    #[arg(short = 's', long = "seed", allow_negative_numbers = true)]
    seed: Option<i64>,

    /// Simulation engine base URL.
    #[arg(short = 'b', long = "backend-url", env = "KVSIM_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,

    /// Upper bound on each engine request, in seconds.
    #[arg(long = "timeout-secs", default_value_t = 300)]
    timeout_secs: u64,

    /// Write the derived series as CSV to this path.
    #[arg(short = 'o', long = "series-out")]
    series_out: Option<PathBuf>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(
        trace       = %cli.trace.display(),
        config      = ?cli.config,
        seed        = ?cli.seed,
        backend_url = %cli.backend_url,
        timeout     = cli.timeout_secs,
        "Configuration"
    );

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Assemble run configuration ────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => RunConfig::load_from_file(path)?,
        None => {
            warn!("No run configuration file provided, using built-in defaults");
            RunConfig::new()
        }
    };
    log_config(&config);

    let trace = std::fs::read_to_string(&cli.trace)
        .with_context(|| format!("Failed to read trace file: {}", cli.trace.display()))?;
    let request = config.build_request(trace, cli.seed);

    // ── Submit ────────────────────────────────────────────────────────────────
    let engine = HttpEngine::new(cli.backend_url.clone(), Duration::from_secs(cli.timeout_secs))
        .context("Failed to build HTTP client")?;
    let orchestrator = RunOrchestrator::new(engine, ResultStore::new());

    let run_id = orchestrator.run(request).await.context("Run failed")?;
    info!(run_id = %run_id, "Run complete");

    // ── Report ────────────────────────────────────────────────────────────────
    let snapshot = orchestrator.store().snapshot();
    print_report(&run_id, &snapshot);

    if let Some(path) = &cli.series_out {
        write_series(path, &snapshot)?;
    }
    Ok(())
}

fn log_config(config: &RunConfig) {
    let devices = config.device_count();
    info!(devices, seed = ?config.seed, "Run configuration");
    for (name, value) in config.visible_global_fields() {
        info!("  {name} = {value}");
    }
    if config.is_multi_device() {
        for &index in config.devices.keys() {
            let overrides: Vec<String> = config
                .device_overrides(index)
                .into_iter()
                .map(|(f, v)| format!("{f}={v}"))
                .collect();
            if !overrides.is_empty() {
                info!("  [GPU {index}] overrides  {}", overrides.join("  "));
            }
        }
    }
}

fn print_report(run_id: &str, snapshot: &ResultSnapshot) {
    println!("Run {run_id}");

    if let Some(summary) = &snapshot.summary {
        println!();
        for kpi in summary.kpis() {
            println!("  {:<26} {}", kpi.label, kpi.value);
        }
        if let Some(rows) = summary.breakdown_rows() {
            println!();
            println!("  {:<8} {:>10} {:>12} {:>14}", "GPU", "Requests", "Tokens", "Peak VRAM");
            for row in rows {
                println!(
                    "  {:<8} {:>10} {:>12} {:>14}",
                    row.device, row.requests, row.tokens, row.peak_vram
                );
            }
        }
    }

    if let Some(series) = &snapshot.series {
        println!();
        println!("  {} samples", series.len());
        for chart in series.charts() {
            let names: Vec<&str> = chart.traces.iter().map(|t| t.name.as_str()).collect();
            println!("  {:<26} [{}] {}", chart.title, chart.y_title, names.join(", "));
        }
    }
}

fn write_series(path: &Path, snapshot: &ResultSnapshot) -> Result<()> {
    let Some(series) = &snapshot.series else {
        warn!("No series to export");
        return Ok(());
    };
    std::fs::write(path, series.to_csv())
        .with_context(|| format!("Failed to write series CSV: {}", path.display()))?;
    info!(path = %path.display(), samples = series.len(), "Series written");
    Ok(())
}
