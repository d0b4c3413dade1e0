//! Main pipeline binary
//!
//! Loads `config.json` (and optionally `stock_info.json`) from the
//! working directory, spawns the worker pool, and drains the configured
//! month range. Exit code 0 on success, 1 on configuration errors or a
//! fatal worker error.

use anyhow::Context;
use clap::Parser;
use skein_core::config::{active_assets, load_stock_info, PipelineConfig};
use skein_core::pipeline::{init_logging, Runtime};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

#[derive(Parser, Debug)]
#[command(author, version, about = "L2 market data feature pipeline")]
struct Args {
    /// Pipeline configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Stock listing metadata (optional; used to report universe size)
    #[arg(long, default_value = "stock_info.json")]
    stock_info: PathBuf,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    init_logging(&config.temp_base)?;

    if args.stock_info.exists() {
        let info = load_stock_info(&args.stock_info)?;
        let universe = active_assets(&info, &config.start_month, &config.end_month)?;
        tracing::info!(
            "{} assets listed in [{}, {}]",
            universe.len(),
            config.start_month,
            config.end_month
        );
    }

    let runtime = Runtime::new(config)?;

    let shutdown = runtime.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("shutdown requested, finishing in-flight asset-days");
        shutdown.store(true, Ordering::Release);
    })
    .context("installing SIGINT handler")?;

    let summary = runtime.run()?;
    println!(
        "processed {}/{} assets across {} archives in {:.1?}",
        summary.assets_completed, summary.assets_total, summary.archives, summary.elapsed
    );
    Ok(())
}
