// src/main.rs

mod analyzer;
mod cli;
mod error;
mod files;
mod model;
mod orchestrator;
mod report;
mod sampler;
mod scheduler;
mod task;
mod vcs;

#[cfg(test)]
mod testutil;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Args;
use orchestrator::Orchestrator;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let start_time = Instant::now();

    let config = args.into_config().context("invalid arguments")?;
    let summary = Orchestrator::new(config).run().context("mining run failed")?;

    info!(
        projects = summary.projects,
        failed = summary.failed,
        rows = summary.rows,
        output = %summary.output.display(),
        "total time: {:.2?}",
        start_time.elapsed()
    );
    Ok(())
}
