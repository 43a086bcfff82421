//! Runs the feedback pipeline once and prints a one-line summary.
//!
//! Usage: feedback-pipeline --items 200 --feedback-capacity 2 --timeout-secs 10
//!        (RUST_LOG=debug shows stage transitions)

use anyhow::Result;
use clap::Parser;
use feedback_pipeline::{PipelineBuilder, RunOutcome};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "feedback-pipeline")]
#[command(about = "Run a bounded producer/transform/consumer pipeline with upstream feedback")]
struct Cli {
    /// Number of work items to produce.
    #[arg(long, default_value_t = 200)]
    items: u64,

    /// Capacity of the work and output channels.
    #[arg(long, default_value_t = 10)]
    data_capacity: usize,

    /// Capacity of the feedback channel.
    #[arg(long, default_value_t = 2)]
    feedback_capacity: usize,

    /// Items enqueued between two feedback drains.
    #[arg(long, default_value_t = 32)]
    drain_interval: usize,

    /// Seconds to wait for the pipeline to drain.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Print per-stage metrics after the summary.
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let pipeline = PipelineBuilder::new()
        .item_count(cli.items)
        .data_channel_capacity(cli.data_capacity)
        .feedback_channel_capacity(cli.feedback_capacity)
        .feedback_drain_interval(cli.drain_interval)
        .run_timeout(Duration::from_secs(cli.timeout_secs))
        .build()?;

    let outcome = pipeline.run_with_default_timeout()?;
    println!("{}", outcome.summary());

    if cli.metrics {
        let metrics = match &outcome {
            RunOutcome::Completed(report) => &report.metrics,
            RunOutcome::TimedOut(stall) => &stall.metrics,
        };
        print!("{}", metrics.format());
    }

    // Stuck stage threads are parked forever; returning ends the process
    Ok(if outcome.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
