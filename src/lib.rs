//! A bounded three-stage pipeline with a feedback channel and a drain watchdog.
//!
//! A producer feeds a transform stage, which forwards every item to a consumer
//! and sends one feedback record per item back to the producer. All four links
//! are fixed-capacity channels, so the feedback path closes a loop of bounded
//! buffers: sized badly, the producer and the transform end up waiting on each
//! other forever. The runner never cancels anything; it waits against a
//! deadline and, if the pipeline has not drained by then, reports which stages
//! are stuck and what they were blocked on.
//!
//! # Features
//!
//! - Bounded channels on crossbeam's `ArrayQueue` with condvar parking
//! - Blocking `put`/`get` plus non-blocking `try_get`/`try_put`
//! - One OS thread per stage, joined against a single deadline
//! - Per-stage lifecycle probes and metrics, channel suspension counters
//!
//! # Example
//!
//! ```ignore
//! use feedback_pipeline::{PipelineBuilder, RunOutcome};
//! use std::time::Duration;
//!
//! let pipeline = PipelineBuilder::new()
//!     .item_count(200)
//!     .feedback_channel_capacity(200)
//!     .build()?;
//!
//! match pipeline.run(Duration::from_secs(10))? {
//!     RunOutcome::Completed(report) => println!("{} items", report.results.len()),
//!     RunOutcome::TimedOut(stall) => println!("stuck: {:?}", stall.stuck),
//! }
//! ```

pub mod channel;
pub mod channel_set;
pub mod error;
pub mod item;
pub mod metrics;
pub mod pipeline;
pub mod stage;
pub mod stages;

// Re-exports for convenience
pub use channel::{BoundedChannel, ChannelStats};
pub use channel_set::{ChannelSet, CompletionFlag};
pub use error::{PipelineError, Result};
pub use item::{transform_value, Envelope, FeedbackRecord, Suggestion, WorkItem};
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineConfig, PipelineMetrics, RunOutcome, RunReport, Stall,
};
pub use stage::{Stage, StageObservation, StageProbe, StageState, Wait, WaitOp};
pub use stage::{CONSUMER, PRODUCER, TRANSFORM};
pub use stages::{ConsumerStage, ProducerOutput, ProducerStage, TransformStage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
