use crate::channel::ChannelStats;
use crate::channel_set::ChannelSet;
use crate::error::{PipelineError, Result};
use crate::item::{FeedbackRecord, WorkItem};
use crate::metrics::{MetricsSnapshot, StageMetrics};
use crate::stage::{Stage, StageObservation, StageProbe, WaitOp, CONSUMER, PRODUCER, TRANSFORM};
use crate::stages::{ConsumerStage, ProducerOutput, ProducerStage, TransformStage};
use crossbeam::channel::{unbounded, RecvTimeoutError, Sender};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Sizing and deadline for one pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Work items the producer generates
    pub item_count: u64,
    /// Capacity of both the work and the output channel
    pub data_channel_capacity: usize,
    pub feedback_channel_capacity: usize,
    /// Items the producer enqueues between two feedback drains
    pub feedback_drain_interval: usize,
    /// Deadline used by [`Pipeline::run_with_default_timeout`]
    pub run_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            item_count: 200,
            data_channel_capacity: 10,
            feedback_channel_capacity: 2,
            feedback_drain_interval: 32,
            run_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with; nothing is clamped
    pub fn validate(&self) -> Result<()> {
        if self.data_channel_capacity == 0 {
            return Err(PipelineError::ConfigError(
                "data_channel_capacity must be at least 1".into(),
            ));
        }
        if self.feedback_channel_capacity == 0 {
            return Err(PipelineError::ConfigError(
                "feedback_channel_capacity must be at least 1".into(),
            ));
        }
        if self.feedback_drain_interval == 0 {
            return Err(PipelineError::ConfigError(
                "feedback_drain_interval must be at least 1".into(),
            ));
        }
        check_timeout(self.run_timeout)
    }
}

fn check_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(PipelineError::ConfigError("run timeout must be positive".into()));
    }
    Ok(())
}

/// Builder for constructing pipelines
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_count(mut self, count: u64) -> Self {
        self.config.item_count = count;
        self
    }

    pub fn data_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.data_channel_capacity = capacity;
        self
    }

    pub fn feedback_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.feedback_channel_capacity = capacity;
        self
    }

    pub fn feedback_drain_interval(mut self, interval: usize) -> Self {
        self.config.feedback_drain_interval = interval;
        self
    }

    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.config.run_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        Pipeline::new(self.config)
    }
}

/// Metrics of all three stages at one point in time
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub producer: MetricsSnapshot,
    pub transform: MetricsSnapshot,
    pub consumer: MetricsSnapshot,
}

impl PipelineMetrics {
    pub fn format(&self) -> String {
        format!(
            "Pipeline Metrics Summary:\n  {PRODUCER}: {}\n  {TRANSFORM}: {}\n  {CONSUMER}: {}\n",
            self.producer.format(),
            self.transform.format(),
            self.consumer.format()
        )
    }
}

/// A fully drained run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Items in the order the consumer received them
    pub results: Vec<WorkItem>,
    pub elapsed: Duration,
    /// Feedback the producer collected after building its last item
    pub unattached_feedback: Vec<FeedbackRecord>,
    pub metrics: PipelineMetrics,
}

/// A run that missed its deadline
#[derive(Debug, Clone)]
pub struct Stall {
    pub elapsed: Duration,
    /// Units still alive that are not simply waiting on an empty channel
    pub stuck: BTreeSet<&'static str>,
    /// Units still alive but parked on a get from an empty channel
    pub waiting: BTreeSet<&'static str>,
    /// What each unfinished unit was doing at the deadline
    pub observations: Vec<StageObservation>,
    pub channels: Vec<ChannelStats>,
    pub done_producing: bool,
    pub done_processing: bool,
    pub metrics: PipelineMetrics,
}

/// Result of [`Pipeline::run`]
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    TimedOut(Stall),
}

impl RunOutcome {
    /// Collected items; `None` when the run timed out
    pub fn results(&self) -> Option<&[WorkItem]> {
        match self {
            RunOutcome::Completed(report) => Some(&report.results),
            RunOutcome::TimedOut(_) => None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            RunOutcome::Completed(report) => report.elapsed,
            RunOutcome::TimedOut(stall) => stall.elapsed,
        }
    }

    /// Names of stuck units; `None` when the run completed
    pub fn stuck_units(&self) -> Option<&BTreeSet<&'static str>> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::TimedOut(stall) => Some(&stall.stuck),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    /// One line describing the outcome
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Completed(report) => format!(
                "Processed {} items in {:.3}s",
                report.results.len(),
                report.elapsed.as_secs_f64()
            ),
            RunOutcome::TimedOut(stall) => format!(
                "TIMEOUT: pipeline hung after {:.1}s. Stuck units: {}",
                stall.elapsed.as_secs_f64(),
                stall.stuck.iter().copied().collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

/// Live metrics handles of the three stages
#[derive(Debug, Clone, Default)]
struct StageMetricsSet {
    producer: StageMetrics,
    transform: StageMetrics,
    consumer: StageMetrics,
}

impl StageMetricsSet {
    fn snapshot(&self) -> PipelineMetrics {
        PipelineMetrics {
            producer: self.producer.snapshot(),
            transform: self.transform.snapshot(),
            consumer: self.consumer.snapshot(),
        }
    }
}

/// The three-stage pipeline, ready to run once
///
/// Stages are constructed up front around one shared [`ChannelSet`]; `run`
/// moves each onto its own thread and waits for all of them against a single
/// deadline.
pub struct Pipeline {
    config: PipelineConfig,
    channels: Arc<ChannelSet>,
    producer: ProducerStage,
    transform: TransformStage,
    consumer: ConsumerStage,
    metrics: StageMetricsSet,
}

impl Pipeline {
    /// Validate the configuration and wire the stages together
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let channels = Arc::new(ChannelSet::new(
            config.data_channel_capacity,
            config.feedback_channel_capacity,
        )?);
        let metrics = StageMetricsSet::default();

        Ok(Self {
            producer: ProducerStage::new(
                Arc::clone(&channels),
                config.item_count,
                config.feedback_drain_interval,
                metrics.producer.clone(),
            )?,
            transform: TransformStage::new(Arc::clone(&channels), metrics.transform.clone()),
            consumer: ConsumerStage::new(Arc::clone(&channels), metrics.consumer.clone()),
            config,
            channels,
            metrics,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The channels shared by the stages
    pub fn channels(&self) -> Arc<ChannelSet> {
        Arc::clone(&self.channels)
    }

    /// Live metrics handle for a stage, by name
    pub fn stage_metrics(&self, name: &str) -> Option<&StageMetrics> {
        match name {
            PRODUCER => Some(&self.metrics.producer),
            TRANSFORM => Some(&self.metrics.transform),
            CONSUMER => Some(&self.metrics.consumer),
            _ => None,
        }
    }

    /// Run with the configured `run_timeout`
    pub fn run_with_default_timeout(self) -> Result<RunOutcome> {
        let timeout = self.config.run_timeout;
        self.run(timeout)
    }

    /// Start all stages and wait for them, never longer than `timeout` in total
    ///
    /// Stages that are still alive at the deadline are not cancelled: their
    /// threads are detached and stay parked on whatever channel call they are
    /// inside.
    pub fn run(self, timeout: Duration) -> Result<RunOutcome> {
        check_timeout(timeout)?;
        let Pipeline {
            config,
            channels,
            producer,
            transform,
            consumer,
            metrics,
        } = self;
        info!(
            items = config.item_count,
            data_capacity = config.data_channel_capacity,
            feedback_capacity = config.feedback_channel_capacity,
            drain_interval = config.feedback_drain_interval,
            ?timeout,
            "starting pipeline"
        );

        let start = Instant::now();
        // A timeout past the end of `Instant`'s range means no deadline at all
        let deadline = start.checked_add(timeout);
        let probes = [producer.probe(), transform.probe(), consumer.probe()];

        let (done_tx, done_rx) = unbounded();
        let producer = spawn_stage(producer, &done_tx)?;
        let transform = spawn_stage(transform, &done_tx)?;
        let consumer = spawn_stage(consumer, &done_tx)?;
        drop(done_tx);

        let mut finished = BTreeSet::new();
        while finished.len() < probes.len() {
            let received = match deadline {
                Some(deadline) => done_rx.recv_deadline(deadline),
                None => done_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(name) => {
                    finished.insert(name);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let elapsed = start.elapsed();

        // A finished stage may have finished by panicking
        let producer_output = join_if_finished(producer, PRODUCER, &finished)?;
        let transform_output = join_if_finished(transform, TRANSFORM, &finished)?;
        let consumer_output = join_if_finished(consumer, CONSUMER, &finished)?;
        let snapshot = metrics.snapshot();

        match (producer_output, transform_output, consumer_output) {
            (Some(ProducerOutput { unattached_feedback }), Some(processed), Some(results)) => {
                info!(processed, collected = results.len(), ?elapsed, "pipeline completed");
                Ok(RunOutcome::Completed(RunReport {
                    results,
                    elapsed,
                    unattached_feedback,
                    metrics: snapshot,
                }))
            }
            _ => {
                let stall = diagnose(&channels, &probes, &finished, elapsed, snapshot);
                warn!(
                    ?elapsed,
                    stuck = ?stall.stuck,
                    waiting = ?stall.waiting,
                    "pipeline did not drain before the deadline"
                );
                for observation in &stall.observations {
                    warn!(%observation, "unfinished stage");
                }
                for stats in &stall.channels {
                    warn!(%stats, "channel at deadline");
                }
                Ok(RunOutcome::TimedOut(stall))
            }
        }
    }
}

/// Split unfinished stages into stuck and merely waiting
///
/// A stage parked on a get from an empty channel holds nothing anyone else
/// needs, so it is waiting. Every other unfinished stage is stuck.
fn diagnose(
    channels: &ChannelSet,
    probes: &[Arc<StageProbe>],
    finished: &BTreeSet<&'static str>,
    elapsed: Duration,
    metrics: PipelineMetrics,
) -> Stall {
    let observations: Vec<StageObservation> = probes
        .iter()
        .filter(|probe| !finished.contains(probe.name()))
        .map(|probe| probe.observe())
        .collect();

    let mut stuck = BTreeSet::new();
    let mut waiting = BTreeSet::new();
    for observation in &observations {
        let starved = matches!(
            observation.wait,
            Some(wait) if wait.op == WaitOp::Get && channels.is_empty(wait.channel)
        );
        if starved {
            waiting.insert(observation.name);
        } else {
            stuck.insert(observation.name);
        }
    }

    Stall {
        elapsed,
        stuck,
        waiting,
        observations,
        channels: channels.stats(),
        done_producing: channels.done_producing.is_set(),
        done_processing: channels.done_processing.is_set(),
        metrics,
    }
}

/// Reports a stage's name to the runner when its thread ends, even by panic
struct CompletionSignal {
    name: &'static str,
    done_tx: Sender<&'static str>,
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        let _ = self.done_tx.send(self.name);
    }
}

fn spawn_stage<S: Stage>(stage: S, done_tx: &Sender<&'static str>) -> Result<JoinHandle<S::Output>> {
    let name = stage.name();
    let signal = CompletionSignal {
        name,
        done_tx: done_tx.clone(),
    };

    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _signal = signal;
            stage.run()
        })
        .map_err(|e| PipelineError::ThreadError(format!("failed to spawn {name}: {e}")))
}

/// Join a stage that reported completion; an unfinished one is detached
fn join_if_finished<T>(
    handle: JoinHandle<T>,
    name: &'static str,
    finished: &BTreeSet<&'static str>,
) -> Result<Option<T>> {
    if !finished.contains(name) {
        return Ok(None);
    }
    handle
        .join()
        .map(Some)
        .map_err(|_| PipelineError::StagePanicked(name))
}
