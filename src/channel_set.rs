use crate::channel::{BoundedChannel, ChannelStats};
use crate::error::Result;
use crate::item::{Envelope, FeedbackRecord, WorkItem};
use std::sync::atomic::{AtomicBool, Ordering};

pub const WORK_CHANNEL: &str = "work";
pub const OUTPUT_CHANNEL: &str = "output";
pub const FEEDBACK_CHANNEL: &str = "feedback";

/// A monotonic flag written by exactly one stage and read by anyone
///
/// Diagnostics only: no stage waits on a flag.
#[derive(Debug, Default)]
pub struct CompletionFlag(AtomicBool);

impl CompletionFlag {
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The three channels wiring the stages together
///
/// ```text
/// producer --work--> transform --output--> consumer
///    ^                   |
///    +-----feedback------+
/// ```
#[derive(Debug)]
pub struct ChannelSet {
    pub work: BoundedChannel<Envelope<WorkItem>>,
    pub output: BoundedChannel<Envelope<WorkItem>>,
    pub feedback: BoundedChannel<FeedbackRecord>,
    /// Written by the producer once its sentinel is about to go out
    pub done_producing: CompletionFlag,
    /// Written by the transform once it has observed the sentinel
    pub done_processing: CompletionFlag,
}

impl ChannelSet {
    /// Both data channels share `data_capacity`
    pub fn new(data_capacity: usize, feedback_capacity: usize) -> Result<Self> {
        Ok(Self {
            work: BoundedChannel::new(WORK_CHANNEL, data_capacity)?,
            output: BoundedChannel::new(OUTPUT_CHANNEL, data_capacity)?,
            feedback: BoundedChannel::new(FEEDBACK_CHANNEL, feedback_capacity)?,
            done_producing: CompletionFlag::default(),
            done_processing: CompletionFlag::default(),
        })
    }

    /// Whether the named channel currently holds nothing
    pub fn is_empty(&self, channel: &str) -> bool {
        match channel {
            WORK_CHANNEL => self.work.is_empty(),
            OUTPUT_CHANNEL => self.output.is_empty(),
            FEEDBACK_CHANNEL => self.feedback.is_empty(),
            _ => false,
        }
    }

    pub fn stats(&self) -> Vec<ChannelStats> {
        vec![self.work.stats(), self.output.stats(), self.feedback.stats()]
    }
}
