use crate::channel_set::{ChannelSet, FEEDBACK_CHANNEL, WORK_CHANNEL};
use crate::error::{PipelineError, Result};
use crate::item::{Envelope, FeedbackRecord, WorkItem};
use crate::metrics::StageMetrics;
use crate::stage::{Stage, StageProbe, StageState, Wait, PRODUCER};
use std::sync::Arc;
use tracing::{debug, trace};

/// Generates `item_count` work items and absorbs the transform's feedback
///
/// Items go out in bursts of `drain_interval`. Before each burst the producer
/// empties the feedback channel without ever blocking and attaches what it
/// found to the first item of the burst. Once the sentinel is out it keeps
/// collecting feedback until it has one record per item it produced.
pub struct ProducerStage {
    channels: Arc<ChannelSet>,
    item_count: u64,
    drain_interval: u64,
    probe: Arc<StageProbe>,
    metrics: StageMetrics,
}

/// Feedback that arrived after the last item was built
#[derive(Debug, Default)]
pub struct ProducerOutput {
    pub unattached_feedback: Vec<FeedbackRecord>,
}

impl ProducerStage {
    /// A zero `drain_interval` is rejected with a configuration error
    pub fn new(
        channels: Arc<ChannelSet>,
        item_count: u64,
        drain_interval: usize,
        metrics: StageMetrics,
    ) -> Result<Self> {
        if drain_interval == 0 {
            return Err(PipelineError::ConfigError(
                "feedback_drain_interval must be at least 1".into(),
            ));
        }

        Ok(Self {
            channels,
            item_count,
            drain_interval: drain_interval as u64,
            probe: StageProbe::new(PRODUCER),
            metrics,
        })
    }

    /// Take every feedback record available right now
    fn drain_feedback(&self) -> Vec<FeedbackRecord> {
        let drained: Vec<_> = std::iter::from_fn(|| self.channels.feedback.try_get()).collect();
        if !drained.is_empty() {
            self.metrics.record_feedback_received(drained.len() as u64);
            trace!(count = drained.len(), "drained feedback");
        }
        drained
    }
}

impl Stage for ProducerStage {
    type Output = ProducerOutput;

    fn name(&self) -> &'static str {
        PRODUCER
    }

    fn probe(&self) -> Arc<StageProbe> {
        Arc::clone(&self.probe)
    }

    fn run(self) -> ProducerOutput {
        self.probe.advance(StageState::Running);

        let mut received = 0u64;
        for id in 0..self.item_count {
            let adjustments = if id % self.drain_interval == 0 {
                self.drain_feedback()
            } else {
                Vec::new()
            };
            received += adjustments.len() as u64;

            let item = WorkItem::new(id, adjustments);
            trace!(id, "producing item");
            self.probe.blocking(Wait::put(WORK_CHANNEL), || {
                self.channels.work.put(Envelope::Item(item))
            });
            self.metrics.record_item();
        }

        self.channels.done_producing.set();
        self.probe
            .blocking(Wait::put(WORK_CHANNEL), || self.channels.work.put(Envelope::Sentinel));
        self.probe.advance(StageState::Draining);

        let mut unattached_feedback = Vec::new();
        while received < self.item_count {
            let record = self
                .probe
                .blocking(Wait::get(FEEDBACK_CHANNEL), || self.channels.feedback.get());
            self.metrics.record_feedback_received(1);
            received += 1;
            unattached_feedback.push(record);
        }

        debug!(
            items = self.item_count,
            trailing_feedback = unattached_feedback.len(),
            "producer finished"
        );
        self.probe.advance(StageState::Done);
        ProducerOutput { unattached_feedback }
    }
}
