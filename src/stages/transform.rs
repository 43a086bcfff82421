use crate::channel_set::{ChannelSet, FEEDBACK_CHANNEL, OUTPUT_CHANNEL, WORK_CHANNEL};
use crate::item::{transform_value, Envelope, FeedbackRecord, Suggestion};
use crate::metrics::StageMetrics;
use crate::stage::{Stage, StageProbe, StageState, Wait, TRANSFORM};
use std::sync::Arc;
use tracing::{debug, trace};

/// Transforms each item, reports back to the producer, forwards downstream
///
/// Per item the feedback put comes before the downstream put. While the
/// feedback channel is full the stage holds the item it just took.
pub struct TransformStage {
    channels: Arc<ChannelSet>,
    processed: u64,
    probe: Arc<StageProbe>,
    metrics: StageMetrics,
}

impl TransformStage {
    pub fn new(channels: Arc<ChannelSet>, metrics: StageMetrics) -> Self {
        Self {
            channels,
            processed: 0,
            probe: StageProbe::new(TRANSFORM),
            metrics,
        }
    }
}

impl Stage for TransformStage {
    /// Number of items transformed
    type Output = u64;

    fn name(&self) -> &'static str {
        TRANSFORM
    }

    fn probe(&self) -> Arc<StageProbe> {
        Arc::clone(&self.probe)
    }

    fn run(mut self) -> u64 {
        self.probe.advance(StageState::Running);

        loop {
            let envelope = self
                .probe
                .blocking(Wait::get(WORK_CHANNEL), || self.channels.work.get());
            let mut item = match envelope {
                Envelope::Item(item) => item,
                Envelope::Sentinel => break,
            };

            item.value = transform_value(item.value);
            item.processed = true;
            self.processed += 1;
            trace!(id = item.id, value = item.value, "transformed item");

            let feedback = FeedbackRecord {
                source_item_id: item.id,
                suggestion: Suggestion::IncreaseRate,
                metric: self.processed,
            };
            self.probe
                .blocking(Wait::put(FEEDBACK_CHANNEL), || self.channels.feedback.put(feedback));
            self.metrics.record_feedback_sent();

            self.probe.blocking(Wait::put(OUTPUT_CHANNEL), || {
                self.channels.output.put(Envelope::Item(item))
            });
            self.metrics.record_item();
        }

        self.probe.advance(StageState::Draining);
        self.channels.done_processing.set();
        self.probe
            .blocking(Wait::put(OUTPUT_CHANNEL), || self.channels.output.put(Envelope::Sentinel));

        debug!(processed = self.processed, "transform finished");
        self.probe.advance(StageState::Done);
        self.processed
    }
}
