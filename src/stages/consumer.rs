use crate::channel_set::{ChannelSet, OUTPUT_CHANNEL};
use crate::item::{Envelope, WorkItem};
use crate::metrics::StageMetrics;
use crate::stage::{Stage, StageProbe, StageState, Wait, CONSUMER};
use std::sync::Arc;
use tracing::{debug, trace};

/// Collects finished items in arrival order until the sentinel
pub struct ConsumerStage {
    channels: Arc<ChannelSet>,
    probe: Arc<StageProbe>,
    metrics: StageMetrics,
}

impl ConsumerStage {
    pub fn new(channels: Arc<ChannelSet>, metrics: StageMetrics) -> Self {
        Self {
            channels,
            probe: StageProbe::new(CONSUMER),
            metrics,
        }
    }
}

impl Stage for ConsumerStage {
    type Output = Vec<WorkItem>;

    fn name(&self) -> &'static str {
        CONSUMER
    }

    fn probe(&self) -> Arc<StageProbe> {
        Arc::clone(&self.probe)
    }

    fn run(self) -> Vec<WorkItem> {
        self.probe.advance(StageState::Running);

        let mut results = Vec::new();
        loop {
            match self
                .probe
                .blocking(Wait::get(OUTPUT_CHANNEL), || self.channels.output.get())
            {
                Envelope::Item(item) => {
                    trace!(id = item.id, "collected item");
                    results.push(item);
                    self.metrics.record_item();
                }
                Envelope::Sentinel => break,
            }
        }

        self.probe.advance(StageState::Draining);
        debug!(collected = results.len(), "consumer finished");
        self.probe.advance(StageState::Done);
        results
    }
}
