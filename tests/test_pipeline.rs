use feedback_pipeline::{
    ChannelStats, PipelineBuilder, RunOutcome, RunReport, Stall, StageState, Wait, WorkItem,
    CONSUMER, PRODUCER, TRANSFORM,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const GENEROUS_TIMEOUT: Duration = Duration::from_secs(30);
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

fn expect_completed(outcome: RunOutcome) -> RunReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::TimedOut(stall) => panic!("pipeline timed out: {:?}", stall.observations),
    }
}

fn expect_timed_out(outcome: RunOutcome) -> Stall {
    match outcome {
        RunOutcome::TimedOut(stall) => stall,
        RunOutcome::Completed(report) => {
            panic!("pipeline completed with {} items", report.results.len())
        }
    }
}

fn channel<'a>(stall: &'a Stall, name: &str) -> &'a ChannelStats {
    stall
        .channels
        .iter()
        .find(|stats| stats.name == name)
        .expect("Channel not reported")
}

fn projection(results: &[WorkItem]) -> Vec<(u64, i64, bool)> {
    results
        .iter()
        .map(|item| (item.id, item.value, item.processed))
        .collect()
}

#[test]
fn test_completes_when_capacities_cover_item_count() {
    let outcome = PipelineBuilder::new()
        .item_count(50)
        .data_channel_capacity(50)
        .feedback_channel_capacity(50)
        .build()
        .expect("Pipeline build failed")
        .run(GENEROUS_TIMEOUT)
        .expect("Pipeline run failed");

    assert!(outcome.stuck_units().is_none());
    let report = expect_completed(outcome);
    assert_eq!(report.results.len(), 50);

    for (expected_id, item) in report.results.iter().enumerate() {
        let original_value = expected_id as i64 * 10;
        assert_eq!(item.id, expected_id as u64);
        assert!(item.processed);
        assert_eq!(item.value, original_value * 2 + 1);
    }
    assert_eq!(report.metrics.consumer.items, 50);
    assert_eq!(report.metrics.transform.feedback_sent, 50);
}

#[test]
fn test_feedback_delivered_exactly_once() {
    let report = expect_completed(
        PipelineBuilder::new()
            .item_count(120)
            .data_channel_capacity(8)
            .feedback_channel_capacity(120)
            .feedback_drain_interval(1)
            .build()
            .expect("Pipeline build failed")
            .run(GENEROUS_TIMEOUT)
            .expect("Pipeline run failed"),
    );

    let mut feedback: Vec<_> = report
        .results
        .iter()
        .flat_map(|item| item.adjustments.iter())
        .chain(report.unattached_feedback.iter())
        .collect();
    feedback.sort_by_key(|record| record.metric);

    let metrics: Vec<u64> = feedback.iter().map(|record| record.metric).collect();
    assert_eq!(metrics, (1..=120).collect::<Vec<_>>());

    // The transform handles items in order, so metric n reports item n - 1
    for record in &feedback {
        assert_eq!(record.source_item_id, record.metric - 1);
    }

    // Feedback attached to an item was emitted for an earlier item
    for item in &report.results {
        for record in &item.adjustments {
            assert!(record.source_item_id < item.id);
        }
    }
    assert_eq!(report.metrics.producer.feedback_received, 120);
}

#[test]
fn test_feedback_received_never_exceeds_sent() {
    let pipeline = PipelineBuilder::new()
        .item_count(2000)
        .data_channel_capacity(4)
        .feedback_channel_capacity(3)
        .feedback_drain_interval(1)
        .build()
        .expect("Pipeline build failed");

    let producer = pipeline.stage_metrics(PRODUCER).expect("Metrics not found").clone();
    let transform = pipeline.stage_metrics(TRANSFORM).expect("Metrics not found").clone();
    let stop = Arc::new(AtomicBool::new(false));

    let sampler = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut last_received = 0;
            let mut samples = 0u64;
            while !stop.load(Ordering::Acquire) {
                // Read the consumer side first: the sender's count only grows
                let received = producer.total_feedback_received();
                let sent = transform.total_feedback_sent();
                assert!(received >= last_received, "received count went backwards");
                assert!(received <= sent, "received {received} but only {sent} sent");
                last_received = received;
                samples += 1;
            }
            samples
        })
    };

    let outcome = pipeline.run(GENEROUS_TIMEOUT).expect("Pipeline run failed");
    stop.store(true, Ordering::Release);
    let samples = sampler.join().expect("Sampler panicked");

    assert!(samples > 0);
    let report = expect_completed(outcome);
    assert_eq!(report.metrics.producer.feedback_received, 2000);
    assert_eq!(report.metrics.transform.feedback_sent, 2000);
}

#[test]
fn test_reproduces_circular_wait_with_defaults() {
    let pipeline = PipelineBuilder::new()
        .item_count(200)
        .data_channel_capacity(10)
        .feedback_channel_capacity(2)
        .build()
        .expect("Pipeline build failed");
    let channels = pipeline.channels();

    let outcome = pipeline.run(STALL_TIMEOUT).expect("Pipeline run failed");
    assert!(outcome.results().is_none());
    assert!(outcome.elapsed() >= STALL_TIMEOUT);

    let expected: BTreeSet<&str> = [PRODUCER, TRANSFORM].into_iter().collect();
    assert_eq!(outcome.stuck_units(), Some(&expected));
    assert!(outcome.summary().starts_with("TIMEOUT"));

    let stall = expect_timed_out(outcome);
    assert!(!stall.stuck.contains(CONSUMER));
    assert!(stall.waiting.contains(CONSUMER));
    assert!(!stall.done_producing);
    assert!(!stall.done_processing);

    for observation in &stall.observations {
        assert_eq!(observation.state, StageState::Running);
        let expected_wait = match observation.name {
            PRODUCER => Wait::put("work"),
            TRANSFORM => Wait::put("feedback"),
            _ => Wait::get("output"),
        };
        assert_eq!(observation.wait, Some(expected_wait));
    }

    let work = channel(&stall, "work");
    let feedback = channel(&stall, "feedback");
    assert_eq!(work.len, work.capacity);
    assert_eq!(feedback.len, feedback.capacity);
    assert_eq!(work.parked_putters, 1);
    assert_eq!(feedback.parked_putters, 1);
    assert_eq!(channel(&stall, "output").len, 0);

    // Everything the transform sent that the producer has not taken is
    // sitting in the feedback channel
    let sent = stall.metrics.transform.feedback_sent;
    let received = stall.metrics.producer.feedback_received;
    assert!(received <= sent);
    assert_eq!(sent - received, channels.feedback.len() as u64);
}

#[test]
fn test_default_timeout_is_used() {
    let outcome = PipelineBuilder::new()
        .run_timeout(Duration::from_millis(300))
        .build()
        .expect("Pipeline build failed")
        .run_with_default_timeout()
        .expect("Pipeline run failed");

    assert!(!outcome.is_completed());
    assert!(outcome.elapsed() >= Duration::from_millis(300));
    assert!(outcome.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_raising_feedback_capacity_resolves_hang() {
    let report = expect_completed(
        PipelineBuilder::new()
            .item_count(200)
            .data_channel_capacity(10)
            .feedback_channel_capacity(200)
            .build()
            .expect("Pipeline build failed")
            .run(GENEROUS_TIMEOUT)
            .expect("Pipeline run failed"),
    );

    assert_eq!(report.results.len(), 200);
    assert_eq!(
        report.results.iter().map(|item| item.id).collect::<Vec<_>>(),
        (0..200).collect::<Vec<_>>()
    );
}

#[test]
fn test_draining_every_item_resolves_hang() {
    let report = expect_completed(
        PipelineBuilder::new()
            .item_count(200)
            .data_channel_capacity(10)
            .feedback_channel_capacity(2)
            .feedback_drain_interval(1)
            .build()
            .expect("Pipeline build failed")
            .run(GENEROUS_TIMEOUT)
            .expect("Pipeline run failed"),
    );

    assert_eq!(report.results.len(), 200);
}

#[test]
fn test_draining_every_item_with_two_feedback_slots_never_hangs() {
    // Single-slot data channels leave no slack at the sentinel put
    for _ in 0..5 {
        let report = expect_completed(
            PipelineBuilder::new()
                .item_count(5000)
                .data_channel_capacity(1)
                .feedback_channel_capacity(2)
                .feedback_drain_interval(1)
                .build()
                .expect("Pipeline build failed")
                .run(GENEROUS_TIMEOUT)
                .expect("Pipeline run failed"),
        );

        assert_eq!(report.results.len(), 5000);
        assert_eq!(report.metrics.producer.feedback_received, 5000);
    }
}

#[test]
fn test_identical_configs_give_identical_results() {
    let run = || {
        expect_completed(
            PipelineBuilder::new()
                .item_count(100)
                .data_channel_capacity(7)
                .feedback_channel_capacity(100)
                .build()
                .expect("Pipeline build failed")
                .run(GENEROUS_TIMEOUT)
                .expect("Pipeline run failed"),
        )
    };

    let first = run();
    let second = run();
    assert_eq!(projection(&first.results), projection(&second.results));
}

#[test]
fn test_zero_items() {
    let outcome = PipelineBuilder::new()
        .item_count(0)
        .data_channel_capacity(1)
        .feedback_channel_capacity(1)
        .build()
        .expect("Pipeline build failed")
        .run(GENEROUS_TIMEOUT)
        .expect("Pipeline run failed");

    assert_eq!(outcome.results(), Some(&[][..]));
    assert!(outcome.elapsed() < Duration::from_secs(5));
    let report = expect_completed(outcome);
    assert!(report.unattached_feedback.is_empty());
}

#[test]
fn test_single_slot_channels_with_matching_feedback() {
    // One slot everywhere but the feedback channel can hold all of it
    let report = expect_completed(
        PipelineBuilder::new()
            .item_count(64)
            .data_channel_capacity(1)
            .feedback_channel_capacity(64)
            .feedback_drain_interval(5)
            .build()
            .expect("Pipeline build failed")
            .run(GENEROUS_TIMEOUT)
            .expect("Pipeline run failed"),
    );

    assert_eq!(report.results.len(), 64);
    assert!(report.results.windows(2).all(|pair| pair[0].id < pair[1].id));
}
