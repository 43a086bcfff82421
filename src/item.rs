use std::fmt;

/// Control hint carried by a feedback record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suggestion {
    IncreaseRate,
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suggestion::IncreaseRate => f.write_str("increase_rate"),
        }
    }
}

/// Control feedback sent from the transform stage back to the producer
///
/// One record is emitted per transformed item. `metric` is the transform's
/// running count of processed items, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub source_item_id: u64,
    pub suggestion: Suggestion,
    pub metric: u64,
}

/// A unit of work flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: u64,
    pub value: i64,
    /// Feedback drained by the producer just before this item was built
    pub adjustments: Vec<FeedbackRecord>,
    pub processed: bool,
}

impl WorkItem {
    /// Build a fresh, unprocessed item; its value is derived from the id
    pub fn new(id: u64, adjustments: Vec<FeedbackRecord>) -> Self {
        Self {
            id,
            value: initial_value(id),
            adjustments,
            processed: false,
        }
    }
}

/// Value the producer assigns to item `id`
pub fn initial_value(id: u64) -> i64 {
    (id as i64).wrapping_mul(10)
}

/// The transform applied to every item's value
///
/// Total over `i64`: wraps instead of overflowing.
pub fn transform_value(value: i64) -> i64 {
    value.wrapping_mul(2).wrapping_add(1)
}

/// Message carried on the data channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<T> {
    Item(T),
    /// No further items follow on this channel
    Sentinel,
}
