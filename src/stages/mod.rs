//! The three stages wired together by [`Pipeline`](crate::pipeline::Pipeline).

mod consumer;
mod producer;
mod transform;

pub use consumer::ConsumerStage;
pub use producer::{ProducerOutput, ProducerStage};
pub use transform::TransformStage;
