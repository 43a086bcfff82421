use thiserror::Error;

/// Result type for feedback pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running the pipeline
///
/// A timed-out run is not an error: it is reported through
/// [`RunOutcome::TimedOut`](crate::pipeline::RunOutcome::TimedOut).
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid capacity, drain interval or timeout
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A stage thread could not be spawned
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// A stage panicked while running
    #[error("Stage {0} panicked")]
    StagePanicked(&'static str),
}
