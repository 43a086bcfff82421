use crate::channel_set::{FEEDBACK_CHANNEL, OUTPUT_CHANNEL, WORK_CHANNEL};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const PRODUCER: &str = "producer";
pub const TRANSFORM: &str = "transform";
pub const CONSUMER: &str = "consumer";

/// One independently scheduled unit of the pipeline
///
/// A stage owns everything it needs and runs to completion on its own thread.
/// Its only way to interact with the other stages is through the shared
/// channels.
pub trait Stage: Send + 'static {
    /// What the stage hands back to the runner once it is done
    type Output: Send + 'static;

    /// Thread name and the name reported when the stage is stuck
    fn name(&self) -> &'static str;

    /// Probe the runner watches to tell what the stage is doing
    fn probe(&self) -> Arc<StageProbe>;

    fn run(self) -> Self::Output;
}

/// Lifecycle of a stage; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum StageState {
    Idle = 0,
    Running = 1,
    /// Past the sentinel, finishing up
    Draining = 2,
    Done = 3,
}

impl StageState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StageState::Idle,
            1 => StageState::Running,
            2 => StageState::Draining,
            _ => StageState::Done,
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageState::Idle => "idle",
            StageState::Running => "running",
            StageState::Draining => "draining",
            StageState::Done => "done",
        };
        f.write_str(label)
    }
}

/// Which side of a channel operation a stage is inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOp {
    Put,
    Get,
}

/// The blocking channel call a stage is currently inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wait {
    pub op: WaitOp,
    pub channel: &'static str,
}

impl Wait {
    pub fn put(channel: &'static str) -> Self {
        Self { op: WaitOp::Put, channel }
    }

    pub fn get(channel: &'static str) -> Self {
        Self { op: WaitOp::Get, channel }
    }

    const CHANNELS: [&'static str; 3] = [WORK_CHANNEL, OUTPUT_CHANNEL, FEEDBACK_CHANNEL];

    // 0 means "not waiting"; puts take 1..=3, gets 4..=6.
    fn encode(wait: Option<Wait>) -> u8 {
        let Some(wait) = wait else {
            return 0;
        };
        let Some(index) = Self::CHANNELS.iter().position(|c| *c == wait.channel) else {
            return 0;
        };
        let base = match wait.op {
            WaitOp::Put => 1,
            WaitOp::Get => 4,
        };
        base + index as u8
    }

    fn decode(value: u8) -> Option<Wait> {
        match value {
            1..=3 => Some(Wait::put(Self::CHANNELS[(value - 1) as usize])),
            4..=6 => Some(Wait::get(Self::CHANNELS[(value - 4) as usize])),
            _ => None,
        }
    }
}

impl fmt::Display for Wait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            WaitOp::Put => write!(f, "put on {}", self.channel),
            WaitOp::Get => write!(f, "get on {}", self.channel),
        }
    }
}

/// Lock-free view of a stage's lifecycle, written only by that stage
#[derive(Debug)]
pub struct StageProbe {
    name: &'static str,
    state: AtomicU8,
    wait: AtomicU8,
}

impl StageProbe {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: AtomicU8::new(StageState::Idle as u8),
            wait: AtomicU8::new(0),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Move to `next`; going backwards is ignored
    pub fn advance(&self, next: StageState) {
        let prev = self.state.fetch_max(next as u8, Ordering::AcqRel);
        if prev < next as u8 {
            debug!(stage = self.name, from = %StageState::from_u8(prev), to = %next, "stage state");
        }
    }

    pub fn state(&self) -> StageState {
        StageState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Run a blocking channel call, publishing it as the current wait
    pub fn blocking<R>(&self, wait: Wait, call: impl FnOnce() -> R) -> R {
        self.wait.store(Wait::encode(Some(wait)), Ordering::Release);
        let result = call();
        self.wait.store(0, Ordering::Release);
        result
    }

    /// The blocking call the stage is inside right now, if any
    pub fn wait(&self) -> Option<Wait> {
        Wait::decode(self.wait.load(Ordering::Acquire))
    }

    pub fn observe(&self) -> StageObservation {
        StageObservation {
            name: self.name,
            state: self.state(),
            wait: self.wait(),
        }
    }
}

/// What the runner saw a stage doing when it stopped waiting for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageObservation {
    pub name: &'static str,
    pub state: StageState,
    pub wait: Option<Wait>,
}

impl fmt::Display for StageObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.wait {
            Some(wait) => write!(f, "{} ({}, blocked in {})", self.name, self.state, wait),
            None => write!(f, "{} ({})", self.name, self.state),
        }
    }
}
