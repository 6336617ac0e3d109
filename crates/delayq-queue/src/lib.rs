mod clock;
mod memory;

pub use clock::{Clock, FixedClock, SystemClock};
pub use memory::MemoryQueue;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no queue registered for job class {0}")]
    UnknownClass(String),

    #[error("scheduling {0}s from now is out of range")]
    OutOfRange(i64),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub class: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Job {
    pub fn new(class: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            class: class.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn to_payload(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_payload(payload: &str) -> Result<Self, QueueError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// `None` matches any argument list; `Some` requires the exact ordered list.
    pub fn matches(&self, class: &str, args: Option<&[Value]>) -> bool {
        if self.class != class {
            return false;
        }
        match args {
            Some(expected) => self.args.as_slice() == expected,
            None => true,
        }
    }
}

/// Read-only view of a queue backend: immediate queues plus the delayed
/// structure of timestamp buckets (seconds since the Unix epoch).
///
/// Offsets past the end yield nothing and counts clamp to what is available.
pub trait QueueBackend {
    fn queue_from_class(&self, class: &str) -> Result<String, QueueError>;

    fn queue_size(&self, queue: &str) -> usize;

    fn peek(&self, queue: &str, offset: usize, count: usize) -> Vec<Job>;

    fn delayed_queue_schedule_size(&self) -> usize;

    fn delayed_queue_peek(&self, offset: usize, count: usize) -> Vec<i64>;

    fn delayed_timestamp_size(&self, timestamp: i64) -> usize;

    fn delayed_timestamp_peek(&self, timestamp: i64, offset: usize, count: usize) -> Vec<Job>;
}
