use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tracing::trace;

use crate::{Clock, Job, QueueBackend, QueueError, SystemClock};

/// Process-local queue backend for test fixtures.
pub struct MemoryQueue {
    routes: HashMap<String, String>,
    per_queue: BTreeMap<String, VecDeque<Job>>,
    delayed: BTreeMap<i64, Vec<Job>>,
    clock: Box<dyn Clock>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            routes: HashMap::new(),
            per_queue: BTreeMap::new(),
            delayed: BTreeMap::new(),
            clock: Box::new(clock),
        }
    }

    pub fn register(&mut self, class: &str, queue: &str) {
        self.routes.insert(class.to_string(), queue.to_string());
    }

    pub fn enqueue(&mut self, class: &str, args: Vec<Value>) -> Result<(), QueueError> {
        let queue = self.queue_from_class(class)?;
        trace!(class, queue = %queue, "enqueue");
        self.per_queue
            .entry(queue)
            .or_default()
            .push_back(Job::new(class, args));
        Ok(())
    }

    /// Schedules the job into the bucket of the second containing `at`.
    pub fn enqueue_at(
        &mut self,
        at: DateTime<Utc>,
        class: &str,
        args: Vec<Value>,
    ) -> Result<(), QueueError> {
        let queue = self.queue_from_class(class)?;
        let bucket = at.timestamp();
        trace!(class, queue = %queue, bucket, "enqueue_at");
        self.delayed
            .entry(bucket)
            .or_default()
            .push(Job::new(class, args));
        Ok(())
    }

    pub fn enqueue_in(
        &mut self,
        seconds: i64,
        class: &str,
        args: Vec<Value>,
    ) -> Result<(), QueueError> {
        let at = TimeDelta::try_seconds(seconds)
            .and_then(|delta| self.clock.now().checked_add_signed(delta))
            .ok_or(QueueError::OutOfRange(seconds))?;
        self.enqueue_at(at, class, args)
    }

    pub fn remove_delayed(&mut self, class: &str, args: &[Value]) -> usize {
        let mut removed = 0;
        self.delayed.retain(|_, jobs| {
            let before = jobs.len();
            jobs.retain(|job| !job.matches(class, Some(args)));
            removed += before - jobs.len();
            !jobs.is_empty()
        });
        trace!(class, removed, "remove_delayed");
        removed
    }

    // Class routes survive a reset.
    pub fn reset(&mut self) {
        self.per_queue.clear();
        self.delayed.clear();
    }

    pub fn queues(&self) -> Vec<&str> {
        self.per_queue.keys().map(String::as_str).collect()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueBackend for MemoryQueue {
    fn queue_from_class(&self, class: &str) -> Result<String, QueueError> {
        self.routes
            .get(class)
            .cloned()
            .ok_or_else(|| QueueError::UnknownClass(class.to_string()))
    }

    fn queue_size(&self, queue: &str) -> usize {
        self.per_queue.get(queue).map(VecDeque::len).unwrap_or(0)
    }

    fn peek(&self, queue: &str, offset: usize, count: usize) -> Vec<Job> {
        self.per_queue
            .get(queue)
            .map(|q| q.iter().skip(offset).take(count).cloned().collect())
            .unwrap_or_default()
    }

    fn delayed_queue_schedule_size(&self) -> usize {
        self.delayed.len()
    }

    fn delayed_queue_peek(&self, offset: usize, count: usize) -> Vec<i64> {
        self.delayed.keys().skip(offset).take(count).copied().collect()
    }

    fn delayed_timestamp_size(&self, timestamp: i64) -> usize {
        self.delayed.get(&timestamp).map(Vec::len).unwrap_or(0)
    }

    fn delayed_timestamp_peek(&self, timestamp: i64, offset: usize, count: usize) -> Vec<Job> {
        self.delayed
            .get(&timestamp)
            .map(|jobs| jobs.iter().skip(offset).take(count).cloned().collect())
            .unwrap_or_default()
    }
}
