//! Test assertions over a [`QueueBackend`]: whether jobs were queued, and
//! whether delayed jobs were scheduled at or before a given time.

use delayq_queue::{Clock, Job, QueueBackend, QueueError, SystemClock};
use delayq_scheduler::{all_jobs_scheduled_before_or_at, matching_jobs};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use delayq_scheduler::Cutoff;

#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Backend(#[from] QueueError),
}

/// `args` of `None` matches any argument list and `Some(&[])` only jobs
/// queued without arguments. A `message` replaces the default failure text.
pub struct Assertions<'a, B: QueueBackend + ?Sized> {
    backend: &'a B,
    clock: Box<dyn Clock>,
}

impl<'a, B: QueueBackend + ?Sized> Assertions<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[track_caller]
    pub fn assert_queued(&self, class: &str, args: Option<&[Value]>, message: Option<&str>) {
        enforce(self.check_queued(class, args, message));
    }

    #[track_caller]
    pub fn assert_not_queued(&self, class: &str, args: Option<&[Value]>, message: Option<&str>) {
        enforce(self.check_not_queued(class, args, message));
    }

    #[track_caller]
    pub fn assert_queued_at(
        &self,
        cutoff: impl Into<Cutoff>,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) {
        enforce(self.check_queued_at(cutoff, class, args, message));
    }

    #[track_caller]
    pub fn assert_queued_in(
        &self,
        seconds: i64,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) {
        enforce(self.check_queued_in(seconds, class, args, message));
    }

    #[track_caller]
    pub fn assert_not_queued_at(
        &self,
        cutoff: impl Into<Cutoff>,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) {
        enforce(self.check_not_queued_at(cutoff, class, args, message));
    }

    #[track_caller]
    pub fn assert_not_queued_in(
        &self,
        seconds: i64,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) {
        enforce(self.check_not_queued_in(seconds, class, args, message));
    }

    pub fn check_queued(
        &self,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) -> Result<(), AssertionError> {
        let queue = self.backend.queue_from_class(class)?;
        let found = self.is_queued(&queue, class, args);
        debug!(class, queue = %queue, found, "check_queued");
        if found {
            return Ok(());
        }
        Err(failure(message, || {
            Ok(format!(
                "{class} should have been queued in {queue}: {}.",
                self.queue_contents(&queue)?
            ))
        })?)
    }

    pub fn check_not_queued(
        &self,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) -> Result<(), AssertionError> {
        let queue = self.backend.queue_from_class(class)?;
        let found = self.is_queued(&queue, class, args);
        debug!(class, queue = %queue, found, "check_not_queued");
        if !found {
            return Ok(());
        }
        Err(failure(message, || {
            Ok(format!("{class} should not have been queued in {queue}."))
        })?)
    }

    pub fn check_queued_at(
        &self,
        cutoff: impl Into<Cutoff>,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) -> Result<(), AssertionError> {
        let cutoff = cutoff.into();
        let queue = self.backend.queue_from_class(class)?;
        let found = self.in_timestamped_queue(&queue, cutoff, class, args);
        debug!(class, queue = %queue, %cutoff, found, "check_queued_at");
        if found {
            return Ok(());
        }
        Err(failure(message, || {
            Ok(format!(
                "{class} should have been queued in {queue} before {cutoff}: {}.",
                self.queue_contents(&queue)?
            ))
        })?)
    }

    pub fn check_queued_in(
        &self,
        seconds: i64,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) -> Result<(), AssertionError> {
        let cutoff = Cutoff::in_seconds(self.clock.as_ref(), seconds);
        self.check_queued_at(cutoff, class, args, message)
    }

    pub fn check_not_queued_at(
        &self,
        cutoff: impl Into<Cutoff>,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) -> Result<(), AssertionError> {
        let cutoff = cutoff.into();
        let queue = self.backend.queue_from_class(class)?;
        let found = self.in_timestamped_queue(&queue, cutoff, class, args);
        debug!(class, queue = %queue, %cutoff, found, "check_not_queued_at");
        if !found {
            return Ok(());
        }
        Err(failure(message, || {
            Ok(format!(
                "{class} should not have been queued in {queue} before {cutoff}."
            ))
        })?)
    }

    pub fn check_not_queued_in(
        &self,
        seconds: i64,
        class: &str,
        args: Option<&[Value]>,
        message: Option<&str>,
    ) -> Result<(), AssertionError> {
        let cutoff = Cutoff::in_seconds(self.clock.as_ref(), seconds);
        self.check_not_queued_at(cutoff, class, args, message)
    }

    fn in_queue(&self, queue: &str, class: &str, args: Option<&[Value]>) -> bool {
        self.backend
            .peek(queue, 0, self.backend.queue_size(queue))
            .iter()
            .any(|job| job.matches(class, args))
    }

    // A delayed job is still queued, just not due yet.
    fn is_queued(&self, queue: &str, class: &str, args: Option<&[Value]>) -> bool {
        self.in_queue(queue, class, args)
            || self.in_timestamped_queue(queue, Cutoff::Forever, class, args)
    }

    // The delayed structure is not partitioned by queue, so only class and
    // args decide a match.
    fn in_timestamped_queue(
        &self,
        _queue: &str,
        cutoff: Cutoff,
        class: &str,
        args: Option<&[Value]>,
    ) -> bool {
        let jobs = self.all_jobs_scheduled_before_or_at(cutoff);
        !matching_jobs(&jobs, class, args).is_empty()
    }

    fn all_jobs_scheduled_before_or_at(&self, cutoff: Cutoff) -> Vec<Job> {
        all_jobs_scheduled_before_or_at(self.backend, cutoff)
    }

    fn queue_contents(&self, queue: &str) -> Result<String, QueueError> {
        let jobs = self.backend.peek(queue, 0, self.backend.queue_size(queue));
        Ok(serde_json::to_string(&jobs)?)
    }
}

fn failure(
    message: Option<&str>,
    default: impl FnOnce() -> Result<String, QueueError>,
) -> Result<AssertionError, QueueError> {
    let text = match message {
        Some(message) => message.to_string(),
        None => default()?,
    };
    Ok(AssertionError::Failed(text))
}

#[track_caller]
fn enforce(result: Result<(), AssertionError>) {
    if let Err(err) = result {
        panic!("{err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delayq_queue::{FixedClock, MemoryQueue};
    use serde_json::json;

    fn fixture() -> MemoryQueue {
        let mut queue = MemoryQueue::with_clock(FixedClock::new(
            chrono::DateTime::from_timestamp(0, 0).unwrap(),
        ));
        queue.register("SendEmail", "mailers");
        queue
            .enqueue_at(
                chrono::DateTime::from_timestamp(100, 0).unwrap(),
                "SendEmail",
                vec![json!("x")],
            )
            .unwrap();
        queue
    }

    #[test]
    fn timestamped_lookup_ignores_queue_name() {
        let queue = fixture();
        let assertions = Assertions::new(&queue);
        let cutoff = Cutoff::from(100_i64);
        assert!(assertions.in_timestamped_queue("mailers", cutoff, "SendEmail", None));
        assert!(assertions.in_timestamped_queue("elsewhere", cutoff, "SendEmail", None));
    }

    #[test]
    fn is_queued_counts_delayed_jobs_regardless_of_time() {
        let queue = fixture();
        let assertions = Assertions::new(&queue);
        assert!(!assertions.in_queue("mailers", "SendEmail", None));
        assert!(assertions.is_queued("mailers", "SendEmail", Some(&[json!("x")])));
        assert!(!assertions.is_queued("mailers", "SendEmail", Some(&[])));
    }

    #[test]
    fn forever_scan_includes_far_future_buckets() {
        let mut queue = fixture();
        queue
            .enqueue_at(
                chrono::DateTime::from_timestamp(4_000_000_000, 0).unwrap(),
                "SendEmail",
                vec![],
            )
            .unwrap();
        let assertions = Assertions::new(&queue);
        assert_eq!(assertions.all_jobs_scheduled_before_or_at(Cutoff::Forever).len(), 2);
        assert_eq!(
            assertions
                .all_jobs_scheduled_before_or_at(Cutoff::from(100_i64))
                .len(),
            1
        );
    }
}
