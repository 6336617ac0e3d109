use chrono::{TimeZone, Utc};
use delayq_queue::{FixedClock, Job, MemoryQueue};
use delayq_scheduler::{all_jobs_scheduled_before_or_at, matching_jobs, Cutoff};
use serde_json::json;

fn fixture() -> MemoryQueue {
    let mut queue = MemoryQueue::with_clock(FixedClock::new(Utc.timestamp_opt(0, 0).unwrap()));
    queue.register("SendEmail", "mailers");
    queue.register("Reindex", "search");
    queue
        .enqueue_at(Utc.timestamp_opt(200, 0).unwrap(), "SendEmail", vec![json!("late")])
        .unwrap();
    queue
        .enqueue_at(Utc.timestamp_opt(50, 0).unwrap(), "SendEmail", vec![json!("early")])
        .unwrap();
    queue
        .enqueue_at(Utc.timestamp_opt(50, 0).unwrap(), "Reindex", vec![])
        .unwrap();
    queue
}

#[test]
fn returns_jobs_due_at_or_before_cutoff() {
    let queue = fixture();

    let due = all_jobs_scheduled_before_or_at(&queue, Cutoff::from(100_i64));
    assert_eq!(
        due,
        vec![
            Job::new("SendEmail", vec![json!("early")]),
            Job::new("Reindex", Vec::new()),
        ]
    );

    let due = all_jobs_scheduled_before_or_at(&queue, Cutoff::from(200_i64));
    assert_eq!(due.len(), 3);
    assert_eq!(due[2].args, vec![json!("late")]);
}

#[test]
fn excludes_buckets_after_cutoff() {
    let queue = fixture();
    assert!(all_jobs_scheduled_before_or_at(&queue, Cutoff::from(49_i64)).is_empty());
}

#[test]
fn forever_returns_every_bucket() {
    let queue = fixture();
    assert_eq!(all_jobs_scheduled_before_or_at(&queue, Cutoff::Forever).len(), 3);
}

#[test]
fn empty_backend_yields_nothing() {
    let queue = MemoryQueue::new();
    assert!(all_jobs_scheduled_before_or_at(&queue, Cutoff::Forever).is_empty());
}

#[test]
fn matching_jobs_filters_class_and_args() {
    let queue = fixture();
    let jobs = all_jobs_scheduled_before_or_at(&queue, Cutoff::Forever);

    assert_eq!(matching_jobs(&jobs, "SendEmail", None).len(), 2);
    assert_eq!(matching_jobs(&jobs, "SendEmail", Some(&[json!("late")])).len(), 1);
    assert!(matching_jobs(&jobs, "SendEmail", Some(&[])).is_empty());
    assert_eq!(matching_jobs(&jobs, "Reindex", Some(&[])).len(), 1);
    assert!(matching_jobs(&jobs, "Missing", None).is_empty());
}
