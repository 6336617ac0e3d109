use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use delayq_queue::{Clock, Job, QueueBackend};
use serde_json::Value;
use tracing::debug;

/// Upper time bound for a scan of the delayed structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cutoff {
    At(DateTime<Utc>),
    Forever,
}

impl Cutoff {
    /// Saturates to `Forever` or the earliest instant when out of range.
    pub fn in_seconds(clock: &dyn Clock, seconds: i64) -> Self {
        TimeDelta::try_seconds(seconds)
            .and_then(|delta| clock.now().checked_add_signed(delta))
            .map(Cutoff::At)
            .unwrap_or_else(|| Cutoff::saturated(seconds > 0))
    }

    fn saturated(later: bool) -> Self {
        if later {
            Cutoff::Forever
        } else {
            Cutoff::At(DateTime::<Utc>::MIN_UTC)
        }
    }

    /// Whether a bucket keyed by `timestamp` is due at or before this cutoff.
    pub fn includes(&self, timestamp: i64) -> bool {
        match self {
            Cutoff::At(at) => timestamp <= at.timestamp(),
            Cutoff::Forever => true,
        }
    }
}

impl From<DateTime<Utc>> for Cutoff {
    fn from(at: DateTime<Utc>) -> Self {
        Cutoff::At(at)
    }
}

impl From<SystemTime> for Cutoff {
    fn from(at: SystemTime) -> Self {
        let (later, at) = match at.duration_since(UNIX_EPOCH) {
            Ok(after) => (
                true,
                i64::try_from(after.as_secs())
                    .ok()
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, after.subsec_nanos())),
            ),
            Err(err) => {
                let before = err.duration();
                let at = i64::try_from(before.as_secs()).ok().and_then(|secs| {
                    match before.subsec_nanos() {
                        0 => DateTime::<Utc>::from_timestamp(-secs, 0),
                        nanos => DateTime::<Utc>::from_timestamp(-secs - 1, 1_000_000_000 - nanos),
                    }
                });
                (false, at)
            }
        };
        at.map(Cutoff::At)
            .unwrap_or_else(|| Cutoff::saturated(later))
    }
}

impl From<i64> for Cutoff {
    fn from(timestamp: i64) -> Self {
        DateTime::<Utc>::from_timestamp(timestamp, 0)
            .map(Cutoff::At)
            .unwrap_or_else(|| Cutoff::saturated(timestamp > 0))
    }
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cutoff::At(at) => f.write_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Cutoff::Forever => f.write_str("forever"),
        }
    }
}

/// Every scheduled job whose bucket is due at or before `cutoff`, bucket by
/// bucket in key order, each bucket in enqueue order.
pub fn all_jobs_scheduled_before_or_at<B>(backend: &B, cutoff: Cutoff) -> Vec<Job>
where
    B: QueueBackend + ?Sized,
{
    let timestamps: Vec<i64> = backend
        .delayed_queue_peek(0, backend.delayed_queue_schedule_size())
        .into_iter()
        .filter(|ts| cutoff.includes(*ts))
        .collect();
    debug!(buckets = timestamps.len(), %cutoff, "scanning delayed buckets");

    timestamps
        .into_iter()
        .flat_map(|ts| backend.delayed_timestamp_peek(ts, 0, backend.delayed_timestamp_size(ts)))
        .collect()
}

/// Jobs of `class`; `args` of `None` ignores arguments, `Some` requires the
/// exact ordered list (an empty slice only matches argument-less jobs).
pub fn matching_jobs<'a>(jobs: &'a [Job], class: &str, args: Option<&[Value]>) -> Vec<&'a Job> {
    jobs.iter().filter(|job| job.matches(class, args)).collect()
}
