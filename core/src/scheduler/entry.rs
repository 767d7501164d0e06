//! Timer entries and deadline normalization.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::clock::{self, RELATIVE_THRESHOLD_MS};

/// Opaque payload handed back to a callback when its timer fires.
pub type TimerData = Arc<dyn Any + Send + Sync>;

/// Boxed one-shot callback. An entry fires at most once per `set`.
pub(crate) type TimerCallback = Box<dyn FnOnce(Option<TimerData>) + Send>;

/// An absolute or relative point in time accepted by the public API.
///
/// Numeric values whose magnitude is below one year are offsets from now;
/// larger values are epoch milliseconds. Date values are always absolute.
#[derive(Debug, Clone, Copy)]
pub enum TimeSpec {
    /// Relative or absolute milliseconds, per the one-year threshold.
    Millis(i64),
    /// An absolute timestamp.
    At(DateTime<Utc>),
}

impl From<i64> for TimeSpec {
    fn from(ms: i64) -> Self {
        Self::Millis(ms)
    }
}

impl From<DateTime<Utc>> for TimeSpec {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::At(dt)
    }
}

impl From<NaiveDateTime> for TimeSpec {
    fn from(dt: NaiveDateTime) -> Self {
        Self::At(dt.and_utc())
    }
}

/// Resolve a caller-supplied time plus millisecond offset into epoch ms.
pub(crate) fn normalize(time: TimeSpec, offset_ms: i64) -> i64 {
    match time {
        TimeSpec::Millis(ms) if ms.abs() < RELATIVE_THRESHOLD_MS => clock::now_ms() + ms + offset_ms,
        TimeSpec::Millis(ms) => ms + offset_ms,
        TimeSpec::At(dt) => dt.timestamp_millis() + offset_ms,
    }
}

/// Options for [`set`](super::Scheduler::set).
#[derive(Default)]
pub struct SetOptions {
    /// Milliseconds added to the normalized deadline.
    pub offset_ms: i64,
    /// Cutoff past which the callback is considered stale and skipped.
    pub expires: Option<TimeSpec>,
    /// Payload passed to the callback when the timer fires.
    pub data: Option<TimerData>,
}

/// Options for [`postpone`](super::Scheduler::postpone).
///
/// Leaving `expires` unset keeps the entry's current expiry.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostponeOptions {
    /// Milliseconds added to the normalized deadline.
    pub offset_ms: i64,
    /// Replacement expiry cutoff.
    pub expires: Option<TimeSpec>,
}

/// One registered deferred callback.
pub(crate) struct TimerEntry {
    pub key: String,
    pub deadline_ms: i64,
    pub expires_ms: Option<i64>,
    pub callback: TimerCallback,
    pub data: Option<TimerData>,
}

/// Introspection snapshot of one pending entry.
#[derive(Debug, Clone, Serialize)]
pub struct TimerInfo {
    pub key: String,
    pub deadline_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_ms: Option<i64>,
}
