//! Process-wide millisecond clock.
//!
//! Deadlines are stored as epoch milliseconds, but "now" is derived from a
//! tokio instant anchored once per process. Under a paused runtime
//! (`#[tokio::test(start_paused = true)]`) the value advances with
//! `tokio::time::advance`, which makes every timing-dependent test
//! deterministic. Outside a runtime the tokio instant falls back to the
//! std monotonic clock, so `now_ms` works anywhere.

use std::sync::LazyLock;

use tokio::time::Instant;

/// One year in milliseconds.
///
/// Numeric deadlines whose magnitude is below this are relative offsets
/// from now; anything larger is an absolute epoch timestamp.
pub const RELATIVE_THRESHOLD_MS: i64 = 365 * 24 * 60 * 60 * 1000;

struct Anchor {
    epoch_ms: i64,
    instant: Instant,
}

static ANCHOR: LazyLock<Anchor> = LazyLock::new(|| Anchor {
    epoch_ms: chrono::Utc::now().timestamp_millis(),
    instant: Instant::now(),
});

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    let elapsed = Instant::now().saturating_duration_since(ANCHOR.instant);
    ANCHOR.epoch_ms + elapsed.as_millis() as i64
}
