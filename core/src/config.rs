//! Scheduler tuning knobs.

use serde::{Deserialize, Serialize};

/// Dispatch-loop windows, in milliseconds.
///
/// The defaults are the intended production values; overriding them is
/// mainly useful for embedding the scheduler in environments with very
/// different latency expectations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Drain lookahead: entries due within this window of a wake-up are
    /// batched into the same dispatch pass.
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: i64,

    /// Grace period past an entry's expiry within which it still fires.
    #[serde(default = "default_stale_grace_ms")]
    pub stale_grace_ms: i64,

    /// Longest single sleep. Bounds how stale the paused/activity checks
    /// can get when the earliest deadline is far in the future.
    #[serde(default = "default_max_sleep_ms")]
    pub max_sleep_ms: i64,
}

fn default_coalesce_window_ms() -> i64 {
    16
}

fn default_stale_grace_ms() -> i64 {
    100
}

fn default_max_sleep_ms() -> i64 {
    900_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: default_coalesce_window_ms(),
            stale_grace_ms: default_stale_grace_ms(),
            max_sleep_ms: default_max_sleep_ms(),
        }
    }
}
