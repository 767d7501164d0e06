//! Shared CLI state.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use kairos_core::{Scheduler, SchedulerConfig};

/// Holds the scheduler under interactive control plus fire counters.
/// Lightweight container; logic lives in the scheduler itself.
#[derive(Clone)]
pub struct CliContext {
    pub scheduler: Scheduler,
    /// Total callbacks fired in this session.
    pub fired: Arc<AtomicUsize>,
}

impl CliContext {
    pub fn new() -> Self {
        Self {
            scheduler: Scheduler::with_config(load_config()),
            fired: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for CliContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Read window overrides from the TOML file named by `KAIROS_CONFIG`,
/// falling back to defaults when unset or unreadable.
fn load_config() -> SchedulerConfig {
    let Ok(path) = std::env::var("KAIROS_CONFIG") else {
        return SchedulerConfig::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            eprintln!("ignoring invalid config {path}: {e}");
            SchedulerConfig::default()
        }),
        Err(e) => {
            eprintln!("ignoring unreadable config {path}: {e}");
            SchedulerConfig::default()
        }
    }
}
