//! Coalescing deferred-callback scheduler.
//!
//! This module provides:
//! - **Entries**: keyed deferred callbacks with normalized deadlines
//! - **Heap**: the deadline-ordered priority structure
//! - **Instances**: the `set`/`postpone`/`unset` lifecycle and the
//!   single-wake-up dispatch loop
//! - **Registry**: process-wide live set, named instances, the global
//!   instance, and the activity flag
//!
//! Each instance arms at most one platform wake-up at a time, no matter
//! how many timers it holds; near-simultaneous deadlines are drained in
//! one coalesced pass.

mod entry;
mod heap;
mod instance;
pub mod registry;

#[cfg(test)]
mod instance_tests;

pub use entry::{PostponeOptions, SetOptions, TimeSpec, TimerData, TimerInfo};
pub use instance::Scheduler;
