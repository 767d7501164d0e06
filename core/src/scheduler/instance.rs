//! Scheduler instances and the dispatch loop.
//!
//! Each instance owns one deadline heap and at most one armed wake-up: a
//! spawned task sleeping until the earliest deadline, cancelled with
//! [`tokio::task::JoinHandle::abort`] whenever the earliest deadline may
//! have changed. When the wake-up fires, a drain pass pops every entry
//! due within the coalescing window and invokes its callback.
//!
//! Callbacks run outside the state lock, so a callback may freely call
//! `set`, `postpone`, `unset`, `pause`, `resume`, or `clear` on the same
//! instance. Every re-arm advances a generation counter and each drain
//! pass carries the generation it was armed with; a pass that finds its
//! generation stale stops immediately and defers to the wake-up the
//! mutation armed. `abort` alone cannot provide this guarantee: once the
//! armed task is past its sleep it has no await point left to cancel at,
//! so on a multi-thread runtime a concurrent `pause` or `set` would
//! otherwise race an in-flight drain.
//!
//! A panicking callback unwinds out of the drain task before the re-arm
//! step runs, which silently stalls the instance until the next mutating
//! call re-arms it. This mirrors the upstream behavior and is deliberate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::clock;
use crate::config::SchedulerConfig;
use crate::error::TimerError;

use super::entry::{
    PostponeOptions, SetOptions, TimeSpec, TimerCallback, TimerData, TimerEntry, TimerInfo,
    normalize,
};
use super::heap::DeadlineHeap;
use super::registry;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one timer scheduler instance.
///
/// Cloning is cheap and clones refer to the same instance. Instances are
/// registered in the process-wide [registry](super::registry) on
/// construction and stay alive until [`destroy`](Scheduler::destroy).
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    id: u64,
    config: SchedulerConfig,
    runtime: Handle,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    heap: DeadlineHeap,
    paused: bool,
    armed: Option<JoinHandle<()>>,
    /// Advanced on every re-arm; a drain pass whose stamped generation no
    /// longer matches must stop draining.
    generation: u64,
}

impl Scheduler {
    /// Create an instance with default windows.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; use
    /// [`try_new`](Self::try_new) to handle that case.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create an instance with default windows, or report the missing
    /// runtime.
    pub fn try_new() -> Result<Self, TimerError> {
        Self::try_with_config(SchedulerConfig::default())
    }

    /// Create an instance with custom windows.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::try_with_config(config).expect("scheduler requires a running tokio runtime")
    }

    /// Create an instance with custom windows, or report the missing
    /// runtime.
    pub fn try_with_config(config: SchedulerConfig) -> Result<Self, TimerError> {
        let runtime = Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        let scheduler = Self {
            inner: Arc::new(Inner {
                id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
                config,
                runtime,
                state: Mutex::new(State::default()),
            }),
        };
        registry::register(&scheduler);
        Ok(scheduler)
    }

    /// Process-unique id of this instance.
    pub fn instance_id(&self) -> u64 {
        self.inner.id
    }

    /// Create-or-replace the entry for `key`.
    ///
    /// Replacing an existing key updates its deadline, expiry, callback,
    /// and payload in place; the old callback is never invoked.
    pub fn set<F>(
        &self,
        key: impl Into<String>,
        callback: F,
        deadline: impl Into<TimeSpec>,
        options: SetOptions,
    ) where
        F: FnOnce(Option<TimerData>) + Send + 'static,
    {
        let key = key.into();
        let deadline_ms = normalize(deadline.into(), options.offset_ms);
        let expires_ms = options.expires.map(|expires| normalize(expires, 0));
        let callback: TimerCallback = Box::new(callback);
        tracing::trace!(key = %key, deadline_ms, "timer set");

        let mut state = self.inner.state();
        if state.heap.contains(&key) {
            state.heap.update(&key, |entry| {
                entry.deadline_ms = deadline_ms;
                entry.expires_ms = expires_ms;
                entry.callback = callback;
                entry.data = options.data;
            });
        } else {
            state.heap.push(TimerEntry {
                key,
                deadline_ms,
                expires_ms,
                callback,
                data: options.data,
            });
        }
        self.inner.rearm(&mut state);
    }

    /// Move the deadline of an existing entry. Never creates one.
    ///
    /// Returns whether `key` existed. Leaving `expires` unset keeps the
    /// entry's current expiry.
    pub fn postpone(
        &self,
        key: &str,
        deadline: impl Into<TimeSpec>,
        options: PostponeOptions,
    ) -> bool {
        let deadline_ms = normalize(deadline.into(), options.offset_ms);
        let expires_ms = options.expires.map(|expires| normalize(expires, 0));

        let mut state = self.inner.state();
        let existed = state.heap.update(key, |entry| {
            entry.deadline_ms = deadline_ms;
            if expires_ms.is_some() {
                entry.expires_ms = expires_ms;
            }
        });
        if existed {
            tracing::trace!(key = %key, deadline_ms, "timer postponed");
            self.inner.rearm(&mut state);
        }
        existed
    }

    /// Remove the entry for `key`, guaranteeing its callback never runs.
    /// Returns whether it existed.
    pub fn unset(&self, key: &str) -> bool {
        let mut state = self.inner.state();
        let existed = state.heap.remove(key).is_some();
        if existed {
            tracing::trace!(key = %key, "timer unset");
            self.inner.rearm(&mut state);
        }
        existed
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut state = self.inner.state();
        state.heap.clear();
        self.inner.rearm(&mut state);
    }

    /// Disarm the pending wake-up. Entries stay stored but nothing
    /// dispatches until [`resume`](Self::resume).
    pub fn pause(&self) {
        let mut state = self.inner.state();
        state.paused = true;
        self.inner.rearm(&mut state);
    }

    /// Re-enable dispatch; overdue entries fire on the next drain pass.
    pub fn resume(&self) {
        let mut state = self.inner.state();
        state.paused = false;
        self.inner.rearm(&mut state);
    }

    /// Remove every entry and deregister this instance from the live set.
    ///
    /// Lenient policy: the instance is not poisoned. Further calls behave
    /// as on a freshly cleared, unregistered instance and never error.
    pub fn destroy(&self) {
        self.clear();
        registry::deregister(self.inner.id);
        tracing::debug!(instance = self.inner.id, "scheduler destroyed");
    }

    /// Generate a short, time-ordered, probabilistically unique token.
    /// Delegates to [`registry::generate_id`].
    pub fn id(&self, prefix: &str) -> String {
        registry::generate_id(prefix)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.inner.state().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state().heap.is_empty()
    }

    /// Whether an entry for `key` is pending.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.state().heap.contains(key)
    }

    /// Deadline of the earliest pending entry, in epoch milliseconds.
    pub fn next_deadline_ms(&self) -> Option<i64> {
        self.inner.state().heap.peek().map(|entry| entry.deadline_ms)
    }

    /// Snapshot of all pending entries, sorted by deadline.
    pub fn snapshot(&self) -> Vec<TimerInfo> {
        let state = self.inner.state();
        let mut infos: Vec<TimerInfo> = state
            .heap
            .iter()
            .map(|entry| TimerInfo {
                key: entry.key.clone(),
                deadline_ms: entry.deadline_ms,
                expires_ms: entry.expires_ms,
            })
            .collect();
        infos.sort_by_key(|info| info.deadline_ms);
        infos
    }

    /// Re-run the arm decision against current state. Used by the
    /// registry when the process-wide activity flag flips.
    pub(crate) fn rearm(&self) {
        let mut state = self.inner.state();
        self.inner.rearm(&mut state);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("scheduler state lock poisoned")
    }

    /// Cancel the armed wake-up and, if this instance should be running,
    /// arm a new one for the earliest deadline.
    ///
    /// The sleep is clamped to `[0, max_sleep_ms]`: the lower bound fires
    /// overdue entries immediately, the upper bound guarantees the
    /// paused/activity checks are revisited periodically even when the
    /// earliest deadline is far out.
    fn rearm(self: &Arc<Self>, state: &mut State) {
        state.generation = state.generation.wrapping_add(1);
        if let Some(armed) = state.armed.take() {
            armed.abort();
        }
        if state.paused || !registry::is_active() {
            return;
        }
        let Some(top) = state.heap.peek() else {
            return;
        };
        let deadline_ms = top.deadline_ms;
        let generation = state.generation;
        let max_sleep_ms = self.config.max_sleep_ms;

        let inner = Arc::clone(self);
        state.armed = Some(self.runtime.spawn(async move {
            // Computed on the owning runtime so it tracks that runtime's
            // clock, which may be paused under test.
            let delay = (deadline_ms - clock::now_ms()).clamp(0, max_sleep_ms);
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            inner.dispatch(generation);
        }));
    }

    /// One drain pass for the wake-up stamped `generation`: pop and invoke
    /// every entry due within the coalescing window of `now`, skipping
    /// stale ones, then re-arm.
    ///
    /// The generation, paused, and activity checks run under the lock on
    /// every iteration. A concurrent mutation re-arms with a fresh
    /// generation, so this pass stops and the fresh wake-up picks up
    /// whatever is still due.
    fn dispatch(self: &Arc<Self>, generation: u64) {
        let now = clock::now_ms();
        loop {
            let due = {
                let mut state = self.state();
                if state.generation != generation || state.paused || !registry::is_active() {
                    return;
                }
                state.armed = None;
                let due_now = state
                    .heap
                    .peek()
                    .is_some_and(|top| top.deadline_ms <= now + self.config.coalesce_window_ms);
                if due_now { state.heap.pop() } else { None }
            };
            let Some(entry) = due else {
                break;
            };

            let stale = entry
                .expires_ms
                .is_some_and(|expires| now > expires + self.config.stale_grace_ms);
            if stale {
                tracing::debug!(key = %entry.key, "skipping stale timer");
                continue;
            }
            tracing::trace!(key = %entry.key, "dispatching timer");
            (entry.callback)(entry.data);
        }

        let mut state = self.state();
        if state.generation == generation {
            self.rearm(&mut state);
        }
    }
}
