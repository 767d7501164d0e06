//! Process-wide scheduler registry.
//!
//! Holds the live-instance set, the shared named instances, the lazily
//! created global instance, and the process-wide activity flag. All of it
//! lives for the life of the process; there is no teardown.
//!
//! An application-foreground signal is deliberately not wired up here;
//! [`set_active`] is the seam such an integration would call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard};

use hashbrown::HashMap;

use crate::clock;

use super::instance::Scheduler;

/// Wrap-around modulus for the time component of generated ids (2^37).
const ID_TIME_MODULUS: i64 = 137_438_953_472;

static LIVE: LazyLock<Mutex<HashMap<u64, Scheduler>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));
static NAMED: LazyLock<Mutex<HashMap<String, Scheduler>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));
static GLOBAL: LazyLock<Mutex<Option<Scheduler>>> = LazyLock::new(|| Mutex::new(None));
static ACTIVE: AtomicBool = AtomicBool::new(true);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("registry lock poisoned")
}

/// The instance registered under `name`, created and registered on first
/// lookup. Named instances enable cooperative sharing without handle
/// passing.
pub fn named(name: &str) -> Scheduler {
    let mut named = lock(&NAMED);
    if let Some(scheduler) = named.get(name) {
        return scheduler.clone();
    }
    let scheduler = Scheduler::new();
    named.insert(name.to_string(), scheduler.clone());
    scheduler
}

/// The single lazily-created default instance, shared by callers that do
/// not need isolation.
pub fn global() -> Scheduler {
    lock(&GLOBAL).get_or_insert_with(Scheduler::new).clone()
}

/// `prefix` plus a decimal token combining the current time (modulo 2^37,
/// scaled by 2^16) with a random 16-bit component. Time-ordered but only
/// probabilistically unique; callers needing strict uniqueness must
/// supply their own keys.
pub fn generate_id(prefix: &str) -> String {
    let time_part = clock::now_ms().rem_euclid(ID_TIME_MODULUS);
    let token = time_part * 65_536 + i64::from(rand::random::<u16>());
    format!("{prefix}{token}")
}

/// Whether dispatch is globally enabled.
pub fn is_active() -> bool {
    ACTIVE.load(Ordering::Relaxed)
}

/// Flip the process-wide activity flag and re-run the arm decision on
/// every live instance. While inactive no instance arms wake-ups; stored
/// entries are untouched.
pub fn set_active(active: bool) {
    ACTIVE.store(active, Ordering::Relaxed);
    tracing::debug!(active, "activity flag changed");
    let instances: Vec<Scheduler> = lock(&LIVE).values().cloned().collect();
    for scheduler in instances {
        scheduler.rearm();
    }
}

/// Ids of all live instances, in no particular order.
pub fn live_ids() -> Vec<u64> {
    lock(&LIVE).keys().copied().collect()
}

pub(crate) fn register(scheduler: &Scheduler) {
    lock(&LIVE).insert(scheduler.instance_id(), scheduler.clone());
}

pub(crate) fn deregister(id: u64) {
    lock(&LIVE).remove(&id);
}
