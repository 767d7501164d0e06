//! Tests for scheduler dispatch behavior.
//!
//! All timing runs under tokio's paused clock (`start_paused = true`), so
//! deadlines, coalescing, and staleness are exercised deterministically:
//! `clock::now_ms` is anchored to the tokio instant and advances with
//! virtual time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::Duration;

use crate::clock;
use crate::scheduler::registry;

use super::{PostponeOptions, Scheduler, SetOptions};

/// Register a counting callback under `key`, due in `delay_ms`.
fn fire_counter(scheduler: &Scheduler, key: &str, delay_ms: i64) -> Arc<AtomicUsize> {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    scheduler.set(
        key,
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        delay_ms,
        SetOptions::default(),
    );
    fired
}

/// Advance virtual time by `ms` and give spawned drain tasks a chance to
/// finish.
async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn fires_at_deadline_within_coalescing_window() {
    let scheduler = Scheduler::new();
    let fired_at = Arc::new(Mutex::new(None));

    let set_at = clock::now_ms();
    let slot = Arc::clone(&fired_at);
    scheduler.set(
        "k",
        move |_| {
            *slot.lock().unwrap() = Some(clock::now_ms());
        },
        100,
        SetOptions::default(),
    );

    settle(200).await;

    let fired_at = fired_at.lock().unwrap().expect("timer never fired");
    let delta = fired_at - set_at;
    assert!(delta >= 100, "fired {delta}ms after set, before deadline");
    assert!(delta <= 116, "fired {delta}ms after set, outside window");
    assert!(scheduler.is_empty(), "fired entry should be removed");
}

#[tokio::test(start_paused = true)]
async fn near_deadlines_coalesce_into_one_pass_in_order() {
    let scheduler = Scheduler::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    for (key, delay) in [("a", 50), ("b", 55)] {
        let log = Arc::clone(&log);
        scheduler.set(
            key,
            move |_| log.lock().unwrap().push((key, clock::now_ms())),
            delay,
            SetOptions::default(),
        );
    }

    settle(60).await;

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2, "both timers should fire in the same pass");
    assert_eq!(log[0].0, "a");
    assert_eq!(log[1].0, "b");
    // Same drain pass means both saw the same captured instant.
    assert_eq!(log[0].1, log[1].1);
}

#[tokio::test(start_paused = true)]
async fn distant_deadlines_use_separate_passes() {
    let scheduler = Scheduler::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    for (key, delay) in [("a", 50), ("b", 100)] {
        let log = Arc::clone(&log);
        scheduler.set(
            key,
            move |_| log.lock().unwrap().push((key, clock::now_ms())),
            delay,
            SetOptions::default(),
        );
    }

    settle(70).await;
    assert_eq!(log.lock().unwrap().len(), 1, "b is outside the window of a's pass");

    settle(60).await;
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert!(log[1].1 - log[0].1 >= 34, "b should fire in a later pass");
}

#[tokio::test(start_paused = true)]
async fn stale_entry_past_grace_is_skipped() {
    let scheduler = Scheduler::new();
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    scheduler.set(
        "k",
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        10,
        SetOptions {
            expires: Some(50.into()),
            ..Default::default()
        },
    );
    // Hold dispatch back until well past expiry + grace.
    scheduler.pause();
    settle(151).await;
    scheduler.resume();
    settle(1).await;

    assert_eq!(fired.load(Ordering::SeqCst), 0, "stale callback must be skipped");
    assert!(scheduler.is_empty(), "stale entry is still consumed");
}

#[tokio::test(start_paused = true)]
async fn entry_within_grace_of_expiry_still_fires() {
    let scheduler = Scheduler::new();
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    scheduler.set(
        "k",
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        10,
        SetOptions {
            expires: Some(50.into()),
            ..Default::default()
        },
    );
    scheduler.pause();
    settle(149).await;
    scheduler.resume();
    settle(1).await;

    assert_eq!(fired.load(Ordering::SeqCst), 1, "within grace, callback fires");
}

#[tokio::test(start_paused = true)]
async fn postpone_missing_key_creates_nothing() {
    let scheduler = Scheduler::new();
    assert!(!scheduler.postpone("missing", 100, PostponeOptions::default()));
    assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn postpone_moves_the_deadline() {
    let scheduler = Scheduler::new();
    let fired = fire_counter(&scheduler, "k", 50);

    assert!(scheduler.postpone("k", 150, PostponeOptions::default()));

    settle(100).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0, "old deadline must not fire");

    settle(60).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn set_replaces_entry_without_invoking_old_callback() {
    let scheduler = Scheduler::new();
    let first = fire_counter(&scheduler, "k", 1_000);
    let second = fire_counter(&scheduler, "k", 50);

    assert_eq!(scheduler.len(), 1, "replacement keeps exactly one entry");

    settle(1_100).await;
    assert_eq!(first.load(Ordering::SeqCst), 0, "replaced callback never runs");
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unset_prevents_the_callback() {
    let scheduler = Scheduler::new();
    let fired = fire_counter(&scheduler, "k", 50);

    assert!(scheduler.unset("k"));
    assert!(!scheduler.unset("k"), "second unset reports absence");

    settle(100).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn clear_removes_all_entries() {
    let scheduler = Scheduler::new();
    let a = fire_counter(&scheduler, "a", 50);
    let b = fire_counter(&scheduler, "b", 60);

    scheduler.clear();
    assert!(scheduler.is_empty());

    settle(100).await;
    assert_eq!(a.load(Ordering::SeqCst) + b.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn pause_blocks_dispatch_and_resume_fires_overdue() {
    let scheduler = Scheduler::new();
    let fired = fire_counter(&scheduler, "k", 50);

    scheduler.pause();
    settle(100).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0, "paused instance must not dispatch");

    scheduler.resume();
    settle(1).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1, "overdue entry fires after resume");
}

#[tokio::test(start_paused = true)]
async fn callback_may_set_another_timer_on_the_same_instance() {
    let scheduler = Scheduler::new();
    let chained = Arc::new(AtomicUsize::new(0));

    let handle = scheduler.clone();
    let counter = Arc::clone(&chained);
    scheduler.set(
        "first",
        move |_| {
            let counter = Arc::clone(&counter);
            handle.set(
                "second",
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                30,
                SetOptions::default(),
            );
        },
        50,
        SetOptions::default(),
    );

    settle(100).await;
    assert_eq!(chained.load(Ordering::SeqCst), 1, "chained timer should fire at ~80ms");
}

#[tokio::test(start_paused = true)]
async fn callback_may_unset_a_later_entry_in_the_same_pass() {
    let scheduler = Scheduler::new();
    let cancelled = Arc::new(AtomicUsize::new(0));

    let handle = scheduler.clone();
    scheduler.set(
        "a",
        move |_| {
            handle.unset("b");
        },
        50,
        SetOptions::default(),
    );
    let counter = Arc::clone(&cancelled);
    scheduler.set(
        "b",
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        55,
        SetOptions::default(),
    );

    settle(100).await;
    assert_eq!(
        cancelled.load(Ordering::SeqCst),
        0,
        "entry unset mid-pass must not fire even though it was due"
    );
    assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn callback_pausing_mid_pass_halts_the_drain() {
    let scheduler = Scheduler::new();
    let fired = Arc::new(AtomicUsize::new(0));

    // Both entries are due in the same coalesced pass, but the first
    // callback pauses the instance; the second must stay pending.
    let handle = scheduler.clone();
    scheduler.set(
        "a",
        move |_| {
            handle.pause();
        },
        50,
        SetOptions::default(),
    );
    let counter = Arc::clone(&fired);
    scheduler.set(
        "b",
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        55,
        SetOptions::default(),
    );

    settle(100).await;
    assert_eq!(
        fired.load(Ordering::SeqCst),
        0,
        "pause inside a callback must stop the rest of the pass"
    );
    assert!(scheduler.contains("b"), "undrained entry stays pending");

    scheduler.resume();
    settle(1).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1, "overdue entry fires after resume");
}

#[tokio::test(start_paused = true)]
async fn callback_clearing_mid_pass_drops_due_entries() {
    let scheduler = Scheduler::new();
    let fired = fire_counter(&scheduler, "b", 55);

    let handle = scheduler.clone();
    scheduler.set(
        "a",
        move |_| {
            handle.clear();
        },
        50,
        SetOptions::default(),
    );

    settle(100).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0, "cleared entry must not fire");
    assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn callback_receives_its_payload() {
    let scheduler = Scheduler::new();
    let received = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&received);
    scheduler.set(
        "k",
        move |data| {
            let value = data.and_then(|d| d.downcast::<i32>().ok()).map(|v| *v);
            *slot.lock().unwrap() = value;
        },
        10,
        SetOptions {
            data: Some(Arc::new(42i32)),
            ..Default::default()
        },
    );

    settle(20).await;
    assert_eq!(*received.lock().unwrap(), Some(42));
}

#[tokio::test(start_paused = true)]
async fn far_deadlines_survive_max_sleep_rearm_cycles() {
    let scheduler = Scheduler::new();
    // 2_000_000ms is beyond the 900_000ms sleep cap, so dispatch must
    // wake, find nothing due, and re-arm at least twice.
    let fired = fire_counter(&scheduler, "k", 2_000_000);

    settle(1_900_000).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    settle(200_000).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn snapshot_is_sorted_and_tracks_mutations() {
    let scheduler = Scheduler::new();
    fire_counter(&scheduler, "late", 300);
    fire_counter(&scheduler, "early", 100);
    fire_counter(&scheduler, "middle", 200);

    scheduler.unset("middle");
    assert!(scheduler.postpone("late", 50, PostponeOptions::default()));

    let snapshot = scheduler.snapshot();
    let keys: Vec<&str> = snapshot.iter().map(|info| info.key.as_str()).collect();
    assert_eq!(keys, ["late", "early"]);
    assert_eq!(scheduler.len(), 2);
    assert!(scheduler.contains("early") && !scheduler.contains("middle"));
    assert_eq!(scheduler.next_deadline_ms(), Some(snapshot[0].deadline_ms));
}

#[tokio::test(start_paused = true)]
async fn destroy_removes_instance_from_live_set() {
    let scheduler = Scheduler::new();
    let id = scheduler.instance_id();
    assert!(registry::live_ids().contains(&id));

    scheduler.destroy();
    assert!(!registry::live_ids().contains(&id));
}

#[tokio::test(start_paused = true)]
async fn destroyed_instance_behaves_as_fresh_and_unregistered() {
    let scheduler = Scheduler::new();
    fire_counter(&scheduler, "old", 50);
    scheduler.destroy();
    assert!(scheduler.is_empty(), "destroy clears all entries");

    // Lenient policy: further use works, it is just no longer registered.
    let fired = fire_counter(&scheduler, "k", 20);
    settle(40).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!registry::live_ids().contains(&scheduler.instance_id()));
}

#[tokio::test(start_paused = true)]
async fn named_instances_are_shared_by_name() {
    let a = registry::named("instance-tests-shared");
    let b = registry::named("instance-tests-shared");
    let other = registry::named("instance-tests-other");

    assert_eq!(a.instance_id(), b.instance_id());
    assert_ne!(a.instance_id(), other.instance_id());
}

#[tokio::test(start_paused = true)]
async fn global_instance_is_a_singleton() {
    let a = registry::global();
    let b = registry::global();
    assert_eq!(a.instance_id(), b.instance_id());
}

#[tokio::test(start_paused = true)]
async fn generated_ids_carry_prefix_and_numeric_token() {
    let id = registry::generate_id("timer-");
    assert!(id.starts_with("timer-"));
    let token: i64 = id["timer-".len()..].parse().expect("numeric token");
    assert!(token >= 0);

    let scheduler = Scheduler::new();
    assert!(scheduler.id("x").starts_with('x'));
}
