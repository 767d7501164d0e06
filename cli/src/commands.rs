//! REPL command implementations.

use std::io::Write;
use std::sync::atomic::Ordering;

use chrono::{Local, TimeZone};
use kairos_core::{PostponeOptions, SetOptions, registry};

use crate::CliContext;

pub fn set(ctx: &CliContext, key: &str, delay_ms: i64, offset_ms: i64, expires_ms: Option<i64>) {
    let fired = ctx.fired.clone();
    let announce = key.to_string();
    ctx.scheduler.set(
        key,
        move |_| {
            fired.fetch_add(1, Ordering::Relaxed);
            println!("\n[fired] {announce}");
        },
        delay_ms,
        SetOptions {
            offset_ms,
            expires: expires_ms.map(Into::into),
            data: None,
        },
    );
    println!("set '{key}' to fire in {}ms", delay_ms + offset_ms);
}

pub fn postpone(ctx: &CliContext, key: &str, delay_ms: i64, offset_ms: i64) {
    let existed = ctx.scheduler.postpone(
        key,
        delay_ms,
        PostponeOptions {
            offset_ms,
            expires: None,
        },
    );
    if existed {
        println!("postponed '{key}' by {}ms from now", delay_ms + offset_ms);
    } else {
        println!("no timer '{key}'");
    }
}

pub fn unset(ctx: &CliContext, key: &str) {
    if ctx.scheduler.unset(key) {
        println!("unset '{key}'");
    } else {
        println!("no timer '{key}'");
    }
}

pub fn clear(ctx: &CliContext) {
    ctx.scheduler.clear();
    println!("cleared all timers");
}

pub fn pause(ctx: &CliContext) {
    ctx.scheduler.pause();
    println!("paused");
}

pub fn resume(ctx: &CliContext) {
    ctx.scheduler.resume();
    println!("resumed");
}

pub fn list(ctx: &CliContext, json: bool) {
    let entries = ctx.scheduler.snapshot();
    if json {
        match serde_json::to_string_pretty(&entries) {
            Ok(out) => println!("{out}"),
            Err(e) => println!("serialization error: {e}"),
        }
        return;
    }
    if entries.is_empty() {
        println!("no pending timers");
        return;
    }
    for info in entries {
        match Local.timestamp_millis_opt(info.deadline_ms).single() {
            Some(deadline) => {
                println!("{:<24} {}", info.key, deadline.format("%H:%M:%S%.3f"));
            }
            None => println!("{:<24} {}ms", info.key, info.deadline_ms),
        }
    }
}

pub fn stats(ctx: &CliContext) {
    println!(
        "pending: {}  fired: {}  live instances: {}",
        ctx.scheduler.len(),
        ctx.fired.load(Ordering::Relaxed),
        registry::live_ids().len()
    );
}

pub fn id(ctx: &CliContext, prefix: &str) {
    println!("{}", ctx.scheduler.id(prefix));
}

pub fn active(flag: bool) {
    registry::set_active(flag);
    println!("activity flag set to {flag}");
}

pub fn exit() {
    write!(std::io::stdout(), "quitting...").expect("error exiting");
    std::io::stdout().flush().expect("error flushing stdout");
}
