//! `evhandler stress`: concurrent dispatch against register/deregister churn.
//!
//! Dispatcher threads walk every list in a loop while churn threads keep
//! registering a handler, deregistering it, and flagging it gone.  A handler
//! that runs after its flag is set means a pass outlived `deregister`, which
//! the registry must never allow; such calls are reported as
//! `late_invocations`.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use crossbeam::channel;
use evhandler::{HandlerContext, ListInfo, Registry, RegistryError};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Knobs for one stress run.
#[derive(Debug, Clone)]
pub struct StressOptions {
    pub dispatchers: usize,
    pub churners: usize,
    pub lists: usize,
    pub duration: Duration,
}

/// Outcome of a stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub passes: u64,
    pub invocations: u64,
    pub registrations: u64,
    pub deregistrations: u64,
    /// Registrations refused by a capacity limit.
    pub rejected: u64,
    /// Handler calls observed after their `deregister` returned.  Must be 0.
    pub late_invocations: u64,
    pub elapsed_ms: u128,
    /// List state after the run, before cleanup.
    pub lists: Vec<ListInfo>,
}

/// Per-thread totals, sent back when a worker finishes.
#[derive(Debug, Default)]
struct Tally {
    passes: u64,
    registrations: u64,
    deregistrations: u64,
    rejected: u64,
}

#[derive(Default)]
struct Counters {
    invocations: AtomicU64,
    late: AtomicU64,
}

fn list_name(index: usize) -> String {
    format!("stress.{index}")
}

pub fn run(registry: Registry, opts: &StressOptions) -> Result<StressReport> {
    if opts.lists == 0 || opts.dispatchers == 0 {
        return Err(anyhow!("stress needs at least one list and one dispatcher"));
    }
    let names: Vec<String> = (0..opts.lists).map(list_name).collect();
    let counters = Arc::new(Counters::default());

    // One permanent handler per list keeps every list dispatchable.
    for name in &names {
        let counters = Arc::clone(&counters);
        registry
            .register(
                None,
                name,
                move |_: &HandlerContext, _: &dyn Any| {
                    counters.invocations.fetch_add(1, Ordering::Relaxed);
                },
                HandlerContext::NONE,
                0,
            )
            .with_context(|| format!("failed to seed list {name}"))?;
    }

    info!(
        dispatchers = opts.dispatchers,
        churners = opts.churners,
        lists = opts.lists,
        duration_ms = opts.duration.as_millis() as u64,
        "stress run started"
    );

    let started = Instant::now();
    let deadline = started + opts.duration;
    let (tally_tx, tally_rx) = channel::unbounded::<Tally>();

    crossbeam::scope(|s| {
        for worker in 0..opts.dispatchers {
            let tx = tally_tx.clone();
            let (registry, names) = (&registry, &names);
            s.spawn(move |_| {
                let mut tally = Tally::default();
                let mut i = worker;
                while Instant::now() < deadline {
                    registry.dispatch(&names[i % names.len()], &());
                    tally.passes += 1;
                    i += 1;
                    std::thread::yield_now();
                }
                debug!(worker, passes = tally.passes, "dispatcher finished");
                let _ = tx.send(tally);
            });
        }

        for worker in 0..opts.churners {
            let tx = tally_tx.clone();
            let (registry, names, counters) = (&registry, &names, &counters);
            s.spawn(move |_| {
                let tally = churn(registry, names, counters, worker, deadline);
                debug!(worker, registrations = tally.registrations, "churner finished");
                let _ = tx.send(tally);
            });
        }
    })
    .map_err(|_| anyhow!("a stress worker panicked"))?;
    drop(tally_tx);

    let elapsed = started.elapsed();
    let totals = tally_rx.iter().fold(Tally::default(), |mut acc, t| {
        acc.passes += t.passes;
        acc.registrations += t.registrations;
        acc.deregistrations += t.deregistrations;
        acc.rejected += t.rejected;
        acc
    });
    let lists = registry.snapshot();

    for name in &names {
        registry.deregister(name, None);
    }
    registry.destroy();

    let report = StressReport {
        passes: totals.passes,
        invocations: counters.invocations.load(Ordering::Relaxed),
        registrations: totals.registrations,
        deregistrations: totals.deregistrations,
        rejected: totals.rejected,
        late_invocations: counters.late.load(Ordering::SeqCst),
        elapsed_ms: elapsed.as_millis(),
        lists,
    };
    if report.late_invocations > 0 {
        warn!(late = report.late_invocations, "handlers ran after deregistration");
    }
    info!(
        passes = report.passes,
        invocations = report.invocations,
        "stress run finished"
    );
    Ok(report)
}

fn churn(
    registry: &Registry,
    names: &[String],
    counters: &Arc<Counters>,
    worker: usize,
    deadline: Instant,
) -> Tally {
    let mut tally = Tally::default();
    let mut round = worker;

    while Instant::now() < deadline {
        let name = &names[round % names.len()];
        let priority = (round % 7) as i32 - 3;
        round += 1;

        let gone = Arc::new(AtomicBool::new(false));
        let handler = {
            let gone = Arc::clone(&gone);
            let counters = Arc::clone(counters);
            move |_: &HandlerContext, _: &dyn Any| {
                counters.invocations.fetch_add(1, Ordering::Relaxed);
                if gone.load(Ordering::SeqCst) {
                    counters.late.fetch_add(1, Ordering::SeqCst);
                }
            }
        };

        match registry.register(None, name, handler, HandlerContext::NONE, priority) {
            Ok(tag) => {
                tally.registrations += 1;
                tally.deregistrations += registry.deregister(name, Some(tag)) as u64;
                gone.store(true, Ordering::SeqCst);
            }
            Err(RegistryError::ListFull { .. }) => tally.rejected += 1,
            Err(e) => {
                warn!(error = %e, list = %name, "churn registration failed");
                tally.rejected += 1;
            }
        }
    }
    tally
}

/// Render a report for humans.
pub fn render(report: &StressReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("elapsed           {} ms\n", report.elapsed_ms));
    out.push_str(&format!("dispatch passes   {}\n", report.passes));
    out.push_str(&format!("invocations       {}\n", report.invocations));
    out.push_str(&format!("registrations     {}\n", report.registrations));
    out.push_str(&format!("deregistrations   {}\n", report.deregistrations));
    out.push_str(&format!("rejected          {}\n", report.rejected));
    out.push_str(&format!("late invocations  {}\n", report.late_invocations));
    for list in &report.lists {
        out.push_str(&format!(
            "  {:<12} live={} retired={} run_count={}\n",
            list.name, list.live, list.retired, list.run_count
        ));
    }
    out
}
