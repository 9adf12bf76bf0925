//! Process-wide lifecycle control: starting and stopping groups of
//! [`Context`]s together.
//!
//! Mirrors the kernel's `damon_start`/`damon_stop`: a single global lock
//! (`nr_running_ctxs` in the original) serializes start/stop against each
//! other, but once a context's worker thread is spawned it runs
//! completely independently — stopping one context never blocks on
//! another.

use std::thread;
use std::time::Duration;

use log::info;
use parking_lot::Mutex;

use crate::{worker, Context, Error, Result};

static RUNNING: Mutex<usize> = Mutex::new(0);

/// How often `stop` polls a context's control lock while waiting for its
/// worker to clear its own handle.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Decrements the running-context counter. Called only by a worker thread
/// itself, once, as it finishes (see `crate::worker::run`).
pub(crate) fn dec_running() {
    let mut running = RUNNING.lock();
    *running = running.saturating_sub(1);
}

/// Spawns a worker thread for every context in `ctxs`.
///
/// Refuses with [`Error::Busy`] if any context anywhere in the process is
/// already running — not just within `ctxs` — matching `damon_start`'s
/// process-wide `nr_running_ctxs` check rather than a per-group one. If
/// spawning the underlying OS thread fails partway through the list, the
/// contexts already started are left running; there is no rollback,
/// matching the kernel, which never unwinds a partial `damon_start`.
pub fn start(ctxs: &[Context]) -> Result<()> {
    let mut running = RUNNING.lock();
    if *running != 0 {
        return Err(Error::Busy);
    }
    for ctx in ctxs {
        let handle = spawn_worker(ctx)?;
        ctx.attach_worker(handle);
        *running += 1;
        info!(target: "damon_core::manager", "{}: started", ctx.name());
    }
    Ok(())
}

fn spawn_worker(ctx: &Context) -> Result<thread::JoinHandle<()>> {
    let worker_ctx = ctx.clone();
    thread::Builder::new()
        .name(format!("kdamond.{}", ctx.name()))
        .spawn(move || worker::run(worker_ctx))
        .map_err(|_| Error::NoMemory)
}

/// Requests every running context in `ctxs` to stop and waits for each
/// worker to clear its own handle before returning.
///
/// Contexts that are not running are skipped. Returns [`Error::NotRunning`]
/// only if none of `ctxs` were running at all — matching the "busy" style
/// check a caller can use to tell a genuine no-op apart from stopping a
/// group that was already partially stopped by something else.
pub fn stop(ctxs: &[Context]) -> Result<()> {
    let mut any = false;
    for ctx in ctxs {
        if !ctx.signal_stop() {
            continue;
        }
        any = true;
        while ctx.is_running() {
            thread::sleep(STOP_POLL_INTERVAL);
        }
        info!(target: "damon_core::manager", "{}: stopped", ctx.name());
    }
    if !any {
        return Err(Error::NotRunning);
    }
    Ok(())
}

/// Number of contexts currently running across the whole process.
pub fn nr_running() -> usize {
    *RUNNING.lock()
}
