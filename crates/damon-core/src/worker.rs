//! The sampling-loop worker thread body.
//!
//! [`crate::manager::start`] spawns one of these per [`Context`]; it runs
//! until the context's stop flag is set, its primitive rejects every
//! target, or a callback asks it to stop.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::{manager, partition, Context};

/// How often the sleep between samples is chopped up to poll the stop
/// flag. Keeps `stop()` latency bounded without busy-waiting.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Clears the context's worker handle and decrements the global
/// running-context counter on drop, whether `run` returns normally or a
/// hook/primitive panics — so a self-terminating worker never leaves the
/// process-wide count stuck and blocking every future `manager::start`
/// with [`crate::Error::Busy`].
struct ExitGuard<'a>(&'a Context);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_worker();
        manager::dec_running();
    }
}

pub(crate) fn run(ctx: Context) {
    info!(target: "damon_core::worker", "{}: worker starting", ctx.name());
    let _exit_guard = ExitGuard(&ctx);

    ctx.with_primitive(|primitive, ctx| primitive.init_target_regions(ctx));

    let stopped_early = ctx.with_callbacks(|callbacks, ctx| callbacks.before_start(ctx));
    if !stopped_early {
        main_loop(&ctx);
    }

    ctx.with_callbacks(|callbacks, ctx| {
        callbacks.before_terminate(ctx);
    });
    ctx.with_primitive(|primitive, ctx| primitive.cleanup(ctx));
    destroy_all_regions(&ctx);

    info!(target: "damon_core::worker", "{}: worker stopped", ctx.name());
}

/// Drops every target's regions. Part of the worker's own exit sequence,
/// run after `cleanup` and before the handle is cleared.
fn destroy_all_regions(ctx: &Context) {
    for target in ctx.targets_mut().iter_mut() {
        target.regions_mut().clear();
    }
}

fn main_loop(ctx: &Context) {
    loop {
        if stop_requested(ctx) {
            break;
        }
        if !retain_valid_targets(ctx) {
            debug!(target: "damon_core::worker", "{}: no valid targets remain, stopping", ctx.name());
            break;
        }

        ctx.with_primitive(|primitive, ctx| primitive.prepare_access_checks(ctx));

        if ctx.with_callbacks(|callbacks, ctx| callbacks.after_sampling(ctx)) {
            break;
        }

        if sleep_interruptibly(ctx, Duration::from_micros(ctx.attrs().sample_interval())) {
            break;
        }

        let max_nr_accesses = ctx.with_primitive(|primitive, ctx| primitive.check_accesses(ctx));
        trace!(target: "damon_core::worker", "{}: sampled, max_nr_accesses={max_nr_accesses}", ctx.name());

        let now = Instant::now();
        if ctx.aggr_interval_elapsed(now) {
            if ctx.with_callbacks(|callbacks, ctx| callbacks.after_aggregation(ctx)) {
                break;
            }
            aggregate(ctx, max_nr_accesses);
        }

        if ctx.regions_update_interval_elapsed(now) {
            ctx.with_primitive(|primitive, ctx| primitive.update_target_regions(ctx));
        }
    }
}

/// Runs the end-of-aggregation pipeline: merge similar neighbors, apply
/// matching schemes, reset per-interval counters, then split for
/// resolution. Mirrors the kernel's
/// `kdamond_merge_regions` / `kdamond_apply_schemes` / `kdamond_reset_aggregated`
/// / `kdamond_split_regions` sequence.
fn aggregate(ctx: &Context, max_nr_accesses: u32) {
    let threshold = max_nr_accesses / 10;
    partition::merge_regions(ctx, threshold);
    apply_schemes(ctx);
    reset_aggregated(ctx);
    partition::split_regions(ctx);
}

fn apply_schemes(ctx: &Context) {
    // `targets` and `schemes` share one lock (see `Context::with_data_mut`);
    // taking it once for the whole pass avoids a self-deadlock from a
    // second, nested lock attempt.
    ctx.with_data_mut(|targets, schemes| {
        for target in targets.iter() {
            for region in target.regions() {
                for scheme in schemes.iter_mut() {
                    if !scheme.matches(region) {
                        continue;
                    }
                    let applied = ctx.with_primitive(|primitive, ctx| primitive.apply_scheme(ctx, target, region, &*scheme));
                    if applied {
                        scheme.record_match(region);
                    }
                }
            }
        }
    });
}

fn reset_aggregated(ctx: &Context) {
    let divisor = ctx.attrs().age_significance_divisor();
    for target in ctx.targets_mut().iter_mut() {
        for region in target.regions_mut().iter_mut() {
            region.advance_age(divisor);
            region.set_nr_accesses(0);
        }
    }
}

/// Sleeps for `total`, checking the stop flag every [`STOP_POLL_INTERVAL`]
/// so a `stop()` call is noticed promptly instead of after the full sleep.
/// Returns `true` if a stop was observed.
fn sleep_interruptibly(ctx: &Context, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop_requested(ctx) {
            return true;
        }
        let chunk = remaining.min(STOP_POLL_INTERVAL);
        thread::sleep(chunk);
        remaining -= chunk;
    }
    stop_requested(ctx)
}

fn stop_requested(ctx: &Context) -> bool {
    ctx.stop_requested()
}

/// Drops targets whose primitive now reports invalid (e.g. the monitored
/// process exited). Returns `false` if no targets remain.
fn retain_valid_targets(ctx: &Context) -> bool {
    let invalid: Vec<u64> = ctx
        .with_primitive(|primitive, ctx| {
            ctx.targets()
                .iter()
                .filter(|t| !primitive.target_valid(t))
                .map(|t| t.id())
                .collect()
        });
    if !invalid.is_empty() {
        ctx.targets_mut().retain(|t| !invalid.contains(&t.id()));
    }
    !ctx.targets().is_empty()
}
