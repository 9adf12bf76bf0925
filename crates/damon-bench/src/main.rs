//! Synthetic-workload benchmark: drives a handful of `damon_core::Context`s
//! against a virtual-address primitive backed by a random hot/cold access
//! pattern, and reports how quickly the region partition converges.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use damon::virtual_address::{AddressSpaceSnapshot, PageAccessOracle, VirtualAddressPrimitive};
use damon_core::{manager, AddrRange, Attrs, Context, MIN_REGION};
use log::info;
use rand::Rng;

/// One contiguous mapped span per target, with a configurable fraction of
/// its pages "hot" (always accessed) and the rest cold.
struct SyntheticOracle {
    span: AddrRange,
    hot_pages: Vec<u64>,
    cleared: Mutex<std::collections::HashSet<u64>>,
}

impl SyntheticOracle {
    fn new(span: AddrRange, hot_fraction: f64, rng: &mut impl Rng) -> Self {
        let nr_pages = span.size() / MIN_REGION;
        let nr_hot = ((nr_pages as f64) * hot_fraction) as u64;
        let hot_pages = (0..nr_hot)
            .map(|_| span.start + rng.random_range(0..nr_pages) * MIN_REGION)
            .collect();
        Self {
            span,
            hot_pages,
            cleared: Mutex::new(std::collections::HashSet::new()),
        }
    }
}

impl PageAccessOracle for SyntheticOracle {
    fn snapshot(&self, _target_id: u64) -> AddressSpaceSnapshot {
        vec![self.span]
    }

    fn clear_accessed(&self, _target_id: u64, addr: u64) {
        self.cleared.lock().unwrap().insert(addr);
    }

    fn is_accessed(&self, _target_id: u64, addr: u64) -> bool {
        // A page only reports "accessed" once it's been sampled at least
        // once (mirroring the real accessed-bit lifecycle) and is hot.
        self.cleared.lock().unwrap().contains(&addr) && self.hot_pages.contains(&addr)
    }

    fn is_alive(&self, _target_id: u64) -> bool {
        true
    }
}

struct RunStats {
    target_id: u64,
    nr_regions_over_time: Vec<usize>,
}

fn build_context(target_id: u64, sample_interval_us: u64) -> Result<Context> {
    let mut rng = rand::rng();
    let span = AddrRange::new(0, 64 * 1024 * MIN_REGION);
    let oracle = SyntheticOracle::new(span, 0.1, &mut rng);
    let primitive = VirtualAddressPrimitive::new(oracle);

    let ctx = Context::with_seed(format!("bench-{target_id}"), Box::new(primitive), target_id);
    ctx.set_targets([target_id])?;
    ctx.set_attrs(
        Attrs::default()
            .with_sample_interval(sample_interval_us)?
            .with_aggr_interval(sample_interval_us * 10)
            .with_regions_update_interval(sample_interval_us * 100),
    )?;
    Ok(ctx)
}

fn main() -> Result<()> {
    env_logger::init();

    let nr_contexts = 4u64;
    let duration = Duration::from_millis(500);

    // `manager::start` takes a whole group atomically (it mirrors
    // `damon_start`'s process-wide "one group of kdamonds at a time"
    // rule), so every context that should run concurrently has to be
    // built first and handed to a single `start` call.
    let ctxs: Vec<Context> = (0..nr_contexts)
        .map(|id| build_context(id, 500))
        .collect::<Result<Vec<_>>>()?;

    manager::start(&ctxs)?;

    let start = Instant::now();
    let mut nr_regions_over_time: Vec<Vec<usize>> = vec![Vec::new(); ctxs.len()];
    while start.elapsed() < duration {
        std::thread::sleep(Duration::from_millis(20));
        for (series, ctx) in nr_regions_over_time.iter_mut().zip(&ctxs) {
            series.push(ctx.nr_regions());
        }
    }

    manager::stop(&ctxs)?;

    let results: Vec<RunStats> = ctxs
        .iter()
        .zip(nr_regions_over_time)
        .map(|(ctx, series)| RunStats {
            target_id: ctx.name().rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(0),
            nr_regions_over_time: series,
        })
        .collect();

    for stats in &results {
        let first = stats.nr_regions_over_time.first().copied().unwrap_or(0);
        let last = stats.nr_regions_over_time.last().copied().unwrap_or(0);
        info!(
            "target {}: {} samples, regions {} -> {}",
            stats.target_id,
            stats.nr_regions_over_time.len(),
            first,
            last
        );
    }

    Ok(())
}
