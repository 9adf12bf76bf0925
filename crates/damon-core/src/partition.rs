//! The adaptive partition engine: merging similar-access neighbors back
//! together, splitting regions to recover resolution, and re-synchronizing
//! a target's regions against a freshly computed "three big regions" map.
//!
//! These are free functions rather than `Context`/`Target` methods because
//! none of them belong to the public controller surface — the worker is
//! their only caller (`crate::worker` invokes [`merge_regions`] and
//! [`split_regions`] every aggregation; a primitive invokes
//! [`resync_to_big_regions`] from `update_target_regions`).

use crate::addr_range::MIN_REGION;
use crate::{AddrRange, Context, Region, Target};

/// Merges adjacent regions of every target whose `nr_accesses` differ by
/// at most `threshold`. `threshold` is `max_nr_accesses / 10` of the cycle
/// just finished, per §4.4.
pub(crate) fn merge_regions(ctx: &Context, threshold: u32) {
    for target in ctx.targets_mut().iter_mut() {
        merge_target(target, threshold);
    }
}

fn merge_target(target: &mut Target, threshold: u32) {
    let regions = target.regions_mut();
    let mut i = 0;
    while i + 1 < regions.len() {
        let cur_ar = regions[i + 1].ar();
        let cur_nr = regions[i + 1].nr_accesses();
        let prev = &regions[i];
        let adjacent = prev.ar().end == cur_ar.start;
        let similar = prev.nr_accesses().abs_diff(cur_nr) <= threshold;
        if adjacent && similar {
            let cur = regions.remove(i + 1);
            let prev = &mut regions[i];
            let prev_sz = prev.size();
            let cur_sz = cur.size();
            let total_sz = prev_sz + cur_sz;
            let merged_nr =
                ((prev.nr_accesses() as u64 * prev_sz + cur.nr_accesses() as u64 * cur_sz) / total_sz) as u32;
            let merged_age =
                ((prev.age() as u64 * prev_sz + cur.age() as u64 * cur_sz) / total_sz) as u32;
            prev.set_nr_accesses(merged_nr);
            prev.set_age(merged_age);
            prev.set_ar(AddrRange::new(prev.ar().start, cur.ar().end));
            // `prev` (still at index i) may now be similar enough to merge
            // with what used to be i+2; re-check the same index.
        } else {
            i += 1;
        }
    }
}

/// Splits every target's regions into `nr_subs` (2, or 3 to escape a
/// stable local minimum) pieces, but only if the total region count
/// across all targets has room to grow — see §4.4.
pub(crate) fn split_regions(ctx: &Context) {
    let max_nr_regions = ctx.attrs().max_nr_regions();
    let total: u32 = ctx.targets().iter().map(|t| t.nr_regions() as u32).sum();

    if total > max_nr_regions / 2 {
        return;
    }

    let mut nr_subs = 2u32;
    if total == ctx.last_nr_regions() && total < max_nr_regions / 3 {
        nr_subs = 3;
    }

    for target in ctx.targets_mut().iter_mut() {
        split_target(ctx, target, nr_subs);
    }
    ctx.set_last_nr_regions(total);
}

fn split_target(ctx: &Context, target: &mut Target, nr_subs: u32) {
    let regions = target.regions_mut();
    let original_count = regions.len();
    let mut pos = 0;

    for _ in 0..original_count {
        if pos >= regions.len() {
            break;
        }
        let mut r_ar = regions[pos].ar();
        let mut extra = 0usize;

        for _ in 0..nr_subs.saturating_sub(1) {
            let size = r_ar.size();
            if size <= 2 * MIN_REGION {
                break;
            }
            let k = ctx.random_split_numerator(); // uniform in [1, 9]
            let sz_left = AddrRange::align_down(k * size / 10, MIN_REGION);
            if sz_left == 0 || sz_left >= size {
                continue;
            }
            let split_at = r_ar.start + sz_left;
            let right = AddrRange::new(split_at, r_ar.end);
            r_ar = AddrRange::new(r_ar.start, split_at);

            regions[pos].set_ar(r_ar);
            regions.insert(pos + 1, Region::new(right.start, right.end));
            extra += 1;
        }
        pos += 1 + extra;
    }
}

/// Re-synchronizes `target`'s regions against a freshly computed "three
/// big regions" partition `big`, per §4.4:
///
/// 1. Any existing region intersecting none of `big` is dropped.
/// 2. For each `bi`, the first and last existing regions that intersect it
///    have their outer edge snapped to `bi`'s edge; inner regions (and any
///    region strictly between two of the `big` spans) are left alone. If
///    nothing intersects `bi`, a fresh region equal to `bi` is inserted in
///    its positional slot.
pub fn resync_to_big_regions(target: &mut Target, big: &[AddrRange; 3]) {
    target.retain_regions(|r| big.iter().any(|b| b.overlaps(&r.ar())));

    for b in big {
        let regions = target.regions_mut();
        let intersecting: Vec<usize> = regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.ar().overlaps(b))
            .map(|(i, _)| i)
            .collect();

        match (intersecting.first(), intersecting.last()) {
            (None, _) => {
                let insert_at = regions.partition_point(|r| r.ar().start < b.start);
                regions.insert(insert_at, Region::new(b.start, b.end));
            }
            (Some(&first), Some(&last)) if first == last => {
                regions[first].set_ar(*b);
            }
            (Some(&first), Some(&last)) => {
                let first_end = regions[first].ar().end;
                regions[first].set_ar(AddrRange::new(b.start, first_end));
                let last_start = regions[last].ar().start;
                regions[last].set_ar(AddrRange::new(last_start, b.end));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::NullPrimitive;

    fn ctx_with(regions: Vec<(u64, u64, u32)>) -> Context {
        let ctx = Context::with_seed("test", Box::new(NullPrimitive), 42);
        ctx.set_targets([1]).unwrap();
        {
            let mut targets = ctx.targets_mut();
            let t = &mut targets[0];
            for (start, end, nr) in regions {
                let mut r = Region::new(start, end);
                r.set_nr_accesses(nr);
                t.add_region_tail(r);
            }
        }
        ctx
    }

    #[test]
    fn s3_merge_weighted_average() {
        let ctx = ctx_with(vec![(0, 0x1000, 10), (0x1000, 0x3000, 12)]);
        merge_regions(&ctx, 5);
        let targets = ctx.targets();
        let regions = targets[0].regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].ar(), AddrRange::new(0, 0x3000));
        assert_eq!(regions[0].nr_accesses(), 11);
    }

    #[test]
    fn merge_skips_dissimilar_neighbors() {
        let ctx = ctx_with(vec![(0, 0x1000, 0), (0x1000, 0x2000, 100)]);
        merge_regions(&ctx, 5);
        assert_eq!(ctx.nr_regions(), 2);
    }

    #[test]
    fn merge_skips_non_adjacent_regions() {
        let ctx = ctx_with(vec![(0, 0x1000, 10), (0x2000, 0x3000, 10)]);
        merge_regions(&ctx, 5);
        assert_eq!(ctx.nr_regions(), 2, "regions with a gap between them never merge");
    }

    #[test]
    fn equal_size_merge_floors_the_average() {
        let ctx = ctx_with(vec![(0, 0x1000, 3), (0x1000, 0x2000, 4)]);
        merge_regions(&ctx, 10);
        assert_eq!(ctx.targets()[0].regions()[0].nr_accesses(), 3);
    }

    #[test]
    fn s4_split_is_gated_by_population() {
        let ctx = ctx_with((0..6).map(|i| (i * 0x1000, (i + 1) * 0x1000, 0)).collect());
        let attrs = crate::Attrs::default().with_region_bounds(3, 10).unwrap();
        ctx.set_attrs(attrs).unwrap();
        split_regions(&ctx);
        assert!(ctx.nr_regions() > 6, "6 <= 10/2, split should run");

        let ctx = ctx_with((0..7).map(|i| (i * 0x1000, (i + 1) * 0x1000, 0)).collect());
        ctx.set_attrs(crate::Attrs::default().with_region_bounds(3, 10).unwrap())
            .unwrap();
        split_regions(&ctx);
        assert_eq!(ctx.nr_regions(), 7, "7 > 10/2, split should be a no-op");
    }

    #[test]
    fn split_respects_min_region_floor() {
        let ctx = ctx_with(vec![(0, 2 * MIN_REGION, 0)]);
        ctx.set_attrs(crate::Attrs::default().with_region_bounds(3, 100).unwrap())
            .unwrap();
        split_regions(&ctx);
        assert_eq!(
            ctx.nr_regions(),
            1,
            "a region of exactly 2*MIN_REGION cannot be split further"
        );
    }

    #[test]
    fn split_never_exceeds_max_nr_regions_after_one_pass() {
        let ctx = ctx_with(vec![(0, 0x10_0000, 0)]);
        let max = 20;
        ctx.set_attrs(crate::Attrs::default().with_region_bounds(3, max).unwrap())
            .unwrap();
        split_regions(&ctx);
        assert!(ctx.nr_regions() as u32 <= max);
    }

    #[test]
    fn s1_three_region_resync_inserts_when_nothing_intersects() {
        let ctx = ctx_with(vec![]);
        let big = [
            AddrRange::new(0, 0x1000),
            AddrRange::new(0x10000, 0x11000),
            AddrRange::new(0x100000, 0x101000),
        ];
        let mut targets = ctx.targets_mut();
        resync_to_big_regions(&mut targets[0], &big);
        let regions = targets[0].regions();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].ar(), big[0]);
        assert_eq!(regions[1].ar(), big[1]);
        assert_eq!(regions[2].ar(), big[2]);
    }

    #[test]
    fn resync_drops_regions_outside_all_big_spans_and_snaps_edges() {
        let ctx = ctx_with(vec![(0x500, 0xb00, 1), (0x5000, 0x5800, 2), (0x50000, 0x50800, 3)]);
        let big = [AddrRange::new(0, 0x1000), AddrRange::new(0x10000, 0x11000), AddrRange::new(0x100000, 0x101000)];
        let mut targets = ctx.targets_mut();
        resync_to_big_regions(&mut targets[0], &big);
        let regions = targets[0].regions();
        // the region at 0x50000 intersects none of `big` and is dropped;
        // the other two have their outer edges snapped to the big span.
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].ar(), AddrRange::new(0, 0x1000));
        assert_eq!(regions[1].ar(), AddrRange::new(0x10000, 0x11000));
    }
}
