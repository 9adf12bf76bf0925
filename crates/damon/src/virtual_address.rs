//! The virtual-address access-check primitive.
//!
//! This core has no kernel page tables to query, so the two seams a real
//! implementation would fill with `/proc/<pid>/maps` and a page-table
//! accessed-bit probe are modeled as traits: [`PageAccessOracle`] stands
//! in for both. Tests and `damon-bench` supply a synthetic oracle; a real
//! deployment would back one with `process_vm_readv`/`pagemap` or
//! `madvise(MADV_COLD)`-style probing.

use damon_core::{partition, AccessCheckOps, AddrRange, Context, Region, Target, MIN_REGION};

/// A sorted, non-overlapping set of mapped address spans for one target —
/// the user-space stand-in for `/proc/<pid>/maps`.
pub type AddressSpaceSnapshot = Vec<AddrRange>;

/// The virtual-address-space seam a real primitive fills with kernel page
/// table access. All addresses are page-aligned (to [`MIN_REGION`]).
pub trait PageAccessOracle: Send {
    /// The target's current mapped spans, sorted and non-overlapping.
    /// An empty snapshot means the target has nothing mapped yet (or has
    /// exited); the primitive seeds no regions for it in that case.
    fn snapshot(&self, target_id: u64) -> AddressSpaceSnapshot;

    /// Clears the accessed bit for the page containing `addr`.
    fn clear_accessed(&self, target_id: u64, addr: u64);

    /// Reads the accessed bit for the page containing `addr`.
    fn is_accessed(&self, target_id: u64, addr: u64) -> bool;

    /// `true` if `target_id` should still be monitored.
    fn is_alive(&self, target_id: u64) -> bool;
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct PageCache {
    target_id: u64,
    page: u64,
    accessed: bool,
}

/// Drives a [`PageAccessOracle`] the way the kernel drives its page
/// table: seeding the "three big regions" at start, re-synchronizing them
/// every `regions_update_interval`, and sampling one address per region
/// per `sample_interval`.
pub struct VirtualAddressPrimitive<O> {
    oracle: O,
    cache: Option<PageCache>,
}

impl<O: PageAccessOracle> VirtualAddressPrimitive<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle, cache: None }
    }

    fn seed_target(&self, ctx: &Context, target: &mut Target) {
        let snapshot = self.oracle.snapshot(target.id());
        if snapshot.is_empty() {
            return;
        }
        let big = three_big_regions(&snapshot);
        let mid_pieces = ctx.attrs().min_nr_regions().saturating_sub(2).max(1);

        target.add_region_tail(Region::new(big[0].start, big[0].end));
        for piece in even_split(big[1], mid_pieces) {
            target.add_region_tail(Region::new(piece.start, piece.end));
        }
        target.add_region_tail(Region::new(big[2].start, big[2].end));
    }
}

impl<O: PageAccessOracle> AccessCheckOps for VirtualAddressPrimitive<O> {
    fn init_target_regions(&mut self, ctx: &Context) {
        for target in ctx.targets_mut().iter_mut() {
            self.seed_target(ctx, target);
        }
    }

    fn update_target_regions(&mut self, ctx: &Context) {
        for target in ctx.targets_mut().iter_mut() {
            let snapshot = self.oracle.snapshot(target.id());
            if snapshot.is_empty() {
                continue;
            }
            let big = three_big_regions(&snapshot);
            partition::resync_to_big_regions(target, &big);
        }
    }

    fn prepare_access_checks(&mut self, ctx: &Context) {
        self.cache = None;
        for target in ctx.targets_mut().iter_mut() {
            let target_id = target.id();
            for region in target.regions_mut().iter_mut() {
                let addr = ctx.random_address_in(region.ar());
                region.set_sampling_addr(addr);
                let page = AddrRange::align_down(addr, MIN_REGION);
                let already_cleared = matches!(self.cache, Some(c) if c.target_id == target_id && c.page == page);
                if !already_cleared {
                    self.oracle.clear_accessed(target_id, page);
                    self.cache = Some(PageCache {
                        target_id,
                        page,
                        accessed: false,
                    });
                }
            }
        }
    }

    fn check_accesses(&mut self, ctx: &Context) -> u32 {
        self.cache = None;
        let mut max = 0;
        for target in ctx.targets_mut().iter_mut() {
            let target_id = target.id();
            for region in target.regions_mut().iter_mut() {
                let page = AddrRange::align_down(region.sampling_addr(), MIN_REGION);
                let accessed = match self.cache {
                    Some(c) if c.target_id == target_id && c.page == page => c.accessed,
                    _ => {
                        let accessed = self.oracle.is_accessed(target_id, page);
                        self.cache = Some(PageCache {
                            target_id,
                            page,
                            accessed,
                        });
                        accessed
                    }
                };
                if accessed {
                    region.record_access();
                }
                max = max.max(region.nr_accesses());
            }
        }
        max
    }

    fn target_valid(&mut self, target: &Target) -> bool {
        self.oracle.is_alive(target.id())
    }
}

/// Finds the two largest gaps between consecutive mapped spans and uses
/// them to cut `vmas` into three "big regions", per §4.2. Falls back to
/// an even three-way split of the whole mapped span when there are fewer
/// than two gaps to find (a single contiguous mapping, or none at all
/// beyond the first).
fn three_big_regions(vmas: &[AddrRange]) -> [AddrRange; 3] {
    let span = AddrRange::new(vmas.first().unwrap().start, vmas.last().unwrap().end);

    let mut gaps: Vec<AddrRange> = vmas
        .windows(2)
        .filter_map(|w| (w[1].start > w[0].end).then(|| AddrRange::new(w[0].end, w[1].start)))
        .collect();
    gaps.sort_by_key(|g| std::cmp::Reverse(g.size()));

    if gaps.len() < 2 {
        return even_split(span, 3).try_into().unwrap_or_else(|_| {
            let third = AddrRange::align_down(span.size() / 3, MIN_REGION).max(MIN_REGION);
            [
                AddrRange::new(span.start, span.start + third),
                AddrRange::new(span.start + third, span.start + 2 * third),
                AddrRange::new(span.start + 2 * third, span.end),
            ]
        });
    }

    let mut biggest = [gaps[0], gaps[1]];
    biggest.sort_by_key(|g| g.start);
    let [gap_a, gap_b] = biggest;

    [
        AddrRange::new(span.start, gap_a.start),
        AddrRange::new(gap_a.end, gap_b.start),
        AddrRange::new(gap_b.end, span.end),
    ]
}

/// Divides `ar` into `pieces` contiguous, [`MIN_REGION`]-aligned spans of
/// as-even size as alignment allows; any leftover from rounding is folded
/// into the final piece.
fn even_split(ar: AddrRange, pieces: u32) -> Vec<AddrRange> {
    let pieces = pieces.max(1) as u64;
    let step = AddrRange::align_down(ar.size() / pieces, MIN_REGION).max(MIN_REGION);
    let mut out = Vec::new();
    let mut cursor = ar.start;
    for _ in 0..pieces - 1 {
        if cursor + step >= ar.end {
            break;
        }
        out.push(AddrRange::new(cursor, cursor + step));
        cursor += step;
    }
    out.push(AddrRange::new(cursor, ar.end));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_big_regions_picks_the_two_largest_gaps() {
        let vmas = vec![
            AddrRange::new(0, 0x1000),
            AddrRange::new(0x2000, 0x3000),    // gap 0x1000 before this
            AddrRange::new(0x3000, 0x4000),    // no gap
            AddrRange::new(0x10000, 0x11000),  // gap 0xc000 before this (largest)
            AddrRange::new(0x11000, 0x20000),  // no gap
            AddrRange::new(0x21000, 0x22000),  // gap 0x1000 before this
        ];
        let big = three_big_regions(&vmas);
        assert_eq!(big[0], AddrRange::new(0, 0x1000));
        assert_eq!(big[1], AddrRange::new(0x2000, 0x10000));
        assert_eq!(big[2], AddrRange::new(0x11000, 0x22000));
    }

    #[test]
    fn three_big_regions_falls_back_to_even_split_with_one_contiguous_mapping() {
        let vmas = vec![AddrRange::new(0, 0x30000)];
        let big = three_big_regions(&vmas);
        assert_eq!(big[0].start, 0);
        assert_eq!(big[2].end, 0x30000);
        assert!(big[0].size() > 0 && big[1].size() > 0 && big[2].size() > 0);
    }

    #[test]
    fn even_split_merges_remainder_into_last_piece() {
        let pieces = even_split(AddrRange::new(0, 7 * MIN_REGION), 3);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].size(), 2 * MIN_REGION);
        assert_eq!(pieces[1].size(), 2 * MIN_REGION);
        assert_eq!(pieces[2].size(), 3 * MIN_REGION);
    }
}
