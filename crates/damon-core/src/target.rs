use crate::{AddrRange, Region};

/// A monitoring target: an opaque id plus its current region partition.
///
/// `id` is a process handle for virtual-address monitoring and has no
/// meaning to the core itself; interpretation is entirely up to the
/// [`crate::primitive::AccessCheckOps`](crate::primitive::AccessCheckOps)
/// implementation installed on the owning [`crate::Context`](crate::Context).
#[derive(Debug, Clone)]
pub struct Target {
    id: u64,
    regions: Vec<Region>,
}

impl Target {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            regions: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[inline]
    pub fn regions_mut(&mut self) -> &mut Vec<Region> {
        &mut self.regions
    }

    #[inline]
    pub fn nr_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn nth_region(&self, i: usize) -> Option<&Region> {
        self.regions.get(i)
    }

    /// Appends `region` after the current last region.
    ///
    /// # Panics
    /// Panics (an internal invariant violation per §7) if `region` would
    /// overlap or precede the current tail.
    pub fn add_region_tail(&mut self, region: Region) {
        if let Some(tail) = self.regions.last() {
            assert!(
                tail.ar().end <= region.ar().start,
                "add_region_tail: new region {:?} precedes tail {:?}",
                region.ar(),
                tail.ar(),
            );
        }
        self.regions.push(region);
    }

    /// Inserts `region` at position `at`, which must keep the sequence
    /// ordered: `regions[at-1].ar().end <= region.ar().start` and
    /// `region.ar().end <= regions[at].ar().start`.
    pub fn insert_region(&mut self, at: usize, region: Region) {
        debug_assert!(at <= self.regions.len());
        if at > 0 {
            debug_assert!(self.regions[at - 1].ar().end <= region.ar().start);
        }
        if at < self.regions.len() {
            debug_assert!(region.ar().end <= self.regions[at].ar().start);
        }
        self.regions.insert(at, region);
    }

    /// Removes and drops the region at `at`.
    pub fn destroy_region(&mut self, at: usize) -> Region {
        self.regions.remove(at)
    }

    /// Removes every region for which `keep` returns `false`, preserving order.
    pub fn retain_regions(&mut self, mut keep: impl FnMut(&Region) -> bool) {
        self.regions.retain_mut(|r| keep(r));
    }

    /// The union of the target's current regions, as a single `[min, max)`
    /// span, or `None` if it has no regions.
    pub fn covered_span(&self) -> Option<AddrRange> {
        let first = self.regions.first()?.ar();
        let last = self.regions.last()?.ar();
        Some(AddrRange::new(first.start, last.end))
    }

    /// `true` if the region sequence is ordered and pairwise disjoint.
    /// Property-tested by `crate::partition` after every merge/split.
    pub fn is_well_formed(&self) -> bool {
        self.regions
            .windows(2)
            .all(|w| w[0].ar().end <= w[1].ar().start)
    }
}
