//! The physical-address access-check primitive.
//!
//! A real implementation walks the kernel's physical-to-virtual reverse
//! mapping to find every virtual mapping of a sampled page and clears or
//! reads each one's accessed bit. Here that walk is modeled by
//! [`ReverseMap`]; [`IdentityReverseMap`] is the degenerate case where a
//! target's regions already name the addresses to probe directly, with
//! no remapping involved.

use damon_core::{AccessCheckOps, Context, Target};

/// The physical-to-virtual reverse-mapping seam: given a sampled page,
/// which (target, virtual address) pairs currently back it.
pub trait ReverseMap: Send {
    /// Every virtual address of `target_id` currently backed by `pfn`.
    fn mappings_for(&self, target_id: u64, pfn: u64) -> Vec<u64>;

    /// Clears the accessed bit of the page table entry mapping `vaddr`.
    fn clear_accessed(&self, target_id: u64, vaddr: u64);

    /// Reads the accessed bit of the page table entry mapping `vaddr`.
    fn is_accessed(&self, target_id: u64, vaddr: u64) -> bool;
}

/// The no-remapping reverse map: every target's regions are already
/// expressed in the address space being probed, so a physical page's
/// only "virtual" mapping is itself.
#[derive(Debug, Default)]
pub struct IdentityReverseMap;

impl ReverseMap for IdentityReverseMap {
    fn mappings_for(&self, _target_id: u64, pfn: u64) -> Vec<u64> {
        vec![pfn]
    }

    fn clear_accessed(&self, _target_id: u64, _vaddr: u64) {}

    fn is_accessed(&self, _target_id: u64, _vaddr: u64) -> bool {
        false
    }
}

/// Drives a [`ReverseMap`] to sample physically addressed regions.
/// `init_target_regions`/`update_target_regions` are no-ops — unlike the
/// virtual-address primitive, physical regions are supplied directly by
/// the caller through [`Context::set_targets`](damon_core::Context::set_targets)
/// and [`Target::add_region_tail`](damon_core::Target::add_region_tail)
/// before the worker starts.
pub struct PhysicalAddressPrimitive<R> {
    reverse_map: R,
}

impl<R: ReverseMap> PhysicalAddressPrimitive<R> {
    pub fn new(reverse_map: R) -> Self {
        Self { reverse_map }
    }
}

impl<R: ReverseMap> AccessCheckOps for PhysicalAddressPrimitive<R> {
    fn prepare_access_checks(&mut self, ctx: &Context) {
        for target in ctx.targets_mut().iter_mut() {
            let target_id = target.id();
            for region in target.regions_mut().iter_mut() {
                let pfn = ctx.random_address_in(region.ar());
                region.set_sampling_addr(pfn);
                for vaddr in self.reverse_map.mappings_for(target_id, pfn) {
                    self.reverse_map.clear_accessed(target_id, vaddr);
                }
            }
        }
    }

    fn check_accesses(&mut self, ctx: &Context) -> u32 {
        let mut max = 0;
        for target in ctx.targets_mut().iter_mut() {
            let target_id = target.id();
            for region in target.regions_mut().iter_mut() {
                let pfn = region.sampling_addr();
                let accessed = self
                    .reverse_map
                    .mappings_for(target_id, pfn)
                    .iter()
                    .any(|&vaddr| self.reverse_map.is_accessed(target_id, vaddr));
                if accessed {
                    region.record_access();
                }
                max = max.max(region.nr_accesses());
            }
        }
        max
    }

    fn target_valid(&mut self, _target: &Target) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use damon_core::{Context, Region};
    use parking_lot::Mutex;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeReverseMap {
        accessed: Mutex<HashSet<(u64, u64)>>,
    }

    impl ReverseMap for FakeReverseMap {
        fn mappings_for(&self, _target_id: u64, pfn: u64) -> Vec<u64> {
            vec![pfn]
        }
        fn clear_accessed(&self, target_id: u64, vaddr: u64) {
            self.accessed.lock().remove(&(target_id, vaddr));
        }
        fn is_accessed(&self, target_id: u64, vaddr: u64) -> bool {
            self.accessed.lock().contains(&(target_id, vaddr))
        }
    }

    #[test]
    fn samples_and_counts_accesses() {
        let reverse_map = FakeReverseMap::default();
        reverse_map.accessed.lock().insert((1, 0x1000));
        let mut primitive = PhysicalAddressPrimitive::new(reverse_map);

        let ctx = Context::with_seed("phys", Box::new(damon_core::NullPrimitive), 1);
        ctx.set_targets([1]).unwrap();
        ctx.targets_mut()[0].add_region_tail(Region::new(0x1000, 0x2000));

        primitive.prepare_access_checks(&ctx);
        let max = primitive.check_accesses(&ctx);
        assert_eq!(max, 1);
    }

    #[test]
    fn identity_reverse_map_never_reports_access() {
        let mut primitive = PhysicalAddressPrimitive::new(IdentityReverseMap);
        let ctx = Context::with_seed("phys", Box::new(damon_core::NullPrimitive), 1);
        ctx.set_targets([1]).unwrap();
        ctx.targets_mut()[0].add_region_tail(Region::new(0, 0x1000));

        primitive.prepare_access_checks(&ctx);
        assert_eq!(primitive.check_accesses(&ctx), 0);
    }
}
