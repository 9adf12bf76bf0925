use std::sync::Mutex;

use damon_core::{manager, AddrRange, Attrs, Context};
use damon::virtual_address::{AddressSpaceSnapshot, PageAccessOracle, VirtualAddressPrimitive};

/// Three widely spaced mappings, so `init_target_regions` always derives
/// real gaps rather than falling back to an even split.
struct FakeOracle {
    snapshot: AddressSpaceSnapshot,
    accessed: Mutex<std::collections::HashSet<u64>>,
}

impl PageAccessOracle for FakeOracle {
    fn snapshot(&self, _target_id: u64) -> AddressSpaceSnapshot {
        self.snapshot.clone()
    }
    fn clear_accessed(&self, _target_id: u64, addr: u64) {
        self.accessed.lock().unwrap().remove(&addr);
    }
    fn is_accessed(&self, _target_id: u64, addr: u64) -> bool {
        self.accessed.lock().unwrap().contains(&addr)
    }
    fn is_alive(&self, _target_id: u64) -> bool {
        true
    }
}

#[test]
fn s1_seeds_three_big_regions_split_by_min_nr_regions() {
    let oracle = FakeOracle {
        snapshot: vec![
            AddrRange::new(0, 0x1000),
            AddrRange::new(0x100000, 0x101000),
            AddrRange::new(0x200000, 0x201000),
        ],
        accessed: Mutex::new(Default::default()),
    };
    let primitive = VirtualAddressPrimitive::new(oracle);
    let ctx = Context::with_seed("s1", Box::new(primitive), 1);
    ctx.set_targets([1]).unwrap();
    ctx.set_attrs(Attrs::default().with_region_bounds(6, 1000).unwrap()).unwrap();

    manager::start(&[ctx.clone()]).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(15));

    // 1 (first big region) + (min_nr_regions - 2) middle pieces + 1 (last),
    // checked while the worker is still running since `stop` destroys all
    // regions as part of its exit sequence.
    assert_eq!(ctx.nr_regions(), 1 + (6 - 2) + 1);

    manager::stop(&[ctx.clone()]).unwrap();
    assert_eq!(ctx.nr_regions(), 0);
}
