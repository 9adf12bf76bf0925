use crate::{Context, Region, Scheme, Target};

/// Address-space-specific operations the worker drives.
///
/// Every hook is optional; the default implementations are no-ops (for
/// `init_target_regions`/`update_target_regions`/`cleanup`), always-true
/// (`target_valid`), zero (`check_accesses`), or a silent no-op
/// (`apply_scheme`) — matching the kernel's "hook pointer may be null"
/// convention. A primitive only overrides the hooks it actually needs.
///
/// Implementors are boxed as `Box<dyn AccessCheckOps>` on the [`Context`]
/// and driven exclusively from the worker thread; `ctx` is `&Context`
/// rather than `&mut Context` because the context's mutable state lives
/// behind its own lock (see [`Context`]'s "Lock order" docs) — hooks
/// mutate through `ctx.targets_mut()` and friends, not through a borrow
/// of the context itself.
pub trait AccessCheckOps: Send {
    /// Populate each target's region list, once, before the first sample.
    fn init_target_regions(&mut self, _ctx: &Context) {}

    /// Re-synchronize regions against the current address-space map.
    /// Called every `regions_update_interval`.
    fn update_target_regions(&mut self, _ctx: &Context) {}

    /// For each region, choose a new random `sampling_addr` and mark the
    /// sampled page "old". Called every `sample_interval`.
    fn prepare_access_checks(&mut self, _ctx: &Context) {}

    /// For each region, test whether the sampled page is now "young"; if
    /// so, increment `nr_accesses`. Returns the maximum `nr_accesses`
    /// observed across all regions (0 if there are none).
    fn check_accesses(&mut self, _ctx: &Context) -> u32 {
        0
    }

    /// `true` if monitoring should continue for `target`. Targets are
    /// treated as permanently valid when this default is not overridden.
    fn target_valid(&mut self, _target: &Target) -> bool {
        true
    }

    /// Perform the concrete action on `region`'s address range. Returning
    /// `true` counts as a successful application for the scheme's stats.
    ///
    /// Called with the targets/schemes lock already held by the caller;
    /// `ctx` is passed only for naming/logging purposes here, not for
    /// `ctx.targets()`/`ctx.schemes()` access, which would deadlock.
    fn apply_scheme(
        &mut self,
        _ctx: &Context,
        _target: &Target,
        _region: &Region,
        _scheme: &Scheme,
    ) -> bool {
        false
    }

    /// Release primitive-owned state, once, after the worker loop exits.
    fn cleanup(&mut self, _ctx: &Context) {}
}

/// A primitive that does nothing: every target is always valid and no
/// regions are ever seeded. Useful as a placeholder before a real
/// primitive is installed, and in tests that drive the worker by hand.
#[derive(Debug, Default)]
pub struct NullPrimitive;

impl AccessCheckOps for NullPrimitive {}
