use crate::Context;

/// Observation hooks invoked on the worker thread.
///
/// Every hook returns a `bool`; a `true` return requests that monitoring
/// stop, observed at the top of the next loop iteration (see
/// `crate::worker`). Callbacks may inspect targets and regions without
/// locking — the worker is their sole caller and the sole mutator of that
/// state while running — but must not mutate context attributes.
pub trait CallbackOps: Send {
    /// Called once, after `init_target_regions`, before the first sample.
    fn before_start(&mut self, _ctx: &Context) -> bool {
        false
    }

    /// Called every `sample_interval`, right after `prepare_access_checks`.
    fn after_sampling(&mut self, _ctx: &Context) -> bool {
        false
    }

    /// Called every `aggr_interval`, before the partition engine merges
    /// and before schemes are applied — callbacks see the full
    /// `nr_accesses` counts accumulated over the interval.
    fn after_aggregation(&mut self, _ctx: &Context) -> bool {
        false
    }

    /// Called once, after the worker loop exits but before regions are
    /// destroyed and the primitive is cleaned up.
    fn before_terminate(&mut self, _ctx: &Context) -> bool {
        false
    }
}

/// A [`CallbackOps`] that never requests a stop and observes nothing.
#[derive(Debug, Default)]
pub struct NullCallbacks;

impl CallbackOps for NullCallbacks {}
