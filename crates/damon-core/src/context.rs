use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use crate::callbacks::{CallbackOps, NullCallbacks};
use crate::primitive::AccessCheckOps;
use crate::{AddrRange, Attrs, Error, Result, Scheme, Target};

/// A monitoring context: attributes, targets, schemes, the installed
/// primitive and callbacks, and the worker lifecycle state.
///
/// `Context` is a cheap `Arc` handle; clone it freely to share a context
/// between the thread that controls it and the worker thread
/// [`crate::manager::start`](crate::manager::start) spawns for it.
///
/// # Lock order
///
/// Four independent `parking_lot` mutexes guard disjoint parts of the
/// context so the worker can hold one while a hook it calls acquires
/// another without deadlocking itself:
///
/// ```text
/// 1. control    (worker handle, stop flag — see crate::manager)
/// 2. primitive  (the installed AccessCheckOps, taken for the duration of a hook call)
/// 3. callbacks  (the installed CallbackOps, taken for the duration of a hook call)
/// 4. data       (attrs, targets, schemes, clocks, rng)
/// ```
///
/// A caller that needs more than one never holds a lower-numbered lock
/// while acquiring a higher-numbered one. In practice only the worker
/// thread ever holds more than one at a time, and only `data`, briefly,
/// from inside a hook it is already exclusively driving.
#[derive(Clone)]
pub struct Context(pub(crate) Arc<ContextInner>);

pub(crate) struct ContextInner {
    pub(crate) name: String,
    pub(crate) control: Mutex<Control>,
    pub(crate) primitive: Mutex<Box<dyn AccessCheckOps>>,
    pub(crate) callbacks: Mutex<Box<dyn CallbackOps>>,
    data: Mutex<Data>,
}

pub(crate) struct Control {
    worker: Option<JoinHandle<()>>,
    stop_requested: bool,
}

struct Data {
    attrs: Attrs,
    targets: Vec<Target>,
    schemes: Vec<Scheme>,
    last_aggregation: Instant,
    last_regions_update: Instant,
    last_nr_regions: u32,
    rng: StdRng,
}

impl Context {
    /// Creates a new, stopped context with the given primitive installed
    /// and default attributes (see [`Attrs::default`]), seeded from the
    /// process-global entropy source.
    pub fn new(name: impl Into<String>, primitive: Box<dyn AccessCheckOps>) -> Self {
        Self::with_rng(name, primitive, StdRng::from_rng(&mut rand::rng()))
    }

    /// Like [`Context::new`], but seeds the sampling/split-ratio RNG from
    /// `seed` so monitoring decisions are reproducible across runs — handy
    /// for tests and for replaying a recorded trace deterministically.
    pub fn with_seed(name: impl Into<String>, primitive: Box<dyn AccessCheckOps>, seed: u64) -> Self {
        Self::with_rng(name, primitive, StdRng::seed_from_u64(seed))
    }

    fn with_rng(name: impl Into<String>, primitive: Box<dyn AccessCheckOps>, rng: StdRng) -> Self {
        let now = Instant::now();
        Self(Arc::new(ContextInner {
            name: name.into(),
            control: Mutex::new(Control {
                worker: None,
                stop_requested: false,
            }),
            primitive: Mutex::new(primitive),
            callbacks: Mutex::new(Box::new(NullCallbacks)),
            data: Mutex::new(Data {
                attrs: Attrs::default(),
                targets: Vec::new(),
                schemes: Vec::new(),
                last_aggregation: now,
                last_regions_update: now,
                last_nr_regions: 0,
                rng,
            }),
        }))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// `true` if a worker thread is attached and has not yet exited. A
    /// worker that stopped on its own (e.g. because every target went
    /// invalid) is observed here without needing a `manager::stop` call.
    pub fn is_running(&self) -> bool {
        match &self.0.control.lock().worker {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    fn ensure_not_running(&self, what: &'static str) -> Result<()> {
        if self.is_running() {
            return Err(Error::ContextRunning { what });
        }
        Ok(())
    }

    /// Replaces the monitoring targets, destroying the existing ones.
    /// Fails with [`Error::ContextRunning`] if a worker is attached.
    pub fn set_targets(&self, ids: impl IntoIterator<Item = u64>) -> Result<()> {
        self.ensure_not_running("targets")?;
        let mut data = self.0.data.lock();
        data.targets = ids.into_iter().map(Target::new).collect();
        Ok(())
    }

    /// Validates and installs new time/region-count attributes.
    pub fn set_attrs(&self, attrs: Attrs) -> Result<()> {
        self.ensure_not_running("attrs")?;
        self.0.data.lock().attrs = attrs;
        Ok(())
    }

    /// Replaces the scheme list wholesale.
    pub fn set_schemes(&self, schemes: Vec<Scheme>) -> Result<()> {
        self.ensure_not_running("schemes")?;
        self.0.data.lock().schemes = schemes;
        Ok(())
    }

    /// Installs the callback hooks invoked from the worker thread.
    pub fn set_callbacks(&self, callbacks: Box<dyn CallbackOps>) -> Result<()> {
        self.ensure_not_running("callbacks")?;
        *self.0.callbacks.lock() = callbacks;
        Ok(())
    }

    pub fn attrs(&self) -> Attrs {
        self.0.data.lock().attrs
    }

    pub fn targets(&self) -> MappedMutexGuard<'_, [Target]> {
        MutexGuard::map(self.0.data.lock(), |d| d.targets.as_mut_slice())
    }

    pub fn targets_mut(&self) -> MappedMutexGuard<'_, Vec<Target>> {
        MutexGuard::map(self.0.data.lock(), |d| &mut d.targets)
    }

    pub fn schemes(&self) -> MappedMutexGuard<'_, [Scheme]> {
        MutexGuard::map(self.0.data.lock(), |d| d.schemes.as_mut_slice())
    }

    pub fn schemes_mut(&self) -> MappedMutexGuard<'_, Vec<Scheme>> {
        MutexGuard::map(self.0.data.lock(), |d| &mut d.schemes)
    }

    pub fn nr_regions(&self) -> usize {
        self.0.data.lock().targets.iter().map(Target::nr_regions).sum()
    }

    /// A uniformly random address in `ar`, aligned down to the page size —
    /// the core's pseudo-random stream, worker-local by construction since
    /// only the worker thread ever calls this.
    pub fn random_address_in(&self, ar: AddrRange) -> u64 {
        let mut data = self.0.data.lock();
        ar.start + data.rng.random_range(0..ar.size())
    }

    pub(crate) fn random_split_numerator(&self) -> u64 {
        self.0.data.lock().rng.random_range(1..=9)
    }

    pub(crate) fn aggr_interval_elapsed(&self, now: Instant) -> bool {
        let mut data = self.0.data.lock();
        let elapsed = now.duration_since(data.last_aggregation).as_micros() as u64;
        if elapsed < data.attrs.aggr_interval() {
            return false;
        }
        data.last_aggregation = now;
        true
    }

    pub(crate) fn regions_update_interval_elapsed(&self, now: Instant) -> bool {
        let mut data = self.0.data.lock();
        let elapsed = now.duration_since(data.last_regions_update).as_micros() as u64;
        if elapsed < data.attrs.regions_update_interval() {
            return false;
        }
        data.last_regions_update = now;
        true
    }

    pub(crate) fn last_nr_regions(&self) -> u32 {
        self.0.data.lock().last_nr_regions
    }

    pub(crate) fn set_last_nr_regions(&self, n: u32) {
        self.0.data.lock().last_nr_regions = n;
    }

    /// `true` once `crate::manager::stop` has asked this context's worker
    /// to exit; observed by the worker at the top of its loop and between
    /// sleep chunks.
    pub(crate) fn stop_requested(&self) -> bool {
        self.0.control.lock().stop_requested
    }

    /// Locks `data` once and hands out `targets` and `schemes` together.
    /// Needed wherever a caller must walk targets and match schemes in the
    /// same pass — `targets()` and `schemes()` alone would each take the
    /// same lock, and a nested second call from inside the first's scope
    /// would deadlock.
    pub(crate) fn with_data_mut<R>(&self, f: impl FnOnce(&mut Vec<Target>, &mut Vec<Scheme>) -> R) -> R {
        let mut data = self.0.data.lock();
        f(&mut data.targets, &mut data.schemes)
    }

    /// Calls `f` with the installed primitive, releasing the `primitive`
    /// lock before `f` returns if `f` itself calls back into `self` (hooks
    /// only ever touch `data`, a different lock, so this never deadlocks).
    pub(crate) fn with_primitive<R>(&self, f: impl FnOnce(&mut dyn AccessCheckOps, &Context) -> R) -> R {
        let mut guard = self.0.primitive.lock();
        f(guard.as_mut(), self)
    }

    pub(crate) fn with_callbacks<R>(&self, f: impl FnOnce(&mut dyn CallbackOps, &Context) -> R) -> R {
        let mut guard = self.0.callbacks.lock();
        f(guard.as_mut(), self)
    }

    /// Records the worker thread handle and clears any stale stop request
    /// from a previous run. Called only by `crate::manager::start`.
    pub(crate) fn attach_worker(&self, handle: JoinHandle<()>) {
        let mut control = self.0.control.lock();
        control.worker = Some(handle);
        control.stop_requested = false;
    }

    /// Sets the stop flag if a worker is attached. Returns `false` without
    /// setting anything if this context isn't running. Called only by
    /// `crate::manager::stop`, which then waits for the worker to clear its
    /// own handle rather than joining it directly.
    pub(crate) fn signal_stop(&self) -> bool {
        let mut control = self.0.control.lock();
        if control.worker.is_none() {
            return false;
        }
        control.stop_requested = true;
        true
    }

    /// Clears the worker handle and stop flag. Called by the worker itself
    /// just before its thread function returns (see `crate::worker::run`),
    /// so `is_running()` and a concurrent `manager::stop`'s wait loop both
    /// observe the exit without anyone joining the thread.
    pub(crate) fn finish_worker(&self) {
        let mut control = self.0.control.lock();
        control.worker = None;
        control.stop_requested = false;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.0.name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
