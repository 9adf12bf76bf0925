//! Adaptive region-tracking engine for data-access monitoring.
//!
//! A [`Context`] owns a set of [`Target`]s, each partitioned into disjoint
//! address-range [`Region`]s. A worker thread samples each region's
//! access state, periodically merges similar neighbors and splits coarse
//! ones back apart, and evaluates [`Scheme`]s against the result. The
//! actual notion of "address range" and "was this region accessed" is
//! supplied by a pluggable [`AccessCheckOps`] primitive — this crate has
//! no knowledge of virtual memory, page tables, or any other concrete
//! address space.
//!
//! Start and stop one or more contexts together through [`manager`].

mod addr_range;
mod attrs;
mod callbacks;
mod context;
mod error;
pub mod partition;
mod primitive;
mod region;
mod scheme;
mod target;
mod worker;

pub mod manager;

pub use addr_range::{AddrRange, MIN_REGION};
pub use attrs::Attrs;
pub use callbacks::{CallbackOps, NullCallbacks};
pub use context::Context;
pub use error::{Error, Result, MIN_NR_REGIONS_FLOOR};
pub use primitive::{AccessCheckOps, NullPrimitive};
pub use region::Region;
pub use scheme::{Action, Scheme};
pub use target::Target;
