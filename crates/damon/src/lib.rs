//! Concrete [`damon_core::AccessCheckOps`] primitives: virtual-address
//! monitoring via a pluggable page-access oracle, and physical-address
//! monitoring via a pluggable reverse mapping.

pub mod physical_address;
pub mod virtual_address;

#[cfg(feature = "record")]
pub mod record;

pub use physical_address::{IdentityReverseMap, PhysicalAddressPrimitive, ReverseMap};
pub use virtual_address::{AddressSpaceSnapshot, PageAccessOracle, VirtualAddressPrimitive};

#[cfg(feature = "record")]
pub use record::{BinaryRecordWriter, RecordSink, RecordingCallbacks};
