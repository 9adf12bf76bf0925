use std::result;

use thiserror::Error;

pub type Result<T, E = Error> = result::Result<T, E>;

/// Error types for damon-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("min_nr_regions ({min}) must be at least {MIN_NR_REGIONS_FLOOR}")]
    MinRegionsTooSmall { min: u32 },

    #[error("max_nr_regions ({max}) must be at least min_nr_regions ({min})")]
    MaxBelowMin { min: u32, max: u32 },

    #[error("sample_interval must be non-zero")]
    ZeroSampleInterval,

    #[error("scheme range is inverted: min {min} > max {max}")]
    InvertedSchemeRange { min: u64, max: u64 },

    #[error("context is currently running; stop it before mutating {what}")]
    ContextRunning { what: &'static str },

    #[error("no monitoring worker is attached to this context")]
    NotRunning,

    #[error("a group of monitoring contexts is already running")]
    Busy,

    #[error("failed to allocate target or region state")]
    NoMemory,

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

/// Lower bound on `min_nr_regions` enforced by [`crate::Attrs`].
pub const MIN_NR_REGIONS_FLOOR: u32 = 3;
