//! Lookback Memory (LBM) Ring Buffer
//!
//! The FPGA writes digitized events into a power-of-two sized region and
//! advances a free-running write pointer. This crate provides the index
//! arithmetic used to walk that region from software, plus overflow
//! detection and resynchronization for a reader that fell too far behind.

mod error;
mod geometry;
mod overflow;
mod view;

pub use error::LbmError;
pub use geometry::{LbmGeometry, LbmIndex};
pub use overflow::OverflowGuard;
pub use view::RingView;

/// Block size of the domapp FPGA lookback memory, in bytes
pub const LBM_BLOCK_SIZE: u32 = 2048;

/// Stride between consecutive events in the lookback memory, in bytes
pub const LBM_EVENT_SIZE: u32 = 2048;

/// Default physical capacity: 2^24 bytes
pub const DEFAULT_CAPACITY_BITS: u32 = 24;

/// Default width of the hardware write pointer counter
pub const DEFAULT_WRITE_POINTER_BITS: u32 = 28;

/// Smallest software depth accepted by [`LbmGeometry::with_depth_bits`]
pub const MIN_DEPTH_BITS: u32 = 8;

/// Largest software depth accepted by [`LbmGeometry::with_depth_bits`]
pub const MAX_DEPTH_BITS: u32 = 24;
