//! LBM Error Types

use thiserror::Error;

/// Errors raised while configuring the lookback memory geometry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LbmError {
    /// Size is not a power of two
    #[error("{what} size {size} is not a power of two")]
    NotPowerOfTwo { what: &'static str, size: u32 },

    /// Bit width outside the range the hardware supports
    #[error("{what} width of {bits} bits is outside [{min}, {max}]")]
    BitsOutOfRange {
        what: &'static str,
        bits: u32,
        min: u32,
        max: u32,
    },

    /// Software depth would exceed the physical buffer
    #[error("LBM depth of {depth_bits} bits exceeds physical capacity of {capacity_bits} bits")]
    DepthExceedsCapacity { depth_bits: u32, capacity_bits: u32 },

    /// Backing memory does not match the configured capacity
    #[error("LBM backing memory is {actual} bytes, geometry expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}
