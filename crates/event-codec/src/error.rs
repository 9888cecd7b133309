//! Codec Error Types

use thiserror::Error;

/// Errors raised while selecting a codec or decoding a slot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Unknown data format {0}")]
    UnknownFormat(u8),

    #[error("Unknown compression mode {0}")]
    UnknownCompression(u8),

    /// Format and compression are individually valid but not together
    #[error("Invalid format/compression combination: format={format} compression={compression}")]
    InvalidCombination { format: u8, compression: u8 },

    /// Road-grade slot without the firmware compression flag
    #[error("Compress bit missing from road-grade hit (time MSB 0x{time_msb:04x})")]
    MissingCompressBit { time_msb: u16 },

    /// Hit size field below the fixed hit header
    #[error("Bad hit size {0}")]
    BadHitSize(u16),

    /// Slot shorter than the record it claims to hold
    #[error("Truncated event: need {need} bytes, slot has {have}")]
    Truncated { need: usize, have: usize },
}
