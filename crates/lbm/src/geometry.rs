//! Ring Index Arithmetic
//!
//! Three address spaces meet here and must not be confused:
//!
//! - the physical buffer (`capacity_mask`), used only to turn an index into
//!   a byte offset,
//! - the hardware write counter (`write_pointer_mask`), which may be wider
//!   than the buffer and is the space all pointer differences live in,
//! - the software depth (`depth_mask`), the largest unread span the reader
//!   tolerates before declaring an overflow.
//!
//! Resynchronization and "is a whole block ready" use a fourth mask, the
//! block mask.

use serde::{Deserialize, Serialize};

use crate::error::LbmError;
use crate::{LBM_BLOCK_SIZE, LBM_EVENT_SIZE, MAX_DEPTH_BITS, MIN_DEPTH_BITS};

/// Position in the lookback memory, in the hardware write-counter space.
///
/// Only [`LbmGeometry`] can move or resolve an index, so raw offsets never
/// leak out of the masking arithmetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LbmIndex(u32);

impl LbmIndex {
    /// Wrap a raw hardware pointer value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw counter value, as the hardware reports it
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for LbmIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

fn bit_mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

fn check_bits(what: &'static str, bits: u32, min: u32, max: u32) -> Result<(), LbmError> {
    if bits < min || bits > max {
        return Err(LbmError::BitsOutOfRange { what, bits, min, max });
    }
    Ok(())
}

/// Masks describing one lookback memory configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbmGeometry {
    capacity_bits: u32,
    capacity_mask: u32,
    write_pointer_mask: u32,
    block_mask: u32,
    depth_mask: u32,
    event_size: u32,
}

impl LbmGeometry {
    /// Create a geometry with the software depth equal to the full buffer.
    ///
    /// `block_size` and `event_size` are in bytes; the block size must be a
    /// power of two no larger than the buffer.
    pub fn new(
        capacity_bits: u32,
        write_pointer_bits: u32,
        block_size: u32,
        event_size: u32,
    ) -> Result<Self, LbmError> {
        check_bits("LBM capacity", capacity_bits, 11, 28)?;
        check_bits("LBM write pointer", write_pointer_bits, capacity_bits, 32)?;
        if !block_size.is_power_of_two() {
            return Err(LbmError::NotPowerOfTwo {
                what: "LBM block",
                size: block_size,
            });
        }
        let capacity_mask = bit_mask(capacity_bits);
        if block_size - 1 > capacity_mask || event_size == 0 || event_size - 1 > capacity_mask {
            return Err(LbmError::BitsOutOfRange {
                what: "LBM block/event",
                bits: block_size.max(event_size).trailing_zeros(),
                min: 0,
                max: capacity_bits,
            });
        }

        Ok(Self {
            capacity_bits,
            capacity_mask,
            write_pointer_mask: bit_mask(write_pointer_bits),
            block_mask: block_size - 1,
            depth_mask: capacity_mask,
            event_size,
        })
    }

    /// Standard domapp geometry: 16 MB buffer, 28-bit counter, 2 KB blocks
    pub fn domapp() -> Self {
        Self {
            capacity_bits: crate::DEFAULT_CAPACITY_BITS,
            capacity_mask: bit_mask(crate::DEFAULT_CAPACITY_BITS),
            write_pointer_mask: bit_mask(crate::DEFAULT_WRITE_POINTER_BITS),
            block_mask: LBM_BLOCK_SIZE - 1,
            depth_mask: bit_mask(crate::DEFAULT_CAPACITY_BITS),
            event_size: LBM_EVENT_SIZE,
        }
    }

    /// Restrict the unread span tolerated before an overflow is declared.
    ///
    /// This bounds the DAQ data rate independently of the physical memory.
    pub fn with_depth_bits(mut self, depth_bits: u32) -> Result<Self, LbmError> {
        check_bits("LBM depth", depth_bits, MIN_DEPTH_BITS, MAX_DEPTH_BITS)?;
        if depth_bits > self.capacity_bits {
            return Err(LbmError::DepthExceedsCapacity {
                depth_bits,
                capacity_bits: self.capacity_bits,
            });
        }
        self.depth_mask = bit_mask(depth_bits);
        Ok(self)
    }

    /// Physical size of the buffer in bytes
    pub fn capacity(&self) -> usize {
        self.capacity_mask as usize + 1
    }

    /// Mask applied when resolving an index to a byte offset
    pub fn capacity_mask(&self) -> u32 {
        self.capacity_mask
    }

    /// Mask of the free-running hardware counter
    pub fn write_pointer_mask(&self) -> u32 {
        self.write_pointer_mask
    }

    /// Alignment mask for resynchronization
    pub fn block_mask(&self) -> u32 {
        self.block_mask
    }

    /// Software depth mask
    pub fn depth_mask(&self) -> u32 {
        self.depth_mask
    }

    /// Stride between events
    pub fn event_size(&self) -> u32 {
        self.event_size
    }

    /// Byte offset of `index` inside the physical buffer
    #[inline]
    pub fn offset(&self, index: LbmIndex) -> usize {
        (index.0 & self.capacity_mask) as usize
    }

    /// Index of the event following `index`.
    ///
    /// Wraps at the write-counter width, not at the buffer size, so the
    /// result stays comparable with the hardware pointer.
    #[inline]
    pub fn advance(&self, index: LbmIndex) -> LbmIndex {
        LbmIndex(index.0.wrapping_add(self.event_size) & self.write_pointer_mask)
    }

    /// Index `n` events after `index`
    pub fn advance_by(&self, index: LbmIndex, n: u32) -> LbmIndex {
        LbmIndex(index.0.wrapping_add(self.event_size.wrapping_mul(n)) & self.write_pointer_mask)
    }

    /// Bytes written by the hardware but not yet consumed
    #[inline]
    pub fn unread(&self, write: LbmIndex, read: LbmIndex) -> u32 {
        write.0.wrapping_sub(read.0) & self.write_pointer_mask
    }

    /// True iff at least one whole block of unread data exists
    #[inline]
    pub fn is_data_available(&self, write: LbmIndex, read: LbmIndex) -> bool {
        self.unread(write, read) & !self.block_mask != 0
    }

    /// True iff the unread span exceeds the software depth.
    ///
    /// A read cursor ahead of the write pointer shows up as a huge unread
    /// span and is reported as an overflow too.
    #[inline]
    pub fn has_overflowed(&self, write: LbmIndex, read: LbmIndex) -> bool {
        self.unread(write, read) > self.depth_mask
    }

    /// Nearest block boundary at or behind `write`
    #[inline]
    pub fn resync_point(&self, write: LbmIndex) -> LbmIndex {
        LbmIndex(write.0 & !self.block_mask & self.write_pointer_mask)
    }
}

impl Default for LbmGeometry {
    fn default() -> Self {
        Self::domapp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> LbmGeometry {
        // 64 KB buffer, 20-bit counter, 2 KB blocks
        LbmGeometry::new(16, 20, 2048, 2048).unwrap()
    }

    #[test]
    fn test_offset_uses_capacity_mask() {
        let g = small();
        assert_eq!(g.offset(LbmIndex::new(0x1_0800)), 0x0800);
        assert_eq!(g.offset(LbmIndex::new(0xF_F800)), 0xF800);
    }

    #[test]
    fn test_advance_wraps_at_write_pointer_width() {
        let g = small();
        let last = LbmIndex::new(0xF_F800);
        assert_eq!(g.advance(last), LbmIndex::new(0));
        // Not at the buffer size
        assert_eq!(g.advance(LbmIndex::new(0xF800)), LbmIndex::new(0x1_0000));
    }

    #[test]
    fn test_partial_block_is_not_available() {
        let g = small();
        let rd = LbmIndex::new(0x800);
        assert!(!g.is_data_available(LbmIndex::new(0x800), rd));
        assert!(!g.is_data_available(LbmIndex::new(0xFFF), rd));
        assert!(g.is_data_available(LbmIndex::new(0x1000), rd));
    }

    #[test]
    fn test_overflow_boundaries() {
        let g = small().with_depth_bits(12).unwrap();
        let mask = g.depth_mask();
        let rd = LbmIndex::new(0);
        assert!(!g.has_overflowed(LbmIndex::new(mask - 1), rd));
        assert!(!g.has_overflowed(LbmIndex::new(mask), rd));
        assert!(g.has_overflowed(LbmIndex::new(mask + 1), rd));
    }

    #[test]
    fn test_read_ahead_of_write_is_overflow() {
        let g = small();
        assert!(!g.has_overflowed(LbmIndex::new(0), LbmIndex::new(0)));
        assert!(g.has_overflowed(LbmIndex::new(0), LbmIndex::new(1)));
    }

    #[test]
    fn test_wrapping_counter_is_not_overflow() {
        let g = small();
        let max = g.write_pointer_mask();
        assert!(!g.has_overflowed(LbmIndex::new(0), LbmIndex::new(max)));
        let half = max / 2;
        assert!(!g.has_overflowed(LbmIndex::new(half), LbmIndex::new(max.wrapping_add(half) & max)));
    }

    #[test]
    fn test_event_after_counter_wrap_is_consumed() {
        // Reader and writer both step past the end of the counter space
        let g = small();
        let max = LbmIndex::new(g.write_pointer_mask());
        let wr = g.advance(max);
        let rd = g.advance(max);
        assert!(!g.is_data_available(wr, rd));
    }

    #[test]
    fn test_resync_point_is_block_aligned() {
        let g = small();
        assert_eq!(g.resync_point(LbmIndex::new(0x1_2345)), LbmIndex::new(0x1_2000));
    }

    #[test]
    fn test_depth_validation() {
        let g = small();
        assert!(g.with_depth_bits(7).is_err());
        assert!(g.with_depth_bits(17).is_err());
        assert!(g.with_depth_bits(16).is_ok());
    }

    #[test]
    fn test_rejects_bad_block_size() {
        assert!(matches!(
            LbmGeometry::new(16, 20, 1000, 2048),
            Err(LbmError::NotPowerOfTwo { .. })
        ));
        assert!(LbmGeometry::new(16, 12, 2048, 2048).is_err());
    }
}
