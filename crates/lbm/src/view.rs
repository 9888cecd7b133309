//! Read-Only View over Lookback Memory

use std::borrow::Cow;

use crate::error::LbmError;
use crate::geometry::{LbmGeometry, LbmIndex};

/// Borrowed view of the lookback memory, resolving indices through a geometry
#[derive(Debug, Clone, Copy)]
pub struct RingView<'a> {
    geometry: LbmGeometry,
    memory: &'a [u8],
}

impl<'a> RingView<'a> {
    /// Wrap `memory`, which must be exactly the configured capacity
    pub fn new(geometry: LbmGeometry, memory: &'a [u8]) -> Result<Self, LbmError> {
        if memory.len() != geometry.capacity() {
            return Err(LbmError::SizeMismatch {
                expected: geometry.capacity(),
                actual: memory.len(),
            });
        }
        Ok(Self { geometry, memory })
    }

    /// Geometry this view resolves indices with
    pub fn geometry(&self) -> &LbmGeometry {
        &self.geometry
    }

    /// Bytes of the event slot at `index`.
    ///
    /// Borrowed when the slot is contiguous; copied when it straddles the
    /// end of the buffer.
    pub fn event(&self, index: LbmIndex) -> Cow<'a, [u8]> {
        self.bytes(index, self.geometry.event_size() as usize)
    }

    /// `len` bytes starting at `index`, wrapping at the buffer end
    pub fn bytes(&self, index: LbmIndex, len: usize) -> Cow<'a, [u8]> {
        let start = self.geometry.offset(index);
        let end = start + len;
        if end <= self.memory.len() {
            Cow::Borrowed(&self.memory[start..end])
        } else {
            let mut out = Vec::with_capacity(len);
            out.extend_from_slice(&self.memory[start..]);
            out.extend_from_slice(&self.memory[..end - self.memory.len()]);
            Cow::Owned(out)
        }
    }
}
