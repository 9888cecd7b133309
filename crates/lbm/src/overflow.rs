//! Overflow Detection and Resynchronization

use metrics::counter;
use tracing::warn;

use crate::geometry::{LbmGeometry, LbmIndex};

/// Tracks reader overflows against the hardware write pointer.
///
/// Overflow recovery is lossy: everything between the old read cursor and
/// the block boundary behind the write pointer is discarded.
#[derive(Debug, Clone)]
pub struct OverflowGuard {
    geometry: LbmGeometry,
    overflows: u64,
}

impl OverflowGuard {
    /// Create a guard with a zeroed overflow counter
    pub fn new(geometry: LbmGeometry) -> Self {
        Self {
            geometry,
            overflows: 0,
        }
    }

    /// Geometry in use
    pub fn geometry(&self) -> &LbmGeometry {
        &self.geometry
    }

    /// Replace the geometry (e.g. after a depth change); keeps the counter
    pub fn set_geometry(&mut self, geometry: LbmGeometry) {
        self.geometry = geometry;
    }

    /// Pure check, no side effects
    pub fn has_overflowed(&self, write: LbmIndex, read: LbmIndex) -> bool {
        self.geometry.has_overflowed(write, read)
    }

    /// Count one overflow and move `read` to the block boundary behind `write`
    pub fn resync(&mut self, write: LbmIndex, read: &mut LbmIndex) {
        let target = self.geometry.resync_point(write);
        warn!(
            "LBM overflow: write pointer={} read cursor={} -> resync to {}",
            write, read, target
        );
        self.overflows += 1;
        counter!("lbm_overflows_total").increment(1);
        *read = target;
    }

    /// Check and, on overflow, resynchronize. Returns true if data was lost.
    pub fn check_and_resync(&mut self, write: LbmIndex, read: &mut LbmIndex) -> bool {
        if self.has_overflowed(write, *read) {
            self.resync(write, read);
            true
        } else {
            false
        }
    }

    /// Overflows seen since the last reset
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }

    /// Zero the overflow counter (run start)
    pub fn reset_count(&mut self) {
        self.overflows = 0;
    }
}
