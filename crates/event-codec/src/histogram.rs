//! Charge-Stamp Histogram
//!
//! Each compressed hit carries a charge estimate ("charge stamp") in its
//! third header word. Stamps are binned here and the monitoring service
//! periodically takes a snapshot and clears it.

use serde::{Deserialize, Serialize};

use crate::le32;

/// Bins per histogram
pub const HISTOGRAM_BINS: usize = 128;

const LAST_BIN: usize = HISTOGRAM_BINS - 1;

/// Which digitizer the charge stamp comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStampMode {
    /// In-ice: FADC peak sample
    #[default]
    Fadc,
    /// IceTop: integrated ATWD charge
    Atwd,
}

/// The two header words of a hit that carry charge information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeStamp {
    pub word1: u32,
    pub word3: u32,
}

impl ChargeStamp {
    /// Read from the start of a hit record (at least 12 bytes)
    pub fn from_hit(hit: &[u8]) -> Self {
        Self {
            word1: le32(hit, 0),
            word3: le32(hit, 8),
        }
    }

    /// FADC peak count, doubled when the high-range flag is set
    pub fn fadc_peak(&self) -> u32 {
        let peak = (self.word3 >> 9) & 0x1FF;
        if self.word3 & 0x0080_0000 != 0 {
            peak * 2
        } else {
            peak
        }
    }

    pub fn atwd_charge(&self) -> u32 {
        self.word3 & 0x1FFFF
    }

    /// ATWD channel the charge was integrated on (0..=3)
    pub fn atwd_channel(&self) -> usize {
        ((self.word3 >> 17) & 0x3) as usize
    }

    /// ATWD chip, A = 0 or B = 1
    pub fn atwd_chip(&self) -> usize {
        ((self.word1 >> 11) & 0x1) as usize
    }
}

/// Bin contents at one moment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub mode: ChargeStampMode,
    pub prescale: u16,
    pub fadc: [u16; HISTOGRAM_BINS],
    pub fadc_entries: u32,
    /// Indexed `[chip][channel][bin]`
    pub atwd: [[[u16; HISTOGRAM_BINS]; 2]; 2],
    pub atwd_entries: [[u32; 2]; 2],
}

impl HistogramSnapshot {
    fn empty(mode: ChargeStampMode, prescale: u16) -> Self {
        Self {
            mode,
            prescale,
            fadc: [0; HISTOGRAM_BINS],
            fadc_entries: 0,
            atwd: [[[0; HISTOGRAM_BINS]; 2]; 2],
            atwd_entries: [[0; 2]; 2],
        }
    }
}

/// Accumulator for charge stamps
#[derive(Debug, Clone)]
pub struct ChargeStampHistogram {
    bins: HistogramSnapshot,
}

impl ChargeStampHistogram {
    pub fn new(mode: ChargeStampMode, prescale: u16) -> Self {
        Self {
            bins: HistogramSnapshot::empty(mode, prescale),
        }
    }

    pub fn mode(&self) -> ChargeStampMode {
        self.bins.mode
    }

    /// Change mode or prescale; clears all bins
    pub fn configure(&mut self, mode: ChargeStampMode, prescale: u16) {
        self.bins = HistogramSnapshot::empty(mode, prescale);
    }

    /// Bin one compressed hit's stamp according to the current mode
    pub fn record(&mut self, stamp: ChargeStamp) {
        match self.bins.mode {
            ChargeStampMode::Fadc => self.record_fadc_peak(stamp.fadc_peak()),
            ChargeStampMode::Atwd => {
                let prescale = self.bins.prescale.max(1) as u32;
                let mut bin = ((stamp.atwd_charge() / prescale) as usize).min(LAST_BIN);
                let mut chan = stamp.atwd_channel();
                // Charge overflowed into the low-gain channels
                if chan > 1 {
                    chan = 1;
                    bin = LAST_BIN;
                }
                let chip = stamp.atwd_chip();
                let b = &mut self.bins.atwd[chip][chan][bin];
                *b = b.saturating_add(1);
                self.bins.atwd_entries[chip][chan] += 1;
            }
        }
    }

    /// Bin an FADC peak directly (used for uncompressed events)
    pub fn record_fadc_peak(&mut self, peak: u32) {
        if self.bins.mode != ChargeStampMode::Fadc || self.bins.prescale == 0 {
            return;
        }
        let bin = ((peak / self.bins.prescale as u32) as usize).min(LAST_BIN);
        let b = &mut self.bins.fadc[bin];
        *b = b.saturating_add(1);
        self.bins.fadc_entries += 1;
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        self.bins.clone()
    }

    /// Zero all bins, keeping mode and prescale
    pub fn reset(&mut self) {
        self.bins = HistogramSnapshot::empty(self.bins.mode, self.bins.prescale);
    }
}

impl Default for ChargeStampHistogram {
    fn default() -> Self {
        Self::new(ChargeStampMode::Fadc, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fadc_stamp(peak: u32, high: bool) -> ChargeStamp {
        let mut word3 = (peak & 0x1FF) << 9;
        if high {
            word3 |= 0x0080_0000;
        }
        ChargeStamp { word1: 0, word3 }
    }

    #[test]
    fn test_high_range_peak_doubles() {
        let mut h = ChargeStampHistogram::new(ChargeStampMode::Fadc, 4);
        h.record(fadc_stamp(40, false));
        h.record(fadc_stamp(40, true));
        let s = h.snapshot();
        assert_eq!(s.fadc[10], 1);
        assert_eq!(s.fadc[20], 1);
        assert_eq!(s.fadc_entries, 2);
    }

    #[test]
    fn test_fadc_clamps_to_last_bin() {
        let mut h = ChargeStampHistogram::new(ChargeStampMode::Fadc, 1);
        h.record(fadc_stamp(500, true));
        assert_eq!(h.snapshot().fadc[LAST_BIN], 1);
    }

    #[test]
    fn test_zero_prescale_disables_fadc_mode() {
        let mut h = ChargeStampHistogram::new(ChargeStampMode::Fadc, 0);
        h.record(fadc_stamp(5, false));
        assert_eq!(h.snapshot().fadc_entries, 0);
    }

    #[test]
    fn test_atwd_chip_channel_bin() {
        let mut h = ChargeStampHistogram::new(ChargeStampMode::Atwd, 2);
        h.record(ChargeStamp {
            word1: 1 << 11,
            word3: (1 << 17) | 20,
        });
        let s = h.snapshot();
        assert_eq!(s.atwd[1][1][10], 1);
        assert_eq!(s.atwd_entries[1][1], 1);
    }

    #[test]
    fn test_atwd_channel_overflow_clamps() {
        let mut h = ChargeStampHistogram::new(ChargeStampMode::Atwd, 1);
        h.record(ChargeStamp {
            word1: 0,
            word3: (3 << 17) | 5,
        });
        let s = h.snapshot();
        assert_eq!(s.atwd[0][1][LAST_BIN], 1);
    }

    #[test]
    fn test_reset_keeps_mode() {
        let mut h = ChargeStampHistogram::new(ChargeStampMode::Atwd, 3);
        h.record(ChargeStamp { word1: 0, word3: 9 });
        h.reset();
        let s = h.snapshot();
        assert_eq!(s.mode, ChargeStampMode::Atwd);
        assert_eq!(s.prescale, 3);
        assert_eq!(s.atwd_entries, [[0; 2]; 2]);
    }
}
