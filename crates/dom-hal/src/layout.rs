//! Lookback Memory Record Layout
//!
//! Byte positions of the records the FPGA writes into each LBM slot. All
//! multi-byte fields are little-endian, as the FPGA writes them.
//!
//! The builders at the bottom produce slots in exactly this layout and are
//! used by [`crate::SimulatedDom`] and by tests in downstream crates.

use crate::{ATWD_CHANNELS, ATWD_SAMPLES, FADC_SAMPLES};

/// Uncompressed ("engineering") slot
pub mod engineering {
    /// Low 16 bits of the timestamp (u16)
    pub const TLO: usize = 0x00;
    /// Always 1 (u16)
    pub const ONE: usize = 0x02;
    /// High 32 bits of the timestamp (u32)
    pub const THI: usize = 0x04;
    /// Trigger word (u32)
    pub const TRIGBITS: usize = 0x08;
    /// Deadtime counter (u16)
    pub const TDEAD: usize = 0x0C;
    /// First FADC sample (u16 each)
    pub const FADC: usize = 0x10;
    /// First ATWD channel 0 sample (u16 each)
    pub const ATWD: usize = 0x210;
    /// Distance between ATWD channels
    pub const ATWD_CHANNEL_STRIDE: usize = 0x100;
    /// Bytes covered by header and payload
    pub const RECORD_LEN: usize = ATWD + 4 * ATWD_CHANNEL_STRIDE;

    /// Trigger word fields
    pub mod trig {
        /// Source bits (see [`crate::TriggerSource`])
        pub const SOURCE_MASK: u32 = 0xFF;
        pub const MISC: u32 = 1 << 16;
        pub const FADC_PRESENT: u32 = 1 << 17;
        pub const ATWD_PRESENT: u32 = 1 << 18;
        pub const ATWD_SIZE_SHIFT: u32 = 19;
        pub const ATWD_SIZE_MASK: u32 = 0x3;
        pub const LC_LOWER: u32 = 1 << 24;
        pub const LC_UPPER: u32 = 1 << 25;
    }
}

/// Firmware-compressed slot (delta and road-grade hits)
pub mod compressed {
    /// Slot header word (u32): time MSBs and compression flag
    pub const HEADER: usize = 0;
    /// First byte of the hit record proper
    pub const HIT: usize = 4;
    /// Header word: 16-bit timestamp MSB tag
    pub const TIME_MSB_MASK: u32 = 0xFFFF;
    /// Header word: set when the hit was compressed by the firmware
    pub const COMPRESS_FLAG: u32 = 1 << 31;

    /// Hit word 1 (first word of the hit, u32 at `HIT`)
    pub const HIT_SIZE_MASK: u32 = 0x7FF;
    /// Hit word 1: ATWD chip that digitized the hit
    pub const ATWD_CHIP_SHIFT: u32 = 11;
    /// Offset of the charge-stamp word inside the hit
    pub const CHARGE_STAMP: usize = 8;
    /// Size of a hit carrying only its header words (SLC hit)
    pub const HEADER_ONLY_SIZE: u16 = 12;
}

fn put_u16(slot: &mut [u8], at: usize, v: u16) {
    slot[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(slot: &mut [u8], at: usize, v: u32) {
    slot[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// An uncompressed event as the FPGA would write it
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeringSlot {
    /// 48-bit timestamp in clock ticks
    pub timestamp: u64,
    /// Full trigger word; source, presence and size bits are ORed in by
    /// the builder methods
    pub trigbits: u32,
    pub fadc: Option<Vec<u16>>,
    pub atwd: Option<[Vec<u16>; ATWD_CHANNELS]>,
}

impl EngineeringSlot {
    /// Event with constant baselines on every digitizer
    pub fn new(timestamp: u64, source: u32) -> Self {
        Self {
            timestamp,
            trigbits: (source & engineering::trig::SOURCE_MASK)
                | (3 << engineering::trig::ATWD_SIZE_SHIFT),
            fadc: None,
            atwd: None,
        }
    }

    pub fn with_fadc(mut self, samples: Vec<u16>) -> Self {
        self.trigbits |= engineering::trig::FADC_PRESENT;
        self.fadc = Some(samples);
        self
    }

    pub fn with_atwd(mut self, channels: [Vec<u16>; ATWD_CHANNELS]) -> Self {
        self.trigbits |= engineering::trig::ATWD_PRESENT;
        self.atwd = Some(channels);
        self
    }

    /// Fill both digitizers with a flat baseline
    pub fn with_baselines(self, fadc: u16, atwd: u16) -> Self {
        self.with_fadc(vec![fadc; FADC_SAMPLES])
            .with_atwd(std::array::from_fn(|_| vec![atwd; ATWD_SAMPLES]))
    }

    pub fn with_trigbits(mut self, bits: u32) -> Self {
        self.trigbits |= bits;
        self
    }

    /// Override the reported ATWD size field
    pub fn with_atwd_size(mut self, size: u32) -> Self {
        let mask = engineering::trig::ATWD_SIZE_MASK;
        self.trigbits &= !(mask << engineering::trig::ATWD_SIZE_SHIFT);
        self.trigbits |= (size & mask) << engineering::trig::ATWD_SIZE_SHIFT;
        self
    }

    /// Write into `slot`, which must hold at least `RECORD_LEN` bytes
    pub fn write(&self, slot: &mut [u8]) {
        slot[..engineering::RECORD_LEN].fill(0);
        put_u16(slot, engineering::TLO, (self.timestamp & 0xFFFF) as u16);
        put_u16(slot, engineering::ONE, 1);
        put_u32(slot, engineering::THI, (self.timestamp >> 16) as u32);
        put_u32(slot, engineering::TRIGBITS, self.trigbits);
        if let Some(fadc) = &self.fadc {
            for (i, s) in fadc.iter().take(FADC_SAMPLES).enumerate() {
                put_u16(slot, engineering::FADC + 2 * i, *s);
            }
        }
        if let Some(atwd) = &self.atwd {
            for (ch, samples) in atwd.iter().enumerate() {
                let base = engineering::ATWD + ch * engineering::ATWD_CHANNEL_STRIDE;
                for (i, s) in samples.iter().take(ATWD_SAMPLES).enumerate() {
                    put_u16(slot, base + 2 * i, *s);
                }
            }
        }
    }
}

/// A firmware-compressed hit as the FPGA would write it
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedSlot {
    pub time_msb: u16,
    pub compressed: bool,
    /// Hit bytes; the first word's size field is rewritten from the length
    pub hit: Vec<u8>,
}

impl CompressedSlot {
    /// Hit of `size` bytes (at least 12) with the given charge-stamp word
    pub fn new(time_msb: u16, size: u16, chip: u8, charge_stamp: u32) -> Self {
        let size = size.max(compressed::HEADER_ONLY_SIZE) as usize;
        let mut hit = vec![0u8; size];
        let word1 = ((chip as u32 & 1) << compressed::ATWD_CHIP_SHIFT)
            | (size as u32 & compressed::HIT_SIZE_MASK);
        put_u32(&mut hit, 0, word1);
        put_u32(&mut hit, compressed::CHARGE_STAMP, charge_stamp);
        for (i, b) in hit.iter_mut().enumerate().skip(12) {
            *b = i as u8;
        }
        Self {
            time_msb,
            compressed: true,
            hit,
        }
    }

    /// Clear the compression flag in the slot header
    pub fn uncompressed(mut self) -> Self {
        self.compressed = false;
        self
    }

    pub fn write(&self, slot: &mut [u8]) {
        let mut header = self.time_msb as u32 & compressed::TIME_MSB_MASK;
        if self.compressed {
            header |= compressed::COMPRESS_FLAG;
        }
        slot[..compressed::HIT + self.hit.len()].fill(0);
        put_u32(slot, compressed::HEADER, header);
        slot[compressed::HIT..compressed::HIT + self.hit.len()].copy_from_slice(&self.hit);
    }
}
