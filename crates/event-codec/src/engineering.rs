//! Engineering (Uncompressed) Event Codec
//!
//! Wire record, all multi-byte fields big-endian:
//!
//! ```text
//! 0   length (u16, whole record)
//! 2   0x00
//! 3   event id (0x02)
//! 4   misc bit
//! 5   FADC sample count
//! 6   ATWD ch1 mask << 4 | ch0 mask
//! 7   ATWD ch3 mask << 4 | ch2 mask
//! 8   trigmask
//! 9   spare
//! 10  timestamp (6 bytes)
//! 16  FADC samples, then ATWD channels 0..3
//! ```
//!
//! Word-width samples keep 10 bits as (hi & 0x03, lo). ATWD channels carry
//! the last `n` of 128 samples since the hardware stores earliest-last.

use dom_hal::layout::engineering as slot;
use dom_hal::layout::engineering::trig;
use dom_hal::{TriggerSource, ATWD_CHANNELS, ATWD_SAMPLES, FADC_SAMPLES};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::{le16, le32, put_be16, put_time48};

/// Event id byte of an engineering record
pub const ENG_EVENT_ID: u8 = 0x02;

/// Fixed header ahead of the sample data
pub const HEADER_LEN: usize = 16;

/// Largest record any format can produce (255 FADC + 4 x 128 word samples)
pub const MAX_RECORD_LEN: usize = 1550;

/// Trigger mask byte values
pub mod trigmask {
    pub const FORCED: u8 = 0x01;
    pub const DISCRIMINATOR: u8 = 0x02;
    pub const FLASHER: u8 = 0x03;
    pub const FB_RUN: u8 = 0x10;
    pub const LC_LOWER: u8 = 0x20;
    pub const LC_UPPER: u8 = 0x40;
    pub const UNKNOWN: u8 = 0x80;
}

/// Storage width of one ATWD sample on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleWidth {
    Byte,
    Word,
}

impl SampleWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
        }
    }
}

/// How one ATWD channel is read out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReadout {
    pub samples: usize,
    pub width: SampleWidth,
}

impl ChannelReadout {
    /// Decode a 4-bit channel mask; unknown masks disable the channel
    pub fn from_mask(mask: u8) -> Self {
        let (samples, width) = match mask & 0xF {
            1 => (32, SampleWidth::Byte),
            5 => (64, SampleWidth::Byte),
            9 => (16, SampleWidth::Byte),
            13 => (128, SampleWidth::Byte),
            3 => (32, SampleWidth::Word),
            7 => (64, SampleWidth::Word),
            11 => (16, SampleWidth::Word),
            15 => (128, SampleWidth::Word),
            _ => (0, SampleWidth::Byte),
        };
        Self { samples, width }
    }

    pub fn encoded_len(&self) -> usize {
        self.samples * self.width.bytes()
    }
}

/// Per-channel readout table, computed once when the format is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineeringFormat {
    fadc_samples: u8,
    masks: [u8; ATWD_CHANNELS],
    channels: [ChannelReadout; ATWD_CHANNELS],
}

impl EngineeringFormat {
    pub fn new(fadc_samples: u8, atwd01_mask: u8, atwd23_mask: u8) -> Self {
        let masks = [
            atwd01_mask & 0xF,
            (atwd01_mask >> 4) & 0xF,
            atwd23_mask & 0xF,
            (atwd23_mask >> 4) & 0xF,
        ];
        Self {
            fadc_samples,
            masks,
            channels: masks.map(ChannelReadout::from_mask),
        }
    }

    pub fn fadc_samples(&self) -> u8 {
        self.fadc_samples
    }

    pub fn channel(&self, ch: usize) -> ChannelReadout {
        self.channels[ch]
    }

    /// The two mask bytes as they appear on the wire
    pub fn mask_bytes(&self) -> (u8, u8) {
        (
            (self.masks[1] << 4) | self.masks[0],
            (self.masks[3] << 4) | self.masks[2],
        )
    }

    fn fadc_len(&self) -> usize {
        self.fadc_samples as usize * 2
    }

    fn atwd_len(&self) -> usize {
        self.channels.iter().map(ChannelReadout::encoded_len).sum()
    }

    /// Record length for an event with the given digitizer sections
    pub fn record_len(&self, fadc_present: bool, atwd_present: bool) -> usize {
        let mut len = HEADER_LEN;
        if fadc_present {
            len += self.fadc_len();
        }
        if atwd_present {
            len += self.atwd_len();
        }
        len
    }
}

impl Default for EngineeringFormat {
    fn default() -> Self {
        Self::new(255, 0xFF, 0xFF)
    }
}

bitflags::bitflags! {
    /// Hardware irregularities found while decoding
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Anomalies: u8 {
        const UNKNOWN_SOURCE = 1 << 0;
        const FADC_MISSING   = 1 << 1;
        const ATWD_MISSING   = 1 << 2;
        const ATWD_SIZE      = 1 << 3;
    }
}

/// Decoded view of an uncompressed LBM slot
#[derive(Debug, Clone, Copy)]
pub struct EngineeringEvent<'s> {
    slot: &'s [u8],
}

impl<'s> EngineeringEvent<'s> {
    pub fn decode(slot: &'s [u8]) -> Result<Self, CodecError> {
        if slot.len() < slot::RECORD_LEN {
            return Err(CodecError::Truncated {
                need: slot::RECORD_LEN,
                have: slot.len(),
            });
        }
        Ok(Self { slot })
    }

    /// 48-bit timestamp
    pub fn timestamp(&self) -> u64 {
        le16(self.slot, slot::TLO) as u64 | ((le32(self.slot, slot::THI) as u64) << 16)
    }

    pub fn trigbits(&self) -> u32 {
        le32(self.slot, slot::TRIGBITS)
    }

    pub fn deadtime(&self) -> u16 {
        le16(self.slot, slot::TDEAD)
    }

    pub fn source(&self) -> TriggerSource {
        TriggerSource::from_bits_truncate(self.trigbits() & trig::SOURCE_MASK)
    }

    pub fn misc(&self) -> bool {
        self.trigbits() & trig::MISC != 0
    }

    pub fn fadc_present(&self) -> bool {
        self.trigbits() & trig::FADC_PRESENT != 0
    }

    pub fn atwd_present(&self) -> bool {
        self.trigbits() & trig::ATWD_PRESENT != 0
    }

    pub fn atwd_size(&self) -> u32 {
        (self.trigbits() >> trig::ATWD_SIZE_SHIFT) & trig::ATWD_SIZE_MASK
    }

    pub fn fadc_sample(&self, i: usize) -> u16 {
        le16(self.slot, slot::FADC + 2 * i)
    }

    pub fn atwd_sample(&self, ch: usize, i: usize) -> u16 {
        le16(self.slot, slot::ATWD + ch * slot::ATWD_CHANNEL_STRIDE + 2 * i)
    }

    /// Largest 10-bit FADC sample among the first `n`
    pub fn fadc_peak(&self, n: usize) -> u16 {
        (0..n.min(FADC_SAMPLES))
            .map(|i| self.fadc_sample(i) & 0x3FF)
            .max()
            .unwrap_or(0)
    }

    /// Single trigger type for the wire. The record has room for one, so
    /// forced beats flasher beats discriminator.
    pub fn trigmask(&self, fb_run: bool) -> u8 {
        let source = self.source();
        let mut mask = if source.contains(TriggerSource::FORCED) {
            trigmask::FORCED
        } else if source.contains(TriggerSource::FLASHER) {
            trigmask::FLASHER
        } else if source.intersects(TriggerSource::SPE | TriggerSource::MPE) {
            trigmask::DISCRIMINATOR
        } else {
            trigmask::UNKNOWN
        };
        let bits = self.trigbits();
        if bits & trig::LC_LOWER != 0 {
            mask |= trigmask::LC_LOWER;
        }
        if bits & trig::LC_UPPER != 0 {
            mask |= trigmask::LC_UPPER;
        }
        if fb_run {
            mask |= trigmask::FB_RUN;
        }
        mask
    }

    pub fn anomalies(&self) -> Anomalies {
        let mut a = Anomalies::empty();
        let source = self.source();
        if !source.intersects(
            TriggerSource::FORCED | TriggerSource::FLASHER | TriggerSource::SPE | TriggerSource::MPE,
        ) {
            a |= Anomalies::UNKNOWN_SOURCE;
        }
        if !self.fadc_present() {
            a |= Anomalies::FADC_MISSING;
        }
        if !self.atwd_present() {
            a |= Anomalies::ATWD_MISSING;
        }
        if self.atwd_size() != 3 {
            a |= Anomalies::ATWD_SIZE;
        }
        a
    }

    pub fn encoded_len(&self, format: &EngineeringFormat) -> usize {
        format.record_len(self.fadc_present(), self.atwd_present())
    }

    /// Write the record into `out`, which must hold `encoded_len` bytes
    pub fn encode_into(&self, format: &EngineeringFormat, fb_run: bool, out: &mut [u8]) -> usize {
        let len = self.encoded_len(format);
        let (m01, m23) = format.mask_bytes();
        put_be16(out, len as u16);
        out[2] = 0;
        out[3] = ENG_EVENT_ID;
        out[4] = self.misc() as u8;
        out[5] = format.fadc_samples();
        out[6] = m01;
        out[7] = m23;
        out[8] = self.trigmask(fb_run);
        out[9] = 0;
        put_time48(&mut out[10..], self.timestamp());

        let mut p = HEADER_LEN;
        if self.fadc_present() {
            for i in 0..format.fadc_samples() as usize {
                let s = self.fadc_sample(i);
                out[p] = ((s >> 8) & 0x03) as u8;
                out[p + 1] = (s & 0xFF) as u8;
                p += 2;
            }
        }
        if self.atwd_present() {
            for ch in 0..ATWD_CHANNELS {
                let readout = format.channel(ch);
                for i in ATWD_SAMPLES - readout.samples..ATWD_SAMPLES {
                    let s = self.atwd_sample(ch, i);
                    match readout.width {
                        SampleWidth::Byte => {
                            out[p] = (s & 0xFF) as u8;
                            p += 1;
                        }
                        SampleWidth::Word => {
                            out[p] = ((s >> 8) & 0x03) as u8;
                            out[p + 1] = (s & 0xFF) as u8;
                            p += 2;
                        }
                    }
                }
            }
        }
        debug_assert_eq!(p, len);
        p
    }
}
