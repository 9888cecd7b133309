//! Road-Grade Hit Codec
//!
//! The firmware has already compressed the hit; each one travels with its
//! own 6-byte header `[length BE u16][0x00][0x80][time MSB BE u16]`,
//! length counting the header. A slot without the compression flag cannot
//! be trusted and is rejected.

use dom_hal::layout::compressed;

use crate::delta::split_hit;
use crate::error::CodecError;
use crate::histogram::ChargeStamp;
use crate::put_be16;

pub const HIT_MARKER: u8 = 0x80;
pub const HIT_HEADER_LEN: usize = 6;

/// Decoded view of one road-grade hit
#[derive(Debug, Clone, Copy)]
pub struct RoadGradeHit<'s> {
    time_msb: u16,
    hit: &'s [u8],
}

impl<'s> RoadGradeHit<'s> {
    pub fn decode(slot: &'s [u8]) -> Result<Self, CodecError> {
        let (header, hit) = split_hit(slot)?;
        let time_msb = (header & compressed::TIME_MSB_MASK) as u16;
        if header & compressed::COMPRESS_FLAG == 0 {
            return Err(CodecError::MissingCompressBit { time_msb });
        }
        Ok(Self { time_msb, hit })
    }

    pub fn time_msb(&self) -> u16 {
        self.time_msb
    }

    pub fn is_header_only(&self) -> bool {
        self.hit.len() == compressed::HEADER_ONLY_SIZE as usize
    }

    pub fn charge_stamp(&self) -> ChargeStamp {
        ChargeStamp::from_hit(self.hit)
    }

    pub fn encoded_len(&self) -> usize {
        HIT_HEADER_LEN + self.hit.len()
    }

    pub fn encode_into(&self, out: &mut [u8]) -> usize {
        let len = self.encoded_len();
        put_be16(out, len as u16);
        out[2] = 0;
        out[3] = HIT_MARKER;
        put_be16(&mut out[4..], self.time_msb);
        out[HIT_HEADER_LEN..len].copy_from_slice(self.hit);
        len
    }
}
