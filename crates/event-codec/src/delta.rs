//! Delta-Compressed Hit Codec
//!
//! Hits sharing a 16-bit time-MSB tag travel under one 8-byte group
//! header: `[length BE u16][0x00][0x90][time MSB BE u16][0x00][0x00]`.
//! The length is the size of the whole group including its header and is
//! patched in once the group is closed. Hit bytes are copied verbatim.

use dom_hal::layout::compressed;

use crate::error::CodecError;
use crate::histogram::ChargeStamp;
use crate::{le32, put_be16};

/// Marker byte of a delta group header
pub const GROUP_MARKER: u8 = 0x90;

/// Size of the shared group header
pub const GROUP_HEADER_LEN: usize = 8;

/// Slot header word and the hit bytes it describes
pub(crate) fn split_hit(slot: &[u8]) -> Result<(u32, &[u8]), CodecError> {
    if slot.len() < compressed::HIT + 4 {
        return Err(CodecError::Truncated {
            need: compressed::HIT + 4,
            have: slot.len(),
        });
    }
    let header = le32(slot, compressed::HEADER);
    let size = (le32(slot, compressed::HIT) & compressed::HIT_SIZE_MASK) as u16;
    if size < compressed::HEADER_ONLY_SIZE {
        return Err(CodecError::BadHitSize(size));
    }
    let end = compressed::HIT + size as usize;
    if end > slot.len() {
        return Err(CodecError::Truncated {
            need: end,
            have: slot.len(),
        });
    }
    Ok((header, &slot[compressed::HIT..end]))
}

/// Decoded view of one delta-compressed hit
#[derive(Debug, Clone, Copy)]
pub struct DeltaHit<'s> {
    time_msb: u16,
    hit: &'s [u8],
}

impl<'s> DeltaHit<'s> {
    pub fn decode(slot: &'s [u8]) -> Result<Self, CodecError> {
        let (header, hit) = split_hit(slot)?;
        Ok(Self {
            time_msb: (header & compressed::TIME_MSB_MASK) as u16,
            hit,
        })
    }

    /// Group tag
    pub fn time_msb(&self) -> u16 {
        self.time_msb
    }

    pub fn size(&self) -> usize {
        self.hit.len()
    }

    /// Hit carries only its header words (soft local coincidence)
    pub fn is_header_only(&self) -> bool {
        self.hit.len() == compressed::HEADER_ONLY_SIZE as usize
    }

    pub fn bytes(&self) -> &'s [u8] {
        self.hit
    }

    pub fn charge_stamp(&self) -> ChargeStamp {
        ChargeStamp::from_hit(self.hit)
    }

    pub fn encoded_len(&self) -> usize {
        self.hit.len()
    }

    pub fn encode_into(&self, out: &mut [u8]) -> usize {
        out[..self.hit.len()].copy_from_slice(self.hit);
        self.hit.len()
    }
}

/// Open a group; the length field stays zero until [`close_group`]
pub fn write_group_header(time_msb: u16, out: &mut [u8]) -> usize {
    put_be16(out, 0);
    out[2] = 0;
    out[3] = GROUP_MARKER;
    put_be16(&mut out[4..], time_msb);
    out[6] = 0;
    out[7] = 0;
    GROUP_HEADER_LEN
}

/// Patch the group length once all hits are in
pub fn close_group(group: &mut [u8]) {
    let len = group.len() as u16;
    put_be16(group, len);
}
