//! Codec-Independent Event View

use crate::delta::DeltaHit;
use crate::engineering::{EngineeringEvent, EngineeringFormat};
use crate::error::CodecError;
use crate::format::CodecKind;
use crate::histogram::ChargeStamp;
use crate::road_grade::RoadGradeHit;

/// Settings that shape the encoded bytes but are not part of the event
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeContext {
    pub format: EngineeringFormat,
    /// A flasher-board run is in progress
    pub fb_run: bool,
}

/// One LBM slot decoded by the configured codec
#[derive(Debug, Clone, Copy)]
pub enum Event<'s> {
    Engineering(EngineeringEvent<'s>),
    Delta(DeltaHit<'s>),
    RoadGrade(RoadGradeHit<'s>),
}

impl<'s> Event<'s> {
    pub fn decode(kind: CodecKind, slot: &'s [u8]) -> Result<Self, CodecError> {
        Ok(match kind {
            CodecKind::Engineering => Self::Engineering(EngineeringEvent::decode(slot)?),
            CodecKind::Delta => Self::Delta(DeltaHit::decode(slot)?),
            CodecKind::RoadGrade => Self::RoadGrade(RoadGradeHit::decode(slot)?),
        })
    }

    /// Tag that must match for events to share one group header
    pub fn group_tag(&self) -> Option<u16> {
        match self {
            Self::Delta(hit) => Some(hit.time_msb()),
            _ => None,
        }
    }

    /// Compressed hit with no waveform payload
    pub fn is_header_only(&self) -> bool {
        match self {
            Self::Engineering(_) => false,
            Self::Delta(hit) => hit.is_header_only(),
            Self::RoadGrade(hit) => hit.is_header_only(),
        }
    }

    pub fn charge_stamp(&self) -> Option<ChargeStamp> {
        match self {
            Self::Engineering(_) => None,
            Self::Delta(hit) => Some(hit.charge_stamp()),
            Self::RoadGrade(hit) => Some(hit.charge_stamp()),
        }
    }

    /// Bytes `encode_into` will write, excluding any group header
    pub fn encoded_len(&self, ctx: &EncodeContext) -> usize {
        match self {
            Self::Engineering(ev) => ev.encoded_len(&ctx.format),
            Self::Delta(hit) => hit.encoded_len(),
            Self::RoadGrade(hit) => hit.encoded_len(),
        }
    }

    pub fn encode_into(&self, ctx: &EncodeContext, out: &mut [u8]) -> usize {
        match self {
            Self::Engineering(ev) => ev.encode_into(&ctx.format, ctx.fb_run, out),
            Self::Delta(hit) => hit.encode_into(out),
            Self::RoadGrade(hit) => hit.encode_into(out),
        }
    }
}
