//! DOM Event Codecs
//!
//! Decodes one lookback-memory slot into an [`Event`] and encodes it into
//! the surface wire format. Three codecs exist, selected by the configured
//! (data format, compression) pair:
//!
//! | format      | compression | codec          |
//! |-------------|-------------|----------------|
//! | Engineering | None        | [`engineering`] |
//! | RoadGrade   | RoadGrade   | [`road_grade`]  |
//! | Delta       | Delta       | [`delta`]       |
//!
//! Codecs are pure: anomalies are reported to the caller rather than
//! logged, so a dry-run pass can decode without side effects.

pub mod delta;
pub mod engineering;
mod error;
mod event;
mod format;
pub mod histogram;
pub mod road_grade;

pub use engineering::{Anomalies, ChannelReadout, EngineeringEvent, EngineeringFormat, SampleWidth};
pub use error::CodecError;
pub use event::{EncodeContext, Event};
pub use format::{CodecKind, Compression, DataFormat};
pub use histogram::{ChargeStamp, ChargeStampHistogram, ChargeStampMode, HistogramSnapshot};

/// Write `v` big-endian into `out[0..2]`
#[inline]
pub(crate) fn put_be16(out: &mut [u8], v: u16) {
    out[..2].copy_from_slice(&v.to_be_bytes());
}

/// Little-endian u32 at `at`
#[inline]
pub(crate) fn le32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Little-endian u16 at `at`
#[inline]
pub(crate) fn le16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

/// Six-byte big-endian timestamp
#[inline]
pub fn put_time48(out: &mut [u8], ticks: u64) {
    out[..6].copy_from_slice(&ticks.to_be_bytes()[2..]);
}
