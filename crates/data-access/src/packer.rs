//! Message Batch Packer
//!
//! `count` and `fill` share one traversal of the lookback memory. `count`
//! runs it on a copy of the read cursor and writes nothing; `fill` runs it
//! over the caller's buffer and, unless an overflow interrupted it, commits
//! the cursor, counters, histogram and warnings afterwards.
//!
//! A traversal stops when
//! - less than one block of unread data remains,
//! - the unread span exceeds the software depth (the batch is discarded),
//! - the next record would not fit, or
//! - a delta hit carries a different time-MSB tag than the open group.

use dom_hal::DomHal;
use event_codec::delta::{close_group, write_group_header, GROUP_HEADER_LEN};
use event_codec::engineering::Anomalies;
use event_codec::{ChargeStamp, CodecError, Event};
use lbm::{LbmIndex, RingView};
use metrics::counter;
use tracing::{debug, warn};

use crate::config::RateType;
use crate::context::AcquisitionContext;
use crate::error::AccessError;
use crate::warnings::WarningKind;

/// Why a traversal ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// Ran out of complete blocks
    #[default]
    NoData,
    /// The next record would exceed the buffer
    Full,
    /// The next delta hit starts a new time-MSB group
    GroupChange,
    /// The writer lapped the reader; nothing from this pass is usable
    Overflow,
}

/// Outcome of one traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Bytes produced (0 after an overflow)
    pub bytes: usize,
    /// LBM slots consumed, including skipped ones
    pub events: u32,
    /// Slots that failed to decode and were stepped over
    pub skipped: u32,
    /// Hits counted towards the fast-monitoring rate
    pub hits: u32,
    pub stop: StopReason,
}

impl BatchSummary {
    /// A downstream consumer can take this batch without waiting for more
    /// data: it ended on a capacity limit or a group boundary.
    pub fn complete(&self) -> bool {
        self.bytes > 0 && matches!(self.stop, StopReason::Full | StopReason::GroupChange)
    }
}

/// Side effects of a traversal that only a committing fill applies
enum Note {
    Anomalies(Anomalies, u64),
    Skipped(CodecError, LbmIndex),
    Stamp(ChargeStamp),
    FadcPeak(u32),
}

struct Pass {
    summary: BatchSummary,
    read: LbmIndex,
    write_at_stop: LbmIndex,
    notes: Vec<Note>,
}

/// Packs decoded events into bounded outgoing buffers
pub struct MessageBatchPacker;

impl MessageBatchPacker {
    /// Dry run: how many bytes a fill of `capacity` would produce right now.
    ///
    /// Takes the context immutably; an overflow is reported through
    /// [`StopReason::Overflow`] and left for the next fill to resync.
    pub fn count<H: DomHal>(
        ctx: &AcquisitionContext,
        hal: &H,
        capacity: usize,
    ) -> Result<BatchSummary, AccessError> {
        Ok(traverse(ctx, hal, capacity, None)?.summary)
    }

    /// Fill `buf` with as many records as fit and advance the read cursor.
    /// At most `u16::MAX` bytes are used.
    ///
    /// On overflow the cursor is resynchronized, nothing is committed and
    /// the returned summary reports zero bytes.
    pub fn fill<H: DomHal>(
        ctx: &mut AcquisitionContext,
        hal: &H,
        buf: &mut [u8],
    ) -> Result<BatchSummary, AccessError> {
        let capacity = buf.len();
        let pass = traverse(ctx, hal, capacity, Some(buf))?;

        if pass.summary.stop == StopReason::Overflow {
            let (guard, read) = ctx.guard_and_cursor();
            guard.resync(pass.write_at_stop, read);
            return Ok(pass.summary);
        }

        commit(ctx, &pass);
        Ok(pass.summary)
    }
}

fn counts_as_hit(rate_type: RateType, event: &Event<'_>) -> bool {
    rate_type == RateType::Slc || !event.is_header_only()
}

fn traverse<H: DomHal>(
    ctx: &AcquisitionContext,
    hal: &H,
    capacity: usize,
    mut out: Option<&mut [u8]>,
) -> Result<Pass, AccessError> {
    // Group lengths are 16-bit
    let capacity = capacity.min(u16::MAX as usize);
    let geometry = *ctx.geometry();
    let view = RingView::new(geometry, hal.lbm_memory())?;
    let encode = ctx.encode_context();
    let collect = out.is_some();

    let mut summary = BatchSummary::default();
    let mut notes = Vec::new();
    let mut read = ctx.read_cursor();
    let mut pos = 0usize;
    let mut group: Option<(u16, usize)> = None;
    let mut write;

    loop {
        write = hal.lbm_pointer();
        if !geometry.is_data_available(write, read) {
            summary.stop = StopReason::NoData;
            break;
        }
        if geometry.has_overflowed(write, read) {
            summary.stop = StopReason::Overflow;
            break;
        }

        let slot = view.event(read);
        let event = match Event::decode(ctx.codec(), &slot) {
            Ok(event) => event,
            Err(e) => {
                if collect {
                    notes.push(Note::Skipped(e, read));
                }
                summary.events += 1;
                summary.skipped += 1;
                read = geometry.advance(read);
                continue;
            }
        };

        let len = event.encoded_len(encode);
        let header = match (event.group_tag(), group) {
            (Some(tag), Some((open, _))) if tag != open => {
                summary.stop = StopReason::GroupChange;
                break;
            }
            (Some(_), None) => GROUP_HEADER_LEN,
            _ => 0,
        };
        if pos + header + len > capacity {
            summary.stop = StopReason::Full;
            break;
        }

        if let Some(buf) = out.as_deref_mut() {
            if header > 0 {
                if let Some(tag) = event.group_tag() {
                    write_group_header(tag, &mut buf[pos..]);
                }
            }
            event.encode_into(encode, &mut buf[pos + header..pos + header + len]);
        }
        if header > 0 {
            group = event.group_tag().map(|tag| (tag, pos));
        }
        pos += header + len;

        if collect {
            match &event {
                Event::Engineering(ev) => {
                    let a = ev.anomalies();
                    if !a.is_empty() {
                        notes.push(Note::Anomalies(a, ev.timestamp()));
                    }
                    if ev.fadc_present() {
                        let n = encode.format.fadc_samples() as usize;
                        notes.push(Note::FadcPeak(ev.fadc_peak(n) as u32));
                    }
                }
                other => {
                    if let Some(stamp) = other.charge_stamp() {
                        notes.push(Note::Stamp(stamp));
                    }
                }
            }
        }

        summary.events += 1;
        if counts_as_hit(ctx.rate_type(), &event) {
            summary.hits += 1;
        }
        read = geometry.advance(read);
    }

    // The writer may have lapped us while we were packing
    if summary.stop != StopReason::Overflow {
        let now = hal.lbm_pointer();
        if geometry.has_overflowed(now, read) {
            summary.stop = StopReason::Overflow;
            write = now;
        }
    }

    if summary.stop == StopReason::Overflow {
        summary.bytes = 0;
        return Ok(Pass {
            summary,
            read,
            write_at_stop: write,
            notes: Vec::new(),
        });
    }

    if let (Some(buf), Some((_, start))) = (out.as_deref_mut(), group) {
        close_group(&mut buf[start..pos]);
    }
    summary.bytes = pos;
    Ok(Pass {
        summary,
        read,
        write_at_stop: write,
        notes,
    })
}

fn commit(ctx: &mut AcquisitionContext, pass: &Pass) {
    let s = &pass.summary;
    ctx.set_read_cursor(pass.read);
    let packed = (s.events - s.skipped) as u64;
    ctx.add_counts(s.hits as u64, packed);
    counter!("domapp_hits_total").increment(s.hits as u64);
    counter!("domapp_triggers_read_out_total").increment(packed);

    let histogramming = ctx.histogramming();
    for note in &pass.notes {
        match note {
            Note::Stamp(stamp) if histogramming => ctx.histogram_mut().record(*stamp),
            Note::FadcPeak(peak) if histogramming => ctx.histogram_mut().record_fadc_peak(*peak),
            Note::Stamp(_) | Note::FadcPeak(_) => {}
            Note::Anomalies(a, timestamp) => warn_anomalies(ctx, *a, *timestamp),
            Note::Skipped(e, at) => {
                let kind = match e {
                    CodecError::MissingCompressBit { .. } => WarningKind::MISSING_COMPRESS_BIT,
                    _ => WarningKind::CORRUPT_HIT,
                };
                if ctx.warnings_mut().first(kind) {
                    warn!("Skipping LBM slot at {}: {}", at, e);
                }
            }
        }
    }

    if s.bytes > 0 {
        debug!(
            "Packed {} bytes from {} events ({:?}), read cursor now {}",
            s.bytes, s.events, s.stop, pass.read
        );
    }
}

fn warn_anomalies(ctx: &mut AcquisitionContext, a: Anomalies, timestamp: u64) {
    let table = [
        (
            Anomalies::UNKNOWN_SOURCE,
            WarningKind::UNKNOWN_TRIGGER_SOURCE,
            "disallowed trigger source bits in event",
        ),
        (
            Anomalies::FADC_MISSING,
            WarningKind::FADC_MISSING,
            "FADC data missing from raw event",
        ),
        (
            Anomalies::ATWD_MISSING,
            WarningKind::ATWD_MISSING,
            "ATWD data missing from raw event",
        ),
        (
            Anomalies::ATWD_SIZE,
            WarningKind::ATWD_SIZE,
            "trigger bits indicate ATWD size != 3",
        ),
    ];
    for (anomaly, kind, what) in table {
        if a.contains(anomaly) && ctx.warnings_mut().first(kind) {
            warn!("Engineering event at t=0x{:012x}: {}", timestamp, what);
        }
    }
}
