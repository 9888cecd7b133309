//! Supernova Scaler Stream
//!
//! Message layout: `[length BE u16][format id 300 BE u16][start time, 6 bytes
//! BE][one count byte per bin...]`. Bins are expected exactly [`STD_DT`]
//! ticks apart. A bin that breaks continuity ends the current message and
//! becomes the first bin of the next one, so no scaler data is dropped.

use dom_hal::{ScalerFifo, SnSample};
use event_codec::put_time48;
use metrics::counter;
use tracing::warn;

/// Format id of a supernova message
pub const SN_FORMAT_ID: u16 = 300;

/// Ticks between consecutive scaler bins (1.6384 ms)
pub const STD_DT: u64 = 65536;

/// Length, format id and start time
const HEADER_LEN: usize = 10;

/// Packs supernova scaler bins into messages
#[derive(Debug, Clone, Default)]
pub struct SupernovaStream {
    prev: Option<u64>,
    pending: Option<SnSample>,
    discontinuities: u64,
    fifo_overflows: u64,
}

impl SupernovaStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bin carried over to the next message, if any
    pub fn pending(&self) -> Option<&SnSample> {
        self.pending.as_ref()
    }

    pub fn discontinuities(&self) -> u64 {
        self.discontinuities
    }

    pub fn fifo_overflows(&self) -> u64 {
        self.fifo_overflows
    }

    /// Forget continuity history (scalers restarted)
    pub fn reset(&mut self) {
        self.prev = None;
        self.pending = None;
    }

    /// Record `t` as the latest bin; true if it is not exactly one
    /// [`STD_DT`] after the previous bin. The first bin always passes.
    fn check_time(&mut self, t: u64, t_block: u64) -> bool {
        let Some(prev) = self.prev.replace(t) else {
            return false;
        };
        let dt = t as i64 - prev as i64;
        if dt == STD_DT as i64 {
            return false;
        }
        let why = if dt > STD_DT as i64 {
            "SN time gap"
        } else {
            "SN time out of order"
        };
        warn!(
            "{}: t={} tprev={} tblock={} dt={} dtblock={}",
            why,
            t,
            prev,
            t_block,
            dt,
            t as i64 - t_block as i64
        );
        self.discontinuities += 1;
        counter!("supernova_discontinuities_total").increment(1);
        true
    }

    fn next_sample<F: ScalerFifo>(&mut self, fifo: &mut F) -> Option<SnSample> {
        let sample = fifo.sn_next()?;
        if sample.fifo_overflow {
            self.fifo_overflows += 1;
            warn!("Supernova scaler FIFO overflowed before t={}", sample.ticks);
        }
        Some(sample)
    }

    /// Fill `buf` with one message of at most `u16::MAX` bytes; 0 if no
    /// bin is available or `buf` cannot hold a header and one bin.
    pub fn fill<F: ScalerFifo>(&mut self, fifo: &mut F, buf: &mut [u8]) -> usize {
        let max = buf.len().min(u16::MAX as usize);
        let buf = &mut buf[..max];
        if buf.len() < HEADER_LEN + 1 {
            return 0;
        }

        let first = match self.pending.take() {
            Some(saved) => saved,
            None => {
                if !fifo.sn_ready() {
                    return 0;
                }
                let Some(sample) = self.next_sample(fifo) else {
                    return 0;
                };
                self.check_time(sample.ticks, sample.ticks);
                sample
            }
        };

        let t0 = first.ticks;
        buf[2..4].copy_from_slice(&SN_FORMAT_ID.to_be_bytes());
        put_time48(&mut buf[4..], t0);
        buf[HEADER_LEN] = clamp_count(first.counts);
        let mut pos = HEADER_LEN + 1;

        while pos < buf.len() && fifo.sn_ready() {
            let Some(sample) = self.next_sample(fifo) else {
                break;
            };
            if self.check_time(sample.ticks, t0) {
                self.pending = Some(sample);
                break;
            }
            buf[pos] = clamp_count(sample.counts);
            pos += 1;
        }

        buf[..2].copy_from_slice(&(pos as u16).to_be_bytes());
        pos
    }
}

fn clamp_count(counts: u32) -> u8 {
    counts.min(255) as u8
}
