//! Interval Service
//!
//! Every call offers event data unless a monitoring record is due. Once
//! the interval has elapsed, a monitoring record is emitted, then (when
//! supernova collection is running) the next non-empty supernova message
//! closes the interval and starts the next one. Without supernova
//! collection the interval restarts right after the monitoring record.
//!
//! Compressed formats hold back a batch that has not reached a capacity
//! limit or group boundary for one call, so it can grow before it is sent.

use dom_hal::{DomHal, TICKS_PER_SEC};
use event_codec::CodecKind;
use lbm::LbmIndex;
use tracing::debug;

use crate::context::AcquisitionContext;
use crate::error::AccessError;
use crate::message::{data_access, service, Message, MAX_DATA};
use crate::packer::MessageBatchPacker;
use crate::supernova::SupernovaStream;

/// What the poll loop should send next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalAction {
    /// Nothing to send this iteration
    Idle,
    /// Packed event data
    Data(Message),
    /// The caller must emit one monitoring record
    Monitoring,
    /// Supernova scaler message
    Supernova(Message),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Monitoring,
    Supernova,
}

/// Interleaves event data with per-interval monitoring and supernova output
#[derive(Debug, Clone)]
pub struct IntervalService {
    interval_ticks: u64,
    started: Option<u64>,
    phase: Phase,
    supernova: bool,
    held: Option<LbmIndex>,
}

impl IntervalService {
    pub fn new(interval_ticks: u64) -> Self {
        Self {
            interval_ticks,
            started: None,
            phase: Phase::Monitoring,
            supernova: false,
            held: None,
        }
    }

    /// One-second intervals
    pub fn one_second() -> Self {
        Self::new(TICKS_PER_SEC)
    }

    /// Open an interval at `now`; `supernova` says whether scaler
    /// messages close it
    pub fn start(&mut self, now: u64, supernova: bool) {
        self.started = Some(now);
        self.phase = Phase::Monitoring;
        self.supernova = supernova;
        self.held = None;
    }

    pub fn stop(&mut self) {
        self.started = None;
        self.held = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn service<H: DomHal>(
        &mut self,
        ctx: &mut AcquisitionContext,
        sn: &mut SupernovaStream,
        hal: &mut H,
    ) -> Result<IntervalAction, AccessError> {
        let Some(started) = self.started else {
            return Ok(IntervalAction::Idle);
        };
        let now = hal.clock_ticks();

        if now.wrapping_sub(started) >= self.interval_ticks {
            match self.phase {
                Phase::Monitoring if self.supernova => {
                    self.phase = Phase::Supernova;
                    return Ok(IntervalAction::Monitoring);
                }
                Phase::Monitoring => {
                    debug!("Interval closed at t={} without supernova data", now);
                    self.start(now, false);
                    return Ok(IntervalAction::Monitoring);
                }
                Phase::Supernova => {
                    let mut buf = vec![0u8; MAX_DATA];
                    let n = sn.fill(hal, &mut buf);
                    if n > 0 {
                        buf.truncate(n);
                        debug!("Interval closed at t={} with {} byte supernova message", now, n);
                        self.start(now, true);
                        let msg =
                            Message::new(service::DATA_ACCESS, data_access::GET_SN_DATA, buf)?;
                        return Ok(IntervalAction::Supernova(msg));
                    }
                    // No scaler data yet; keep draining events meanwhile
                }
            }
        }

        self.data(ctx, hal)
    }

    fn data<H: DomHal>(
        &mut self,
        ctx: &mut AcquisitionContext,
        hal: &mut H,
    ) -> Result<IntervalAction, AccessError> {
        if ctx.codec() != CodecKind::Engineering {
            let read = ctx.read_cursor();
            let batch = MessageBatchPacker::count(ctx, hal, MAX_DATA)?;
            let partial = batch.bytes > 0 && !batch.complete();
            if partial && self.held != Some(read) {
                self.held = Some(read);
                return Ok(IntervalAction::Idle);
            }
        }
        self.held = None;

        let mut buf = vec![0u8; MAX_DATA];
        let summary = MessageBatchPacker::fill(ctx, hal, &mut buf)?;
        if summary.bytes == 0 {
            return Ok(IntervalAction::Idle);
        }
        buf.truncate(summary.bytes);
        let msg = Message::new(service::DATA_ACCESS, data_access::GET_DATA, buf)?;
        Ok(IntervalAction::Data(msg))
    }
}
