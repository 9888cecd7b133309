//! Pedestal Collection
//!
//! Forced triggers with local coincidence off are averaged per ATWD chip,
//! channel and sample (and per FADC sample). Before the result is trusted,
//! a second pass is taken and compared with the first: light leaking into
//! the PMT shows up as a baseline shift or as a structured (autocorrelated)
//! difference between the two averages. Contaminated pairs are retried.

use data_access::{AcquisitionContext, WarningKind};
use dom_hal::layout::compressed::COMPRESS_FLAG;
use dom_hal::{
    AtwdMode, AtwdSelect, CalMode, CalSource, CompressionMode, DaqMode, DomHal, LbmMode,
    RateMonitor, TriggerSource, ATWD_CHANNELS, ATWD_CHIPS, ATWD_SAMPLES, FADC_SAMPLES,
};
use event_codec::EngineeringEvent;
use lbm::{LbmIndex, RingView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PedestalConfig;
use crate::error::RunError;

/// Most forced triggers per ATWD chip
pub const MAX_PED_GOAL: u32 = 1000;

const LAUNCH_TRIALS: u32 = 10;
const LAUNCH_TRIAL_US: u32 = 40;
const SETTLE_US: u32 = 1000;
const SAMPLE_MASK: u16 = 0x3FF;

/// Requested trigger counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PedestalGoals {
    pub atwd_a: u32,
    pub atwd_b: u32,
    pub fadc: u32,
}

impl PedestalGoals {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.atwd_a > MAX_PED_GOAL
            || self.atwd_b > MAX_PED_GOAL
            || self.fadc > self.atwd_a + self.atwd_b
        {
            return Err(RunError::TooManyPeds {
                atwd_a: self.atwd_a,
                atwd_b: self.atwd_b,
                fadc: self.fadc,
            });
        }
        Ok(())
    }

    fn for_chip(&self, chip: usize) -> u32 {
        if chip == 0 {
            self.atwd_a
        } else {
            self.atwd_b
        }
    }
}

/// Waveforms that went into the averages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PedestalCounts {
    pub atwd_a: u32,
    pub atwd_b: u32,
    pub fadc: u32,
}

impl PedestalCounts {
    fn chip(&self, chip: usize) -> u32 {
        if chip == 0 {
            self.atwd_a
        } else {
            self.atwd_b
        }
    }

    /// Every digitizer saw at least one waveform
    pub fn complete(&self) -> bool {
        self.atwd_a > 0 && self.atwd_b > 0 && self.fadc > 0
    }
}

/// Per-sample averages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PedestalAverages {
    pub atwd: [[[u16; ATWD_SAMPLES]; ATWD_CHANNELS]; ATWD_CHIPS],
    pub fadc: [u16; FADC_SAMPLES],
}

impl PedestalAverages {
    pub fn zeroed() -> Self {
        Self {
            atwd: [[[0; ATWD_SAMPLES]; ATWD_CHANNELS]; ATWD_CHIPS],
            fadc: [0; FADC_SAMPLES],
        }
    }

    /// Remove each ATWD channel's own mean, leaving only the per-sample
    /// fingerprint. FADC averages are kept as they are.
    pub fn fingerprint(&self) -> Self {
        let mut out = self.clone();
        for channel in out.atwd.iter_mut().flatten() {
            let mean = channel.iter().map(|&v| v as u32).sum::<u32>() / ATWD_SAMPLES as u32;
            for v in channel.iter_mut() {
                *v = v.wrapping_sub(mean as u16);
            }
        }
        out
    }
}

impl Default for PedestalAverages {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// One averaging pass over both chips
#[derive(Debug, Clone)]
pub(crate) struct Pass {
    pub averages: PedestalAverages,
    pub counts: PedestalCounts,
    pub missed: u32,
}

/// Worst disagreement between two passes
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Contamination {
    pub baseline_shift: f64,
    pub autocorrelation: f64,
}

impl Contamination {
    pub fn exceeds(&self, cfg: &PedestalConfig) -> bool {
        self.baseline_shift > cfg.max_baseline_shift
            || self.autocorrelation > cfg.max_autocorrelation
    }
}

/// Program the FPGA for forced-trigger pedestal waveforms.
///
/// Returns the lookback position of the first pedestal event.
pub(crate) fn prepare<H: DomHal>(hal: &mut H) -> LbmIndex {
    hal.disable_local_coincidence();
    hal.disable_daq();
    hal.lbm_reset();
    hal.sleep_us(SETTLE_US);
    hal.lbm_reset();
    let start = hal.lbm_pointer();
    hal.trigger_source(TriggerSource::FORCED);
    hal.cal_source(CalSource::FORCED);
    hal.cal_mode(CalMode::Forced);
    hal.daq_mode(DaqMode::AtwdFadc);
    hal.atwd_mode(AtwdMode::Testing);
    hal.lbm_mode(LbmMode::Wrap);
    hal.compression_mode(CompressionMode::Off);
    hal.rate_monitor_enable(RateMonitor::empty());
    start
}

pub(crate) fn finish<H: DomHal>(hal: &mut H) {
    hal.disable_daq();
    hal.cal_mode(CalMode::Off);
}

enum Rejected {
    Truncated,
    Compressed,
    AtwdSize(u32),
    NoFadc,
    NoAtwd,
}

impl Rejected {
    fn kind(&self) -> WarningKind {
        match self {
            Rejected::Truncated => WarningKind::CORRUPT_HIT,
            Rejected::Compressed => WarningKind::UNEXPECTED_COMPRESSION,
            Rejected::AtwdSize(_) => WarningKind::ATWD_SIZE,
            Rejected::NoFadc => WarningKind::FADC_MISSING,
            Rejected::NoAtwd => WarningKind::ATWD_MISSING,
        }
    }
}

impl std::fmt::Display for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejected::Truncated => write!(f, "event slot too short"),
            Rejected::Compressed => write!(f, "got compressed data"),
            Rejected::AtwdSize(size) => write!(f, "ATWD size {} should be 3", size),
            Rejected::NoFadc => write!(f, "no FADC data present"),
            Rejected::NoAtwd => write!(f, "no ATWD data present"),
        }
    }
}

fn check_slot(slot: &[u8]) -> Result<EngineeringEvent<'_>, Rejected> {
    let event = EngineeringEvent::decode(slot).map_err(|_| Rejected::Truncated)?;
    let w0 = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
    if w0 & COMPRESS_FLAG != 0 {
        return Err(Rejected::Compressed);
    }
    if event.atwd_size() != 3 {
        return Err(Rejected::AtwdSize(event.atwd_size()));
    }
    if !event.fadc_present() {
        return Err(Rejected::NoFadc);
    }
    if !event.atwd_present() {
        return Err(Rejected::NoAtwd);
    }
    Ok(event)
}

/// Collect one average of both chips, reading events from `*cursor` on
pub(crate) fn collect_pass<H: DomHal>(
    ctx: &mut AcquisitionContext,
    hal: &mut H,
    goals: &PedestalGoals,
    cursor: &mut LbmIndex,
) -> Result<Pass, RunError> {
    let geometry = *ctx.geometry();
    let mut atwd_sum = [[[0u32; ATWD_SAMPLES]; ATWD_CHANNELS]; ATWD_CHIPS];
    let mut fadc_sum = [0u32; FADC_SAMPLES];
    let mut counts = PedestalCounts::default();
    let mut missed_total = 0;

    for chip in 0..ATWD_CHIPS {
        hal.enable_atwds(if chip == 0 { AtwdSelect::A } else { AtwdSelect::B });
        hal.enable_daq();
        let mut missed = 0;

        for _ in 0..goals.for_chip(chip) {
            hal.cal_launch();
            let mut written = false;
            for _ in 0..LAUNCH_TRIALS {
                hal.sleep_us(LAUNCH_TRIAL_US);
                if geometry.unread(hal.lbm_pointer(), *cursor) >= geometry.event_size() {
                    written = true;
                    break;
                }
            }
            if !written {
                missed += 1;
                if ctx.warnings_mut().first(WarningKind::MISSED_CAL_TRIGGER) {
                    warn!(
                        "Pedestal run: missed calibration trigger for ATWD {} (lbmp={} fpga={})",
                        chip,
                        cursor,
                        hal.lbm_pointer()
                    );
                }
                continue;
            }

            let view = RingView::new(geometry, hal.lbm_memory())?;
            let slot = view.event(*cursor);
            *cursor = geometry.advance(*cursor);
            let event = match check_slot(&slot) {
                Ok(event) => event,
                Err(rejected) => {
                    missed += 1;
                    if ctx.warnings_mut().first(rejected.kind()) {
                        warn!("Pedestal run: {} (ATWD {})", rejected, chip);
                    }
                    continue;
                }
            };

            for (ch, sums) in atwd_sum[chip].iter_mut().enumerate() {
                for (i, sum) in sums.iter_mut().enumerate() {
                    *sum += (event.atwd_sample(ch, i) & SAMPLE_MASK) as u32;
                }
            }
            if counts.fadc < goals.fadc {
                for (i, sum) in fadc_sum.iter_mut().enumerate() {
                    *sum += (event.fadc_sample(i) & SAMPLE_MASK) as u32;
                }
                counts.fadc += 1;
            }
            if chip == 0 {
                counts.atwd_a += 1;
            } else {
                counts.atwd_b += 1;
            }
        }

        info!(
            "Pedestal triggers for ATWD {}: {} (missed {})",
            chip,
            counts.chip(chip),
            missed
        );
        missed_total += missed;
    }

    let mut averages = PedestalAverages::zeroed();
    for chip in 0..ATWD_CHIPS {
        let n = counts.chip(chip);
        if n == 0 {
            continue;
        }
        for (avg, sums) in averages.atwd[chip].iter_mut().zip(&atwd_sum[chip]) {
            for (a, &s) in avg.iter_mut().zip(sums) {
                *a = (s / n) as u16;
            }
        }
    }
    if counts.fadc > 0 {
        for (a, &s) in averages.fadc.iter_mut().zip(&fadc_sum) {
            *a = (s / counts.fadc) as u16;
        }
    }

    Ok(Pass {
        averages,
        counts,
        missed: missed_total,
    })
}

/// Lag-1 autocorrelation; zero for a flat series
fn lag1_autocorrelation(d: &[f64], mean: f64) -> f64 {
    let var: f64 = d.iter().map(|x| (x - mean).powi(2)).sum();
    if var <= f64::EPSILON {
        return 0.0;
    }
    let cov: f64 = d.windows(2).map(|w| (w[0] - mean) * (w[1] - mean)).sum();
    cov / var
}

fn compare_series(a: &[u16], b: &[u16]) -> Contamination {
    let d: Vec<f64> = a.iter().zip(b).map(|(&x, &y)| y as f64 - x as f64).collect();
    let mean = d.iter().sum::<f64>() / d.len() as f64;
    Contamination {
        baseline_shift: mean.abs(),
        autocorrelation: lag1_autocorrelation(&d, mean),
    }
}

/// Worst channel disagreement between two passes.
///
/// Digitizers that collected nothing in either pass are not compared.
pub(crate) fn contamination(first: &Pass, second: &Pass) -> Contamination {
    let mut worst = Contamination::default();
    let mut take = |c: Contamination| {
        worst.baseline_shift = worst.baseline_shift.max(c.baseline_shift);
        worst.autocorrelation = worst.autocorrelation.max(c.autocorrelation);
    };
    for chip in 0..ATWD_CHIPS {
        if first.counts.chip(chip) == 0 || second.counts.chip(chip) == 0 {
            continue;
        }
        for (a, b) in first.averages.atwd[chip].iter().zip(&second.averages.atwd[chip]) {
            take(compare_series(a, b));
        }
    }
    if first.counts.fadc > 0 && second.counts.fadc > 0 {
        take(compare_series(&first.averages.fadc, &second.averages.fadc));
    }
    debug!(
        "Pedestal pass comparison: baseline shift {:.2}, autocorrelation {:.3}",
        worst.baseline_shift, worst.autocorrelation
    );
    worst
}
