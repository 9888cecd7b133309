//! Run Control Error Types

use dom_hal::HalError;
use lbm::LbmError;
use thiserror::Error;

use crate::state::RunState;

/// Reasons a run-control operation was refused or failed.
///
/// A refusal is always reported before any register is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("DOM not idle ({0})")]
    NotIdle(RunState),

    #[error("No run in progress ({0})")]
    NotRunning(RunState),

    #[error("No flasher run in progress ({0})")]
    NotFlasherRun(RunState),

    /// Normal mode requires the PMT high voltage to be off
    #[error("PMT high voltage on during flasher request: HV ADC {adc} > {limit}")]
    HighVoltageOn { adc: u16, limit: u16 },

    /// Extended mode with HV on allows a single LED
    #[error("Flasher interlock: {leds} LEDs enabled with HV on (mask 0x{mask:04x})")]
    TooManyLeds { leds: u32, mask: u16 },

    /// Extended mode with HV on caps emission
    #[error("Flasher interlock: emission too high with HV on (brightness {brightness}, width {width})")]
    FlasherTooBright { brightness: u8, width: u8 },

    #[error("Flasher delay {0} outside -200..=175")]
    BadFlasherDelay(i16),

    #[error("Mainboard LED requested outside extended mode")]
    LedNeedsExtendedMode,

    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    #[error("Lookback memory error: {0}")]
    Lbm(#[from] LbmError),

    #[error("Too many pedestal triggers requested: ATWD A {atwd_a}, ATWD B {atwd_b}, FADC {fadc}")]
    TooManyPeds { atwd_a: u32, atwd_b: u32, fadc: u32 },

    #[error("Pedestal averages not available")]
    PedestalsNotAvailable,

    /// Successive pedestal averages kept disagreeing
    #[error("Pedestal collection contaminated by light after {attempts} passes")]
    PedestalContaminated { attempts: u32 },

    #[error("Command payload too short: need {need} bytes, have {have}")]
    ShortPayload { need: usize, have: usize },
}
