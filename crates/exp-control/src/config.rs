//! Run control configuration

use dom_hal::{AtwdSelect, DaqMode, TriggerSource};
use serde::{Deserialize, Serialize};

/// Trigger mode as requested by the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    TestPattern,
    /// CPU-forced triggers only
    #[default]
    Cpu,
    SpeDisc,
    Flasher,
    MpeDisc,
    FePulser,
    MbLed,
    LcUp,
    LcDown,
}

impl TriggerMode {
    /// Trigger-source register bits for this mode
    pub fn sources(self) -> TriggerSource {
        match self {
            TriggerMode::TestPattern => TriggerSource::FE_R2R,
            TriggerMode::Cpu => TriggerSource::FORCED,
            TriggerMode::SpeDisc => TriggerSource::SPE,
            TriggerMode::Flasher => TriggerSource::FLASHER,
            TriggerMode::MpeDisc => TriggerSource::MPE,
            TriggerMode::FePulser => TriggerSource::FE_PULSER,
            TriggerMode::MbLed => TriggerSource::LED,
            TriggerMode::LcUp => TriggerSource::LC_UP,
            TriggerMode::LcDown => TriggerSource::LC_DOWN,
        }
    }

    /// Discriminator modes, the only ones usable with the front-end pulser
    pub fn is_discriminator(self) -> bool {
        matches!(self, TriggerMode::SpeDisc | TriggerMode::MpeDisc)
    }
}

impl TryFrom<u8> for TriggerMode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        Ok(match code {
            0 => TriggerMode::TestPattern,
            1 => TriggerMode::Cpu,
            2 => TriggerMode::SpeDisc,
            3 => TriggerMode::Flasher,
            4 => TriggerMode::MpeDisc,
            5 => TriggerMode::FePulser,
            6 => TriggerMode::MbLed,
            7 => TriggerMode::LcUp,
            8 => TriggerMode::LcDown,
            other => return Err(other),
        })
    }
}

/// Supernova scaler collection armed at run start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupernovaRequest {
    pub mode: u8,
    /// Artificial deadtime in nanoseconds
    pub deadtime: u32,
}

/// Settings applied at the next run start.
///
/// Slow control owns these between runs; ending a run reverts the
/// calibration flags and trigger modes to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub trigger_mode: TriggerMode,
    pub alt_trigger_mode: TriggerMode,
    pub daq_mode: DaqMode,
    pub atwd_select: AtwdSelect,
    /// Forced-trigger / pulser rate (Hz)
    pub pulser_rate: u16,
    pub pulser_running: bool,
    pub mb_led_running: bool,
    /// Allow non-standard trigger, calibration and DAQ modes
    pub extended_mode: bool,
    pub supernova: Option<SupernovaRequest>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            trigger_mode: TriggerMode::Cpu,
            alt_trigger_mode: TriggerMode::Cpu,
            daq_mode: DaqMode::AtwdFadc,
            atwd_select: AtwdSelect::all(),
            pulser_rate: 1,
            pulser_running: false,
            mb_led_running: false,
            extended_mode: false,
            supernova: None,
        }
    }
}

impl RunConfig {
    /// Revert what a run end clears
    pub fn reset_run_flags(&mut self) {
        self.extended_mode = false;
        self.mb_led_running = false;
        self.pulser_running = false;
        self.trigger_mode = TriggerMode::Cpu;
        self.alt_trigger_mode = TriggerMode::Cpu;
        self.daq_mode = DaqMode::AtwdFadc;
    }
}

/// PMT high-voltage / flasher interlock limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterlockConfig {
    /// HV readback at or below this counts as off
    pub max_hvadc_off: u16,
    /// Extended mode, HV on: brightness ceiling
    pub max_brightness_hv_on: u8,
    /// Extended mode, HV on: pulse width ceiling
    pub max_width_hv_on: u8,
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            max_hvadc_off: 20,
            max_brightness_hv_on: 30,
            max_width_hv_on: 20,
        }
    }
}

/// Pedestal collection limits and light-contamination thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PedestalConfig {
    /// Compare two successive averages before programming the result
    pub contamination_check: bool,
    /// Largest tolerated shift of a channel's mean between passes (ADC counts)
    pub max_baseline_shift: f64,
    /// Largest tolerated lag-1 autocorrelation of the pass difference
    pub max_autocorrelation: f64,
    /// Extra passes after a contaminated comparison
    pub max_retries: u32,
}

impl Default for PedestalConfig {
    fn default() -> Self {
        Self {
            contamination_check: true,
            max_baseline_shift: 2.0,
            max_autocorrelation: 0.5,
            max_retries: 3,
        }
    }
}
