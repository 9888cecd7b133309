//! FPGA Register Values

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Trigger sources, as written to the trigger-source register and
    /// reported in the low byte of an event's trigger word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TriggerSource: u32 {
        /// CPU-forced (periodic / beacon) trigger
        const FORCED    = 1 << 0;
        /// Single photoelectron discriminator
        const SPE       = 1 << 1;
        /// Multiple photoelectron discriminator
        const MPE       = 1 << 2;
        /// Flasher board firing
        const FLASHER   = 1 << 3;
        /// Front-end pulser
        const FE_PULSER = 1 << 4;
        /// Mainboard LED
        const LED       = 1 << 5;
        /// Local coincidence from above
        const LC_UP     = 1 << 6;
        /// Local coincidence from below
        const LC_DOWN   = 1 << 7;
        /// Front-end R2R ladder test pattern
        const FE_R2R    = 1 << 8;
    }
}

bitflags::bitflags! {
    /// Calibration sources
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CalSource: u32 {
        const FORCED    = 1 << 0;
        const FE_PULSER = 1 << 1;
        const LED       = 1 << 2;
        const FLASHER   = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Rate monitor channels
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RateMonitor: u32 {
        const SPE             = 1 << 0;
        const MPE             = 1 << 1;
        const DEADTIME_ATWD_A = 1 << 2;
        const DEADTIME_ATWD_B = 1 << 3;
    }
}

bitflags::bitflags! {
    /// ATWD chips enabled for digitization
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AtwdSelect: u32 {
        const A = 1 << 0;
        const B = 1 << 1;
    }
}

/// Calibration launch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalMode {
    #[default]
    Off,
    Repeat,
    Forced,
}

/// Which digitizers contribute to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaqMode {
    #[default]
    AtwdFadc,
    Fadc,
    Timestamp,
}

/// ATWD readout policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtwdMode {
    /// Always read out all channels (uncompressed engineering events)
    #[default]
    Testing,
    /// Beacon-hit readout used with compression
    Beacon,
}

/// Lookback memory write policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LbmMode {
    #[default]
    Wrap,
    Stop,
}

/// Firmware compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMode {
    #[default]
    Off,
    On,
}
