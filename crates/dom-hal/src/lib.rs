//! DOM Mainboard Hardware Abstraction
//!
//! The acquisition core talks to the FPGA, the PMT base and the flasher
//! board only through the [`DomHal`] trait. Register writes are treated as
//! infallible and synchronous; the two operations that can genuinely fail
//! (flasher board enable, supernova scaler start) return [`HalError`].
//!
//! [`SimulatedDom`] implements the trait in memory for tests and for running
//! the application on a host.

mod error;
mod flags;
mod hal;
pub mod layout;
mod sim;

pub use error::HalError;
pub use flags::{
    AtwdMode, AtwdSelect, CalMode, CalSource, CompressionMode, DaqMode, LbmMode, RateMonitor,
    TriggerSource,
};
pub use hal::{DomHal, ScalerFifo, SnSample};
pub use sim::{HalCall, SimulatedDom};

/// FPGA clock ticks per second (40 MHz)
pub const TICKS_PER_SEC: u64 = 40_000_000;

/// Samples per ATWD channel
pub const ATWD_SAMPLES: usize = 128;

/// Samples per FADC readout
pub const FADC_SAMPLES: usize = 256;

/// ATWD channels per chip
pub const ATWD_CHANNELS: usize = 4;

/// ATWD chips (A and B)
pub const ATWD_CHIPS: usize = 2;
