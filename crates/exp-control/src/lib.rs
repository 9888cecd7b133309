//! DOM Experiment Control
//!
//! The [`RunStateMachine`] owns the DOM run state and is the only code that
//! reprograms the FPGA for acquisition: normal runs, flasher board runs
//! behind the PMT high-voltage interlock, and pedestal collection with a
//! light-contamination check. [`ExpControl`] exposes it to the surface as
//! request/reply messages.

pub mod commands;
mod config;
mod error;
mod flasher;
mod machine;
mod pedestal;
mod state;

pub use commands::{ExpControl, LastError, ServiceStats};
pub use config::{InterlockConfig, PedestalConfig, RunConfig, SupernovaRequest, TriggerMode};
pub use error::RunError;
pub use flasher::{check_interlock, FlasherSettings, FLASHER_DELAY_RANGE};
pub use machine::RunStateMachine;
pub use pedestal::{PedestalAverages, PedestalCounts, PedestalGoals, MAX_PED_GOAL};
pub use state::RunState;
