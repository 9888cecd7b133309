//! HAL Error Types

use thiserror::Error;

/// Hardware operations that can fail
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// Flasher board CPLD configuration took too long
    #[error("Flasher board configuration time too long")]
    FlasherConfigTime,

    /// Flasher board clock never validated
    #[error("Flasher board clock validation time too long")]
    FlasherValidTime,

    /// Supernova scaler system refused to start
    #[error("Supernova scaler start failed: {0}")]
    SupernovaStart(String),
}
