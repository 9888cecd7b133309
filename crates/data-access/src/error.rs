//! Data Access Error Types

use event_codec::CodecError;
use lbm::LbmError;
use thiserror::Error;

/// Errors from acquisition configuration and message framing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Lookback memory error: {0}")]
    Lbm(#[from] LbmError),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Message data too large: {len} bytes (max {max})")]
    MessageTooLarge { len: usize, max: usize },

    #[error("Message header truncated: {0} bytes")]
    TruncatedHeader(usize),
}
