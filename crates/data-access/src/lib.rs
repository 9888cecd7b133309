//! DOM Data Access
//!
//! Drains the lookback memory into bounded outgoing messages. All mutable
//! acquisition state (read cursor, counters, warning flags, histogram)
//! lives in one [`AcquisitionContext`]; [`MessageBatchPacker`] borrows it
//! immutably for a dry-run count and mutably for a fill.

mod config;
mod context;
mod error;
mod interval;
pub mod message;
mod packer;
mod supernova;
mod warnings;

pub use config::{AcquisitionConfig, EngineeringFormatConfig, LbmConfig, RateType};
pub use context::AcquisitionContext;
pub use error::AccessError;
pub use interval::{IntervalAction, IntervalService};
pub use message::{Message, MessageHeader};
pub use packer::{BatchSummary, MessageBatchPacker, StopReason};
pub use supernova::{SupernovaStream, SN_FORMAT_ID, STD_DT};
pub use warnings::{WarningKind, WarningState};
