//! Experiment Control Command Dispatch
//!
//! Decodes run-control requests (big-endian payloads), maps them onto the
//! [`RunStateMachine`] and encodes the reply. Failed requests answer with
//! `SERVICE_SPECIFIC_ERROR | SEVERE_ERROR` and an empty payload; the error
//! id and text are kept for the last-error queries.

use data_access::message::{service, status};
use data_access::{AcquisitionContext, Message};
use dom_hal::DomHal;
use tracing::{debug, warn};

use crate::error::RunError;
use crate::flasher::FlasherSettings;
use crate::machine::RunStateMachine;
use crate::pedestal::PedestalGoals;

/// Request subtypes
pub mod subtype {
    pub const GET_SERVICE_STATE: u8 = 1;
    pub const GET_LAST_ERROR_ID: u8 = 2;
    pub const GET_LAST_ERROR_STR: u8 = 3;
    pub const CLEAR_LAST_ERROR: u8 = 5;
    pub const GET_SERVICE_STATS: u8 = 6;

    pub const BEGIN_RUN: u8 = 12;
    pub const END_RUN: u8 = 13;
    pub const GET_DOM_STATE: u8 = 15;
    pub const DO_PEDESTAL_COLLECTION: u8 = 16;
    pub const GET_NUM_PEDESTALS: u8 = 19;
    pub const GET_PEDESTAL_AVERAGES: u8 = 20;
    pub const BEGIN_FB_RUN: u8 = 27;
    pub const END_FB_RUN: u8 = 28;
    pub const CHANGE_FB_SETTINGS: u8 = 29;
}

/// Service-specific error ids
pub mod error_id {
    pub const NO_ERRORS: u8 = 0;
    pub const BAD_MSG_SUBTYPE: u8 = 1;
    pub const CANNOT_BEGIN_RUN: u8 = 5;
    pub const CANNOT_END_RUN: u8 = 6;
    pub const CANNOT_BEGIN_FB_RUN: u8 = 8;
    pub const CANNOT_END_FB_RUN: u8 = 9;
    pub const PEDESTAL_RUN_FAILED: u8 = 8;
    pub const TOO_MANY_PEDS: u8 = 9;
    pub const PEDESTALS_NOT_AVAIL: u8 = 10;
    pub const BAD_FB_DELAY: u8 = 11;
    pub const CANNOT_CHANGE_FB_SETTINGS: u8 = 12;
}

const SERVICE_ONLINE: u8 = 1;
const CONFIG_CHANGES_ALLOWED: u8 = 1;
const NO_ERRORS_STR: &str = "EXP: no errors";

/// Last error reported to the surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub id: u8,
    pub severity: u8,
    pub text: String,
}

impl Default for LastError {
    fn default() -> Self {
        Self {
            id: error_id::NO_ERRORS,
            severity: status::SUCCESS,
            text: NO_ERRORS_STR.to_string(),
        }
    }
}

/// Per-service message statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub received: u32,
    pub refused: u32,
    pub processing_errors: u32,
}

/// Error id for a failed `subtype`
pub fn error_id_for(subtype: u8, err: &RunError) -> u8 {
    match err {
        RunError::BadFlasherDelay(_) => error_id::BAD_FB_DELAY,
        RunError::TooManyPeds { .. } => error_id::TOO_MANY_PEDS,
        RunError::PedestalsNotAvailable => error_id::PEDESTALS_NOT_AVAIL,
        _ => match subtype {
            subtype::BEGIN_RUN => error_id::CANNOT_BEGIN_RUN,
            subtype::END_RUN => error_id::CANNOT_END_RUN,
            subtype::BEGIN_FB_RUN => error_id::CANNOT_BEGIN_FB_RUN,
            subtype::END_FB_RUN => error_id::CANNOT_END_FB_RUN,
            subtype::CHANGE_FB_SETTINGS => error_id::CANNOT_CHANGE_FB_SETTINGS,
            subtype::DO_PEDESTAL_COLLECTION => error_id::PEDESTAL_RUN_FAILED,
            _ => error_id::BAD_MSG_SUBTYPE,
        },
    }
}

fn be16(payload: &[u8], at: usize) -> Result<u16, RunError> {
    payload
        .get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(RunError::ShortPayload {
            need: at + 2,
            have: payload.len(),
        })
}

fn be32(payload: &[u8], at: usize) -> Result<u32, RunError> {
    payload
        .get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(RunError::ShortPayload {
            need: at + 4,
            have: payload.len(),
        })
}

/// `[brightness][width][delay i16][mask][rate]`, five big-endian shorts
pub fn decode_flasher(payload: &[u8]) -> Result<FlasherSettings, RunError> {
    let saturate = |v: u16| u8::try_from(v).unwrap_or(u8::MAX);
    Ok(FlasherSettings {
        brightness: saturate(be16(payload, 0)?),
        width: saturate(be16(payload, 2)?),
        delay: be16(payload, 4)? as i16,
        mask: be16(payload, 6)?,
        rate: be16(payload, 8)?,
    })
}

/// `[ATWD A goal][ATWD B goal][FADC goal]`, big-endian longs
pub fn decode_pedestal_goals(payload: &[u8]) -> Result<PedestalGoals, RunError> {
    Ok(PedestalGoals {
        atwd_a: be32(payload, 0)?,
        atwd_b: be32(payload, 4)?,
        fadc: be32(payload, 8)?,
    })
}

/// Inverse of [`decode_flasher`]
pub fn encode_flasher(settings: &FlasherSettings) -> Vec<u8> {
    [
        settings.brightness as u16,
        settings.width as u16,
        settings.delay as u16,
        settings.mask,
        settings.rate,
    ]
    .iter()
    .flat_map(|v| v.to_be_bytes())
    .collect()
}

/// Inverse of [`decode_pedestal_goals`]
pub fn encode_pedestal_goals(goals: &PedestalGoals) -> Vec<u8> {
    [goals.atwd_a, goals.atwd_b, goals.fadc]
        .iter()
        .flat_map(|v| v.to_be_bytes())
        .collect()
}

/// Experiment control service
#[derive(Debug, Clone)]
pub struct ExpControl {
    machine: RunStateMachine,
    last_error: LastError,
    stats: ServiceStats,
}

impl ExpControl {
    pub fn new(machine: RunStateMachine) -> Self {
        Self {
            machine,
            last_error: LastError::default(),
            stats: ServiceStats::default(),
        }
    }

    pub fn machine(&self) -> &RunStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut RunStateMachine {
        &mut self.machine
    }

    pub fn last_error(&self) -> &LastError {
        &self.last_error
    }

    pub fn stats(&self) -> ServiceStats {
        self.stats
    }

    /// Handle one request and build its reply
    pub fn handle<H: DomHal>(
        &mut self,
        ctx: &mut AcquisitionContext,
        hal: &mut H,
        subtype: u8,
        payload: &[u8],
    ) -> Message {
        self.stats.received += 1;
        debug!("Experiment control request {} ({} bytes)", subtype, payload.len());

        let result = match subtype {
            subtype::GET_SERVICE_STATE => Ok(vec![SERVICE_ONLINE]),
            subtype::GET_LAST_ERROR_ID => Ok(vec![self.last_error.id, self.last_error.severity]),
            subtype::GET_LAST_ERROR_STR => Ok(self.last_error.text.clone().into_bytes()),
            subtype::CLEAR_LAST_ERROR => {
                self.last_error = LastError::default();
                Ok(Vec::new())
            }
            subtype::GET_SERVICE_STATS => {
                let mut data = Vec::with_capacity(12);
                data.extend_from_slice(&self.stats.received.to_be_bytes());
                data.extend_from_slice(&self.stats.refused.to_be_bytes());
                data.extend_from_slice(&self.stats.processing_errors.to_be_bytes());
                Ok(data)
            }
            subtype::BEGIN_RUN => self.machine.begin_run(ctx, hal).map(|_| Vec::new()),
            subtype::END_RUN | subtype::END_FB_RUN => {
                self.machine.end_run(ctx, hal).map(|_| Vec::new())
            }
            subtype::BEGIN_FB_RUN => decode_flasher(payload)
                .and_then(|s| self.machine.begin_fb_run(ctx, hal, s))
                .map(|_| Vec::new()),
            subtype::CHANGE_FB_SETTINGS => decode_flasher(payload)
                .and_then(|s| self.machine.change_fb_settings(hal, s))
                .map(|_| Vec::new()),
            subtype::GET_DOM_STATE => Ok(self.dom_state()),
            subtype::DO_PEDESTAL_COLLECTION => decode_pedestal_goals(payload)
                .and_then(|g| self.machine.collect_pedestals(ctx, hal, g))
                .map(|_| Vec::new()),
            subtype::GET_NUM_PEDESTALS => {
                let counts = self.machine.pedestal_counts();
                let mut data = Vec::with_capacity(12);
                data.extend_from_slice(&counts.atwd_a.to_be_bytes());
                data.extend_from_slice(&counts.atwd_b.to_be_bytes());
                data.extend_from_slice(&counts.fadc.to_be_bytes());
                Ok(data)
            }
            subtype::GET_PEDESTAL_AVERAGES => self.machine.pedestal_averages().map(|avg| {
                avg.atwd
                    .iter()
                    .flatten()
                    .flatten()
                    .chain(avg.fadc.iter())
                    .flat_map(|v| v.to_be_bytes())
                    .collect::<Vec<u8>>()
            }),
            other => {
                warn!("Experiment control: bad message subtype {}", other);
                self.stats.refused += 1;
                return self.fail(
                    other,
                    error_id::BAD_MSG_SUBTYPE,
                    status::WARNING_ERROR,
                    format!("EXP: bad message subtype {}", other),
                );
            }
        };

        match result {
            Ok(data) => match Message::new(service::EXPERIMENT_CONTROL, subtype, data) {
                Ok(reply) => reply,
                Err(e) => self.fail(
                    subtype,
                    error_id::BAD_MSG_SUBTYPE,
                    status::SEVERE_ERROR,
                    e.to_string(),
                ),
            },
            Err(e) => {
                warn!("Experiment control request {} failed: {}", subtype, e);
                let id = error_id_for(subtype, &e);
                self.fail(subtype, id, status::SEVERE_ERROR, e.to_string())
            }
        }
    }

    fn fail(&mut self, subtype: u8, id: u8, severity: u8, text: String) -> Message {
        self.stats.processing_errors += 1;
        self.last_error = LastError { id, severity, text };
        Message::empty(service::EXPERIMENT_CONTROL, subtype)
            .with_status(status::SERVICE_SPECIFIC_ERROR | severity)
    }

    /// `[state][config access][status][command source][constraints BE u32][error text]`
    fn dom_state(&self) -> Vec<u8> {
        let mut data = vec![
            self.machine.state().code(),
            CONFIG_CHANGES_ALLOWED,
            status::SUCCESS,
            service::EXPERIMENT_CONTROL,
        ];
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(self.last_error.text.as_bytes());
        data
    }
}
