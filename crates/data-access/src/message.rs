//! Outgoing Message Framing
//!
//! Header: `[type][subtype][data length BE u16][reserved x2][message id][status]`
//! followed by at most [`MAX_DATA`] bytes of payload.

use crate::error::AccessError;

/// Largest payload of one message
pub const MAX_DATA: usize = 4096;

pub const HEADER_LEN: usize = 8;

/// Service (message type) codes
pub mod service {
    pub const MESSAGE_HANDLER: u8 = 1;
    pub const SLOW_CONTROL: u8 = 2;
    pub const DATA_ACCESS: u8 = 3;
    pub const EXPERIMENT_CONTROL: u8 = 4;
}

/// Data access subtypes
pub mod data_access {
    pub const GET_DATA: u8 = 11;
    pub const GET_NEXT_MONI_REC: u8 = 12;
    pub const GET_SN_DATA: u8 = 28;
}

/// Status byte values
pub mod status {
    pub const SUCCESS: u8 = 0x01;
    pub const WARNING_ERROR: u8 = 0x20;
    pub const SEVERE_ERROR: u8 = 0x40;
    pub const SERVICE_SPECIFIC_ERROR: u8 = 0x80;
}

/// Fixed 8-byte message header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub mtype: u8,
    pub subtype: u8,
    pub data_len: u16,
    pub msg_id: u8,
    pub status: u8,
}

impl MessageHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let [hi, lo] = self.data_len.to_be_bytes();
        [self.mtype, self.subtype, hi, lo, 0, 0, self.msg_id, self.status]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AccessError> {
        if bytes.len() < HEADER_LEN {
            return Err(AccessError::TruncatedHeader(bytes.len()));
        }
        Ok(Self {
            mtype: bytes[0],
            subtype: bytes[1],
            data_len: u16::from_be_bytes([bytes[2], bytes[3]]),
            msg_id: bytes[6],
            status: bytes[7],
        })
    }
}

/// Header plus owned payload, ready for the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    data: Vec<u8>,
}

impl Message {
    /// Successful message carrying `data`
    pub fn new(mtype: u8, subtype: u8, data: Vec<u8>) -> Result<Self, AccessError> {
        if data.len() > MAX_DATA {
            return Err(AccessError::MessageTooLarge {
                len: data.len(),
                max: MAX_DATA,
            });
        }
        Ok(Self {
            header: MessageHeader {
                mtype,
                subtype,
                data_len: data.len() as u16,
                msg_id: 0,
                status: status::SUCCESS,
            },
            data,
        })
    }

    /// Header-only message, typically an error reply
    pub fn empty(mtype: u8, subtype: u8) -> Self {
        Self {
            header: MessageHeader {
                mtype,
                subtype,
                data_len: 0,
                msg_id: 0,
                status: status::SUCCESS,
            },
            data: Vec::new(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn status(&self) -> u8 {
        self.header.status
    }

    pub fn with_status(mut self, status: u8) -> Self {
        self.header.status = status;
        self
    }

    pub fn with_id(mut self, msg_id: u8) -> Self {
        self.header.msg_id = msg_id;
        self
    }

    /// Header and payload as one frame
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}
