//! Data Format and Compression Selection

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Configured output data format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataFormat {
    #[default]
    Engineering = 0,
    RoadGrade = 1,
    Delta = 2,
}

impl TryFrom<u8> for DataFormat {
    type Error = CodecError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Engineering),
            1 => Ok(Self::RoadGrade),
            2 => Ok(Self::Delta),
            _ => Err(CodecError::UnknownFormat(v)),
        }
    }
}

/// Configured compression mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Compression {
    #[default]
    None = 0,
    RoadGrade = 1,
    Delta = 2,
}

impl TryFrom<u8> for Compression {
    type Error = CodecError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::None),
            1 => Ok(Self::RoadGrade),
            2 => Ok(Self::Delta),
            _ => Err(CodecError::UnknownCompression(v)),
        }
    }
}

/// Codec chosen for a (format, compression) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    Engineering,
    RoadGrade,
    Delta,
}

impl CodecKind {
    /// The only valid pairs are (Eng, None), (RG, RG) and (Delta, Delta)
    pub fn select(format: DataFormat, compression: Compression) -> Result<Self, CodecError> {
        match (format, compression) {
            (DataFormat::Engineering, Compression::None) => Ok(Self::Engineering),
            (DataFormat::RoadGrade, Compression::RoadGrade) => Ok(Self::RoadGrade),
            (DataFormat::Delta, Compression::Delta) => Ok(Self::Delta),
            _ => Err(CodecError::InvalidCombination {
                format: format as u8,
                compression: compression as u8,
            }),
        }
    }

    /// Events are firmware-compressed hits rather than raw waveforms
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::Engineering)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pairs() {
        assert_eq!(
            CodecKind::select(DataFormat::Engineering, Compression::None),
            Ok(CodecKind::Engineering)
        );
        assert_eq!(
            CodecKind::select(DataFormat::Delta, Compression::Delta),
            Ok(CodecKind::Delta)
        );
        assert_eq!(
            CodecKind::select(DataFormat::RoadGrade, Compression::RoadGrade),
            Ok(CodecKind::RoadGrade)
        );
    }

    #[test]
    fn test_mixed_pair_is_an_error() {
        assert_eq!(
            CodecKind::select(DataFormat::Delta, Compression::None),
            Err(CodecError::InvalidCombination {
                format: 2,
                compression: 0
            })
        );
        assert!(CodecKind::select(DataFormat::Engineering, Compression::Delta).is_err());
    }

    #[test]
    fn test_from_wire_byte() {
        assert_eq!(DataFormat::try_from(2), Ok(DataFormat::Delta));
        assert_eq!(Compression::try_from(7), Err(CodecError::UnknownCompression(7)));
    }
}
