//! Acquisition Configuration

use event_codec::{ChargeStampMode, Compression, DataFormat, EngineeringFormat};
use lbm::{LbmError, LbmGeometry, LBM_BLOCK_SIZE, LBM_EVENT_SIZE};
use serde::{Deserialize, Serialize};

/// Lookback memory geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LbmConfig {
    /// Physical buffer size as a power of two (21..=24)
    pub capacity_bits: u32,
    /// Width of the hardware write counter
    pub write_pointer_bits: u32,
    pub block_size: u32,
    /// Software depth (8..=24, at most `capacity_bits`)
    pub depth_bits: u32,
}

impl Default for LbmConfig {
    fn default() -> Self {
        Self {
            capacity_bits: lbm::DEFAULT_CAPACITY_BITS,
            write_pointer_bits: lbm::DEFAULT_WRITE_POINTER_BITS,
            block_size: LBM_BLOCK_SIZE,
            depth_bits: lbm::DEFAULT_CAPACITY_BITS,
        }
    }
}

impl LbmConfig {
    pub fn geometry(&self) -> Result<LbmGeometry, LbmError> {
        LbmGeometry::new(
            self.capacity_bits,
            self.write_pointer_bits,
            self.block_size,
            LBM_EVENT_SIZE,
        )?
        .with_depth_bits(self.depth_bits)
    }
}

/// Which delta hits count towards the fast-monitoring hit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    /// Hard local coincidence only; header-only hits are not counted
    #[default]
    Hlc,
    /// Every hit
    Slc,
}

/// Engineering record shape as three configuration bytes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineeringFormatConfig {
    pub fadc_samples: u8,
    pub atwd01_mask: u8,
    pub atwd23_mask: u8,
}

impl Default for EngineeringFormatConfig {
    fn default() -> Self {
        Self {
            fadc_samples: 255,
            atwd01_mask: 0xFF,
            atwd23_mask: 0xFF,
        }
    }
}

impl From<EngineeringFormatConfig> for EngineeringFormat {
    fn from(c: EngineeringFormatConfig) -> Self {
        EngineeringFormat::new(c.fadc_samples, c.atwd01_mask, c.atwd23_mask)
    }
}

/// Data format and readout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub data_format: DataFormat,
    pub compression: Compression,
    pub engineering: EngineeringFormatConfig,
    pub rate_type: RateType,
    /// Charge-stamp histogramming interval; 0 disables histogramming
    pub histogram_interval_secs: u32,
    pub histogram_prescale: u16,
    pub charge_stamp_mode: ChargeStampMode,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            data_format: DataFormat::Engineering,
            compression: Compression::None,
            engineering: EngineeringFormatConfig::default(),
            rate_type: RateType::Hlc,
            histogram_interval_secs: 0,
            histogram_prescale: 1,
            charge_stamp_mode: ChargeStampMode::Fadc,
        }
    }
}
