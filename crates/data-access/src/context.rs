//! Acquisition State

use event_codec::{
    ChargeStampHistogram, CodecKind, Compression, DataFormat, EncodeContext, EngineeringFormat,
};
use lbm::{LbmGeometry, LbmIndex, OverflowGuard};
use tracing::{debug, info};

use crate::config::{AcquisitionConfig, RateType};
use crate::error::AccessError;
use crate::warnings::WarningState;

/// Everything the readout path reads or mutates.
///
/// The read cursor is only moved by a committing fill, an overflow resync
/// or a run start.
#[derive(Debug, Clone)]
pub struct AcquisitionContext {
    guard: OverflowGuard,
    read: LbmIndex,

    format: DataFormat,
    compression: Compression,
    codec: CodecKind,
    encode: EncodeContext,
    rate_type: RateType,

    hits: u64,
    hits_total: u64,
    triggers_read_out: u64,

    warnings: WarningState,
    histogram: ChargeStampHistogram,
    histogram_interval_secs: u32,
}

impl AcquisitionContext {
    pub fn new(config: &AcquisitionConfig, geometry: LbmGeometry) -> Result<Self, AccessError> {
        let codec = CodecKind::select(config.data_format, config.compression)?;
        info!(
            "Acquisition context: format={:?} compression={:?} depth mask=0x{:08x}",
            config.data_format,
            config.compression,
            geometry.depth_mask()
        );
        Ok(Self {
            guard: OverflowGuard::new(geometry),
            read: LbmIndex::new(0),
            format: config.data_format,
            compression: config.compression,
            codec,
            encode: EncodeContext {
                format: config.engineering.into(),
                fb_run: false,
            },
            rate_type: config.rate_type,
            hits: 0,
            hits_total: 0,
            triggers_read_out: 0,
            warnings: WarningState::default(),
            histogram: ChargeStampHistogram::new(
                config.charge_stamp_mode,
                config.histogram_prescale,
            ),
            histogram_interval_secs: config.histogram_interval_secs,
        })
    }

    pub fn geometry(&self) -> &LbmGeometry {
        self.guard.geometry()
    }

    pub fn read_cursor(&self) -> LbmIndex {
        self.read
    }

    pub(crate) fn guard_and_cursor(&mut self) -> (&mut OverflowGuard, &mut LbmIndex) {
        (&mut self.guard, &mut self.read)
    }

    pub(crate) fn set_read_cursor(&mut self, read: LbmIndex) {
        self.read = read;
    }

    /// Select the output format; an invalid pair leaves the current one
    pub fn set_data_format(
        &mut self,
        format: DataFormat,
        compression: Compression,
    ) -> Result<(), AccessError> {
        self.codec = CodecKind::select(format, compression)?;
        self.format = format;
        self.compression = compression;
        debug!("Data format set to {:?}/{:?}", format, compression);
        Ok(())
    }

    pub fn data_format(&self) -> (DataFormat, Compression) {
        (self.format, self.compression)
    }

    pub fn codec(&self) -> CodecKind {
        self.codec
    }

    pub fn set_engineering_format(&mut self, fadc_samples: u8, atwd01_mask: u8, atwd23_mask: u8) {
        self.encode.format = EngineeringFormat::new(fadc_samples, atwd01_mask, atwd23_mask);
    }

    pub fn engineering_format(&self) -> &EngineeringFormat {
        &self.encode.format
    }

    pub(crate) fn encode_context(&self) -> &EncodeContext {
        &self.encode
    }

    /// Change the software depth; rejected values leave the geometry as is
    pub fn set_lbm_depth(&mut self, depth_bits: u32) -> Result<(), AccessError> {
        let geometry = self.guard.geometry().with_depth_bits(depth_bits)?;
        self.guard.set_geometry(geometry);
        info!("LBM depth set to {} bits", depth_bits);
        Ok(())
    }

    pub fn rate_type(&self) -> RateType {
        self.rate_type
    }

    pub fn set_rate_type(&mut self, rate_type: RateType) {
        self.rate_type = rate_type;
    }

    /// Arm readout for a new run: cursor at `write`, counters and
    /// once-per-run warnings cleared.
    pub fn begin_run(&mut self, write: LbmIndex, fb_run: bool) {
        self.read = write;
        self.encode.fb_run = fb_run;
        self.hits = 0;
        self.triggers_read_out = 0;
        self.warnings.reset();
        self.guard.reset_count();
    }

    pub fn end_run(&mut self) {
        self.encode.fb_run = false;
    }

    pub fn fb_run(&self) -> bool {
        self.encode.fb_run
    }

    pub fn overflow_count(&self) -> u64 {
        self.guard.overflow_count()
    }

    /// Hits since the last [`Self::take_hit_count`]
    pub fn hit_count(&self) -> u64 {
        self.hits
    }

    /// Read and clear the hit counter (monitoring uses this once per interval)
    pub fn take_hit_count(&mut self) -> u64 {
        std::mem::take(&mut self.hits)
    }

    /// Hits since process start
    pub fn hits_total(&self) -> u64 {
        self.hits_total
    }

    pub fn triggers_read_out(&self) -> u64 {
        self.triggers_read_out
    }

    pub(crate) fn add_counts(&mut self, hits: u64, triggers: u64) {
        self.hits += hits;
        self.hits_total += hits;
        self.triggers_read_out += triggers;
    }

    pub fn warnings(&self) -> &WarningState {
        &self.warnings
    }

    pub fn warnings_mut(&mut self) -> &mut WarningState {
        &mut self.warnings
    }

    pub fn histogram(&self) -> &ChargeStampHistogram {
        &self.histogram
    }

    pub fn histogram_mut(&mut self) -> &mut ChargeStampHistogram {
        &mut self.histogram
    }

    pub fn histogram_interval_secs(&self) -> u32 {
        self.histogram_interval_secs
    }

    pub fn set_histogram_interval_secs(&mut self, secs: u32) {
        self.histogram_interval_secs = secs;
    }

    /// Charge stamps are binned only while an interval is configured
    pub fn histogramming(&self) -> bool {
        self.histogram_interval_secs > 0
    }
}
