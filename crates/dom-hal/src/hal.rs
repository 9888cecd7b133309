//! Hardware Collaborator Interface

use lbm::LbmIndex;

use crate::error::HalError;
use crate::flags::{
    AtwdMode, AtwdSelect, CalMode, CalSource, CompressionMode, DaqMode, LbmMode, RateMonitor,
    TriggerSource,
};
use crate::ATWD_SAMPLES;

/// One supernova scaler bin as delivered by the FPGA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnSample {
    /// Clock ticks at the start of the bin
    pub ticks: u64,
    /// Raw scaler counts in the bin
    pub counts: u32,
    /// The FPGA's own scaler FIFO overflowed before this sample
    pub fifo_overflow: bool,
}

/// Supernova scaler FIFO
pub trait ScalerFifo {
    /// At least one sample is waiting
    fn sn_ready(&self) -> bool;

    /// Pop the oldest sample; `None` when empty
    fn sn_next(&mut self) -> Option<SnSample>;
}

/// Register-level access to the DOM mainboard.
///
/// Setters are fire-and-forget, as on the real FPGA. Implementations must
/// not block except in [`DomHal::sleep_us`].
pub trait DomHal: ScalerFifo {
    // Lookback memory

    /// Snapshot of the free-running hardware write pointer
    fn lbm_pointer(&self) -> LbmIndex;
    /// The physical lookback memory
    fn lbm_memory(&self) -> &[u8];
    fn lbm_reset(&mut self);
    fn lbm_mode(&mut self, mode: LbmMode);

    // Acquisition control

    fn enable_daq(&mut self);
    fn disable_daq(&mut self);
    fn daq_mode(&mut self, mode: DaqMode);
    fn atwd_mode(&mut self, mode: AtwdMode);
    fn enable_atwds(&mut self, atwds: AtwdSelect);
    fn compression_mode(&mut self, mode: CompressionMode);
    /// Let delta compression use every available ATWD channel
    fn delta_compression_all_available(&mut self);
    fn trigger_source(&mut self, source: TriggerSource);
    fn cal_source(&mut self, source: CalSource);
    fn cal_mode(&mut self, mode: CalMode);
    fn cal_pulser_rate(&mut self, hz: u16);
    /// Fire one forced calibration trigger
    fn cal_launch(&mut self);
    fn rate_monitor_enable(&mut self, monitors: RateMonitor);

    // Local coincidence (settings owned by slow control)

    fn apply_local_coincidence(&mut self);
    fn disable_local_coincidence(&mut self);

    // Supernova scalers

    fn sn_start(&mut self, mode: u8, deadtime: u32) -> Result<(), HalError>;
    fn sn_stop(&mut self);

    // Pedestals

    fn set_atwd_pedestal(&mut self, chip: usize, channel: usize, pattern: &[u16; ATWD_SAMPLES]);

    // PMT base and mainboard LED

    /// Raw high-voltage readback ADC
    fn base_hv_adc(&self) -> u16;
    fn power_down_base(&mut self);
    fn enable_led_power(&mut self);
    fn disable_led_power(&mut self);

    // Flasher board

    fn fb_enable(&mut self) -> Result<(), HalError>;
    fn fb_disable(&mut self);
    fn fb_set_brightness(&mut self, brightness: u8);
    fn fb_set_width(&mut self, width: u8);
    fn fb_enable_leds(&mut self, mask: u16);
    /// Route one LED's current to the ATWD mux
    fn fb_select_mux(&mut self, led: u8);
    fn fb_set_delay(&mut self, delay: i16);
    /// Program the flasher rate; returns the rate actually achieved
    fn fb_set_rate(&mut self, hz: u16) -> u16;

    // Clock

    /// Local clock in FPGA ticks
    fn clock_ticks(&self) -> u64;
    fn sleep_us(&mut self, us: u32);
}
