//! In-Memory DOM Simulation
//!
//! Stands in for the mainboard on a host: the lookback memory is a plain
//! byte vector, forced triggers synthesize baseline waveforms, and every
//! register write is recorded so tests can assert on the programming
//! sequence.

use std::collections::VecDeque;

use lbm::{LbmGeometry, LbmIndex};
use tracing::{debug, info};

use crate::error::HalError;
use crate::flags::{
    AtwdMode, AtwdSelect, CalMode, CalSource, CompressionMode, DaqMode, LbmMode, RateMonitor,
    TriggerSource,
};
use crate::hal::{DomHal, ScalerFifo, SnSample};
use crate::layout::{CompressedSlot, EngineeringSlot};
use crate::{ATWD_CHANNELS, ATWD_CHIPS, ATWD_SAMPLES, FADC_SAMPLES, TICKS_PER_SEC};

/// One recorded register access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HalCall {
    LbmReset,
    LbmMode(LbmMode),
    EnableDaq,
    DisableDaq,
    DaqMode(DaqMode),
    AtwdMode(AtwdMode),
    EnableAtwds(AtwdSelect),
    Compression(CompressionMode),
    DeltaAllAvailable,
    TriggerSource(TriggerSource),
    CalSource(CalSource),
    CalMode(CalMode),
    CalPulserRate(u16),
    CalLaunch,
    RateMonitors(RateMonitor),
    LcApply,
    LcDisable,
    SnStart { mode: u8, deadtime: u32 },
    SnStop,
    AtwdPedestal { chip: usize, channel: usize },
    PowerDownBase,
    LedPowerOn,
    LedPowerOff,
    FbEnable,
    FbDisable,
    FbBrightness(u8),
    FbWidth(u8),
    FbLeds(u16),
    FbMux(u8),
    FbDelay(i16),
    FbRate(u16),
    Sleep(u32),
}

/// Simulated mainboard
#[derive(Debug, Clone)]
pub struct SimulatedDom {
    geometry: LbmGeometry,
    memory: Vec<u8>,
    write: LbmIndex,
    clock: u64,
    calls: Vec<HalCall>,

    daq_enabled: bool,
    trigger: TriggerSource,
    atwds: AtwdSelect,
    lc_enabled: bool,

    sn_fifo: VecDeque<SnSample>,
    sn_running: bool,
    sn_start_fails: bool,

    hv_adc: u16,
    base_powered: bool,
    led_power: bool,
    fb_enabled: bool,
    fb_enable_fails: bool,

    pedestals: [[[u16; ATWD_SAMPLES]; ATWD_CHANNELS]; ATWD_CHIPS],
    fadc_baseline: u16,
    atwd_baseline: u16,
    light: Option<fn(u32) -> u16>,
    launches: u32,
    missed_launches: u32,
}

impl SimulatedDom {
    /// Powered-up board with an empty lookback memory of the given geometry
    pub fn new(geometry: LbmGeometry) -> Self {
        info!(
            "Creating simulated DOM ({} byte LBM, write pointer mask 0x{:08x})",
            geometry.capacity(),
            geometry.write_pointer_mask()
        );
        Self {
            geometry,
            memory: vec![0u8; geometry.capacity()],
            write: LbmIndex::new(0),
            clock: 0,
            calls: Vec::new(),
            daq_enabled: false,
            trigger: TriggerSource::empty(),
            atwds: AtwdSelect::all(),
            lc_enabled: false,
            sn_fifo: VecDeque::new(),
            sn_running: false,
            sn_start_fails: false,
            hv_adc: 0,
            base_powered: true,
            led_power: false,
            fb_enabled: false,
            fb_enable_fails: false,
            pedestals: [[[0; ATWD_SAMPLES]; ATWD_CHANNELS]; ATWD_CHIPS],
            fadc_baseline: 100,
            atwd_baseline: 130,
            light: None,
            launches: 0,
            missed_launches: 0,
        }
    }

    pub fn geometry(&self) -> &LbmGeometry {
        &self.geometry
    }

    /// Register accesses since creation or the last [`Self::clear_calls`]
    pub fn calls(&self) -> &[HalCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn daq_enabled(&self) -> bool {
        self.daq_enabled
    }

    pub fn trigger(&self) -> TriggerSource {
        self.trigger
    }

    pub fn lc_enabled(&self) -> bool {
        self.lc_enabled
    }

    pub fn sn_running(&self) -> bool {
        self.sn_running
    }

    pub fn base_powered(&self) -> bool {
        self.base_powered
    }

    pub fn led_power(&self) -> bool {
        self.led_power
    }

    pub fn fb_enabled(&self) -> bool {
        self.fb_enabled
    }

    pub fn pedestal(&self, chip: usize, channel: usize) -> &[u16; ATWD_SAMPLES] {
        &self.pedestals[chip][channel]
    }

    /// Forced triggers fired so far
    pub fn launches(&self) -> u32 {
        self.launches
    }

    pub fn set_hv_adc(&mut self, adc: u16) {
        self.hv_adc = adc;
    }

    pub fn set_sn_start_fails(&mut self, fails: bool) {
        self.sn_start_fails = fails;
    }

    pub fn set_fb_enable_fails(&mut self, fails: bool) {
        self.fb_enable_fails = fails;
    }

    /// Baselines written by forced triggers
    pub fn set_baselines(&mut self, fadc: u16, atwd: u16) {
        self.fadc_baseline = fadc;
        self.atwd_baseline = atwd;
    }

    /// Pulse amplitude added to forced-trigger waveforms, by launch number
    pub fn set_light(&mut self, light: Option<fn(u32) -> u16>) {
        self.light = light;
    }

    /// Make the next `n` forced triggers produce no event
    pub fn miss_launches(&mut self, n: u32) {
        self.missed_launches = n;
    }

    /// Move the hardware write pointer directly
    pub fn set_write_pointer(&mut self, index: LbmIndex) {
        self.write = index;
    }

    /// Advance the write pointer by `events` slots without writing data
    pub fn advance_write(&mut self, events: u32) {
        self.write = self.geometry.advance_by(self.write, events);
    }

    /// Write a slot at the write pointer and advance it by one event
    pub fn push_raw(&mut self, bytes: &[u8]) {
        let off = self.geometry.offset(self.write);
        let len = bytes.len().min(self.geometry.event_size() as usize);
        self.memory[off..off + len].copy_from_slice(&bytes[..len]);
        self.write = self.geometry.advance(self.write);
    }

    pub fn push_engineering(&mut self, slot: &EngineeringSlot) {
        let mut buf = vec![0u8; self.geometry.event_size() as usize];
        slot.write(&mut buf);
        self.push_raw(&buf);
    }

    pub fn push_compressed(&mut self, slot: &CompressedSlot) {
        let mut buf = vec![0u8; self.geometry.event_size() as usize];
        slot.write(&mut buf);
        self.push_raw(&buf);
    }

    /// Queue a supernova scaler sample
    pub fn push_sn(&mut self, ticks: u64, counts: u32) {
        self.sn_fifo.push_back(SnSample {
            ticks,
            counts,
            fifo_overflow: false,
        });
    }

    fn forced_event(&self, pulse: u16) -> EngineeringSlot {
        let mut fadc = vec![self.fadc_baseline; FADC_SAMPLES];
        for s in &mut fadc[20..24] {
            *s = s.saturating_add(pulse);
        }
        let atwd = std::array::from_fn(|ch| {
            let mut w: Vec<u16> = (0..ATWD_SAMPLES)
                .map(|i| self.atwd_baseline + 2 * ch as u16 + (i % 2) as u16)
                .collect();
            for s in &mut w[40..48] {
                *s = s.saturating_add(pulse >> ch);
            }
            w
        });
        EngineeringSlot::new(self.clock, TriggerSource::FORCED.bits())
            .with_fadc(fadc)
            .with_atwd(atwd)
    }
}

impl ScalerFifo for SimulatedDom {
    fn sn_ready(&self) -> bool {
        !self.sn_fifo.is_empty()
    }

    fn sn_next(&mut self) -> Option<SnSample> {
        self.sn_fifo.pop_front()
    }
}

impl DomHal for SimulatedDom {
    fn lbm_pointer(&self) -> LbmIndex {
        self.write
    }

    fn lbm_memory(&self) -> &[u8] {
        &self.memory
    }

    fn lbm_reset(&mut self) {
        self.calls.push(HalCall::LbmReset);
        self.write = LbmIndex::new(0);
    }

    fn lbm_mode(&mut self, mode: LbmMode) {
        self.calls.push(HalCall::LbmMode(mode));
    }

    fn enable_daq(&mut self) {
        self.calls.push(HalCall::EnableDaq);
        self.daq_enabled = true;
    }

    fn disable_daq(&mut self) {
        self.calls.push(HalCall::DisableDaq);
        self.daq_enabled = false;
    }

    fn daq_mode(&mut self, mode: DaqMode) {
        self.calls.push(HalCall::DaqMode(mode));
    }

    fn atwd_mode(&mut self, mode: AtwdMode) {
        self.calls.push(HalCall::AtwdMode(mode));
    }

    fn enable_atwds(&mut self, atwds: AtwdSelect) {
        self.calls.push(HalCall::EnableAtwds(atwds));
        self.atwds = atwds;
    }

    fn compression_mode(&mut self, mode: CompressionMode) {
        self.calls.push(HalCall::Compression(mode));
    }

    fn delta_compression_all_available(&mut self) {
        self.calls.push(HalCall::DeltaAllAvailable);
    }

    fn trigger_source(&mut self, source: TriggerSource) {
        self.calls.push(HalCall::TriggerSource(source));
        self.trigger = source;
    }

    fn cal_source(&mut self, source: CalSource) {
        self.calls.push(HalCall::CalSource(source));
    }

    fn cal_mode(&mut self, mode: CalMode) {
        self.calls.push(HalCall::CalMode(mode));
    }

    fn cal_pulser_rate(&mut self, hz: u16) {
        self.calls.push(HalCall::CalPulserRate(hz));
    }

    fn cal_launch(&mut self) {
        self.calls.push(HalCall::CalLaunch);
        let launch = self.launches;
        self.launches += 1;
        if !self.daq_enabled {
            return;
        }
        if self.missed_launches > 0 {
            self.missed_launches -= 1;
            debug!("Simulated DOM: dropping forced trigger {}", launch);
            return;
        }
        let pulse = self.light.map_or(0, |f| f(launch));
        let event = self.forced_event(pulse);
        self.push_engineering(&event);
        self.clock += TICKS_PER_SEC / 1000;
    }

    fn rate_monitor_enable(&mut self, monitors: RateMonitor) {
        self.calls.push(HalCall::RateMonitors(monitors));
    }

    fn apply_local_coincidence(&mut self) {
        self.calls.push(HalCall::LcApply);
        self.lc_enabled = true;
    }

    fn disable_local_coincidence(&mut self) {
        self.calls.push(HalCall::LcDisable);
        self.lc_enabled = false;
    }

    fn sn_start(&mut self, mode: u8, deadtime: u32) -> Result<(), HalError> {
        self.calls.push(HalCall::SnStart { mode, deadtime });
        if self.sn_start_fails {
            return Err(HalError::SupernovaStart(format!(
                "mode {} deadtime {} rejected",
                mode, deadtime
            )));
        }
        self.sn_running = true;
        Ok(())
    }

    fn sn_stop(&mut self) {
        self.calls.push(HalCall::SnStop);
        self.sn_running = false;
    }

    fn set_atwd_pedestal(&mut self, chip: usize, channel: usize, pattern: &[u16; ATWD_SAMPLES]) {
        self.calls.push(HalCall::AtwdPedestal { chip, channel });
        if chip < ATWD_CHIPS && channel < ATWD_CHANNELS {
            self.pedestals[chip][channel] = *pattern;
        }
    }

    fn base_hv_adc(&self) -> u16 {
        if self.base_powered {
            self.hv_adc
        } else {
            0
        }
    }

    fn power_down_base(&mut self) {
        self.calls.push(HalCall::PowerDownBase);
        self.base_powered = false;
    }

    fn enable_led_power(&mut self) {
        self.calls.push(HalCall::LedPowerOn);
        self.led_power = true;
    }

    fn disable_led_power(&mut self) {
        self.calls.push(HalCall::LedPowerOff);
        self.led_power = false;
    }

    fn fb_enable(&mut self) -> Result<(), HalError> {
        self.calls.push(HalCall::FbEnable);
        if self.fb_enable_fails {
            return Err(HalError::FlasherConfigTime);
        }
        self.fb_enabled = true;
        Ok(())
    }

    fn fb_disable(&mut self) {
        self.calls.push(HalCall::FbDisable);
        self.fb_enabled = false;
    }

    fn fb_set_brightness(&mut self, brightness: u8) {
        self.calls.push(HalCall::FbBrightness(brightness));
    }

    fn fb_set_width(&mut self, width: u8) {
        self.calls.push(HalCall::FbWidth(width));
    }

    fn fb_enable_leds(&mut self, mask: u16) {
        self.calls.push(HalCall::FbLeds(mask));
    }

    fn fb_select_mux(&mut self, led: u8) {
        self.calls.push(HalCall::FbMux(led));
    }

    fn fb_set_delay(&mut self, delay: i16) {
        self.calls.push(HalCall::FbDelay(delay));
    }

    fn fb_set_rate(&mut self, hz: u16) -> u16 {
        self.calls.push(HalCall::FbRate(hz));
        hz
    }

    fn clock_ticks(&self) -> u64 {
        self.clock
    }

    fn sleep_us(&mut self, us: u32) {
        self.calls.push(HalCall::Sleep(us));
        self.clock += us as u64 * (TICKS_PER_SEC / 1_000_000);
    }
}
