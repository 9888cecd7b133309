//! Run State Machine
//!
//! Every transition validates first and only then touches registers, so a
//! refused request leaves the hardware and the acquisition counters exactly
//! as they were.

use data_access::AcquisitionContext;
use dom_hal::{
    AtwdMode, CalMode, CalSource, CompressionMode, DaqMode, DomHal, LbmMode, RateMonitor,
    TriggerSource, ATWD_CHANNELS, ATWD_CHIPS,
};
use event_codec::Compression;
use lbm::LbmIndex;
use metrics::counter;
use tracing::{debug, error, info, warn};

use crate::config::{InterlockConfig, PedestalConfig, RunConfig, TriggerMode};
use crate::error::RunError;
use crate::flasher::{self, FlasherSettings};
use crate::pedestal::{self, PedestalAverages, PedestalCounts, PedestalGoals};
use crate::state::RunState;

/// Settling time between the two LBM resets at run start
const RUN_START_SETTLE_US: u32 = 10_000;

/// Owner of the DOM run state
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    state: RunState,
    run: RunConfig,
    interlock: InterlockConfig,
    pedestal_config: PedestalConfig,
    flasher: Option<FlasherSettings>,
    pedestal_counts: PedestalCounts,
    pedestal_averages: Option<PedestalAverages>,
}

impl RunStateMachine {
    pub fn new(run: RunConfig, interlock: InterlockConfig, pedestal_config: PedestalConfig) -> Self {
        info!("Run state machine created: {:?}", run);
        Self {
            state: RunState::Idle,
            run,
            interlock,
            pedestal_config,
            flasher: None,
            pedestal_counts: PedestalCounts::default(),
            pedestal_averages: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    /// Settings for the next run start
    pub fn run_config_mut(&mut self) -> &mut RunConfig {
        &mut self.run
    }

    /// Flasher settings of the current flasher run
    pub fn flasher(&self) -> Option<&FlasherSettings> {
        self.flasher.as_ref()
    }

    fn require_idle(&self) -> Result<(), RunError> {
        if self.state != RunState::Idle {
            warn!("Refusing request: DOM not idle ({})", self.state);
            return Err(RunError::NotIdle(self.state));
        }
        Ok(())
    }

    fn require_led_allowed(&self) -> Result<(), RunError> {
        if self.run.mb_led_running && !self.run.extended_mode {
            warn!("Refusing run start: mainboard LED requested in normal mode");
            return Err(RunError::LedNeedsExtendedMode);
        }
        Ok(())
    }

    fn check_interlock<H: DomHal>(
        &self,
        hal: &mut H,
        settings: &FlasherSettings,
    ) -> Result<(), RunError> {
        let adc = hal.base_hv_adc();
        if let Err(e) = flasher::check_interlock(&self.interlock, self.run.extended_mode, settings, adc)
        {
            counter!("domapp_interlock_refusals_total").increment(1);
            error!("PMT / flasher interlock failed: {}", e);
            return Err(e);
        }
        if !self.run.extended_mode {
            // HV reads off; keep the base unpowered while the board flashes
            hal.power_down_base();
        }
        Ok(())
    }

    fn start_supernova<H: DomHal>(&self, hal: &mut H) -> Result<bool, RunError> {
        let Some(sn) = self.run.supernova else {
            return Ok(false);
        };
        if let Err(e) = hal.sn_start(sn.mode, sn.deadtime) {
            error!("Could not start requested supernova data taking: {}", e);
            return Err(e.into());
        }
        debug!("Supernova scalers started: mode {} deadtime {}", sn.mode, sn.deadtime);
        Ok(true)
    }

    /// `Idle -> Running`
    pub fn begin_run<H: DomHal>(
        &mut self,
        ctx: &mut AcquisitionContext,
        hal: &mut H,
    ) -> Result<(), RunError> {
        self.require_idle()?;
        self.require_led_allowed()?;
        self.start_supernova(hal)?;
        self.arm(ctx, hal, RunState::Running);
        Ok(())
    }

    /// `Idle -> FlasherRunning`
    pub fn begin_fb_run<H: DomHal>(
        &mut self,
        ctx: &mut AcquisitionContext,
        hal: &mut H,
        settings: FlasherSettings,
    ) -> Result<(), RunError> {
        settings.validate()?;
        self.require_idle()?;
        self.require_led_allowed()?;
        self.check_interlock(hal, &settings)?;

        let sn_started = self.start_supernova(hal)?;
        if let Err(e) = flasher::setup(hal, &settings) {
            error!("Flasher board setup failed: {}", e);
            hal.fb_disable();
            if sn_started {
                hal.sn_stop();
            }
            return Err(e.into());
        }

        self.flasher = Some(settings);
        self.arm(ctx, hal, RunState::FlasherRunning);
        Ok(())
    }

    /// Reprogram the flasher board without stopping the run
    pub fn change_fb_settings<H: DomHal>(
        &mut self,
        hal: &mut H,
        settings: FlasherSettings,
    ) -> Result<(), RunError> {
        if self.state != RunState::FlasherRunning {
            warn!("Cannot change flasher settings: {}", self.state);
            return Err(RunError::NotFlasherRun(self.state));
        }
        settings.validate()?;
        self.check_interlock(hal, &settings)?;
        flasher::setup(hal, &settings)?;
        self.flasher = Some(settings);
        Ok(())
    }

    /// `Running | FlasherRunning -> Idle`
    pub fn end_run<H: DomHal>(
        &mut self,
        ctx: &mut AcquisitionContext,
        hal: &mut H,
    ) -> Result<(), RunError> {
        if !self.state.is_run() {
            warn!("Cannot end run: {}", self.state);
            return Err(RunError::NotRunning(self.state));
        }

        info!(
            "Disabling data acquisition (LBM pointer {}, {} triggers read out)",
            hal.lbm_pointer(),
            ctx.triggers_read_out()
        );
        hal.disable_daq();
        hal.cal_mode(CalMode::Off);
        hal.cal_source(CalSource::FORCED);
        hal.sn_stop();
        flasher::turn_off(hal);
        hal.disable_led_power();

        self.run.reset_run_flags();
        self.flasher = None;
        ctx.end_run();
        info!("Ended run (was {})", self.state);
        self.state = RunState::Idle;
        Ok(())
    }

    /// Collect, check and program ATWD pedestals; back to `Idle` either way
    pub fn collect_pedestals<H: DomHal>(
        &mut self,
        ctx: &mut AcquisitionContext,
        hal: &mut H,
        goals: PedestalGoals,
    ) -> Result<PedestalCounts, RunError> {
        goals.validate()?;
        self.require_idle()?;

        self.zero_pedestals(hal);
        self.state = RunState::PedestalCollecting;
        ctx.warnings_mut().reset();
        info!("Starting pedestal run: {:?}", goals);

        let mut cursor = pedestal::prepare(hal);
        let result = self.pedestal_passes(ctx, hal, &goals, &mut cursor);
        pedestal::finish(hal);
        self.state = RunState::Idle;

        let (averages, counts) = result?;
        let fingerprint = averages.fingerprint();
        for chip in 0..ATWD_CHIPS {
            for ch in 0..ATWD_CHANNELS {
                hal.set_atwd_pedestal(chip, ch, &fingerprint.atwd[chip][ch]);
            }
        }
        self.pedestal_counts = counts;
        if counts.complete() {
            self.pedestal_averages = Some(fingerprint);
        }
        counter!("domapp_pedestal_runs_total").increment(1);
        info!("Pedestal run done: {:?}", counts);
        Ok(counts)
    }

    fn pedestal_passes<H: DomHal>(
        &self,
        ctx: &mut AcquisitionContext,
        hal: &mut H,
        goals: &PedestalGoals,
        cursor: &mut LbmIndex,
    ) -> Result<(PedestalAverages, PedestalCounts), RunError> {
        let mut prev = pedestal::collect_pass(ctx, hal, goals, cursor)?;
        if !self.pedestal_config.contamination_check {
            return Ok((prev.averages, prev.counts));
        }

        let max_passes = 2 + self.pedestal_config.max_retries;
        for attempt in 2..=max_passes {
            let cur = pedestal::collect_pass(ctx, hal, goals, cursor)?;
            let c = pedestal::contamination(&prev, &cur);
            if !c.exceeds(&self.pedestal_config) {
                debug!("Pedestal passes agree after {} passes", attempt);
                return Ok((cur.averages, cur.counts));
            }
            warn!(
                "Pedestal pass {} looks light-contaminated (baseline shift {:.2}, autocorrelation {:.3}, {} missed)",
                attempt, c.baseline_shift, c.autocorrelation, cur.missed
            );
            prev = cur;
        }
        counter!("domapp_pedestal_contaminated_total").increment(1);
        Err(RunError::PedestalContaminated {
            attempts: max_passes,
        })
    }

    fn zero_pedestals<H: DomHal>(&mut self, hal: &mut H) {
        let zero = PedestalAverages::zeroed();
        for chip in 0..ATWD_CHIPS {
            for ch in 0..ATWD_CHANNELS {
                hal.set_atwd_pedestal(chip, ch, &zero.atwd[chip][ch]);
            }
        }
        self.pedestal_counts = PedestalCounts::default();
        self.pedestal_averages = None;
    }

    pub fn pedestal_counts(&self) -> PedestalCounts {
        self.pedestal_counts
    }

    pub fn pedestal_averages(&self) -> Result<&PedestalAverages, RunError> {
        self.pedestal_averages
            .as_ref()
            .ok_or(RunError::PedestalsNotAvailable)
    }

    /// Reprogram the FPGA for acquisition and enter `next`.
    ///
    /// DAQ is enabled last; no trigger is serviced before that.
    fn arm<H: DomHal>(&mut self, ctx: &mut AcquisitionContext, hal: &mut H, next: RunState) {
        info!("Starting run ({})", next);
        hal.disable_daq();
        hal.lbm_reset();
        hal.sleep_us(RUN_START_SETTLE_US);
        hal.lbm_reset();
        ctx.begin_run(hal.lbm_pointer(), next == RunState::FlasherRunning);
        self.state = next;

        self.program_triggers(hal);
        self.program_daq_mode(hal);

        hal.cal_mode(CalMode::Repeat);
        hal.enable_atwds(self.run.atwd_select);
        hal.lbm_mode(LbmMode::Wrap);

        match ctx.data_format().1 {
            Compression::None => {
                hal.atwd_mode(AtwdMode::Testing);
                hal.compression_mode(CompressionMode::Off);
            }
            Compression::Delta => {
                hal.atwd_mode(AtwdMode::Beacon);
                hal.compression_mode(CompressionMode::On);
                hal.delta_compression_all_available();
            }
            Compression::RoadGrade => {
                hal.atwd_mode(AtwdMode::Beacon);
                hal.compression_mode(CompressionMode::On);
            }
        }

        hal.apply_local_coincidence();
        hal.rate_monitor_enable(RateMonitor::all());

        if self.run.mb_led_running {
            info!("Enabling mainboard LED power");
            hal.enable_led_power();
        }

        hal.enable_daq();
        counter!("domapp_runs_started_total").increment(1);
        info!("Run started ({}), read cursor {}", next, ctx.read_cursor());
    }

    fn program_triggers<H: DomHal>(&mut self, hal: &mut H) {
        let run = &mut self.run;
        if run.pulser_running && !run.extended_mode {
            if run.trigger_mode.is_discriminator() {
                hal.trigger_source(run.trigger_mode.sources());
            } else {
                warn!(
                    "Pulser running but trigger mode {:?} is disallowed; no triggers",
                    run.trigger_mode
                );
            }
            hal.cal_source(CalSource::FE_PULSER);
            hal.cal_pulser_rate(run.pulser_rate);
        } else if self.state == RunState::FlasherRunning {
            // Rate is set by the flasher setup
            hal.trigger_source(TriggerMode::Flasher.sources());
            hal.cal_source(CalSource::FLASHER);
        } else if run.extended_mode {
            let trigger = run.trigger_mode.sources()
                | run.alt_trigger_mode.sources()
                | TriggerMode::Cpu.sources();
            info!("Extended mode trigger mask: 0x{:03x}", trigger.bits());
            hal.trigger_source(trigger);

            let mut cal = CalSource::empty();
            if run.mb_led_running {
                warn!("Mainboard LED as calibration source, rate {}", run.pulser_rate);
                cal |= CalSource::LED;
            }
            if run.pulser_running {
                cal |= CalSource::FE_PULSER;
            }
            if cal.is_empty() {
                cal = CalSource::FORCED;
            }
            hal.cal_source(cal);
            hal.cal_pulser_rate(run.pulser_rate);
        } else {
            match run.trigger_mode {
                TriggerMode::SpeDisc | TriggerMode::MpeDisc | TriggerMode::Cpu => {
                    hal.trigger_source(run.trigger_mode.sources() | TriggerSource::FORCED);
                }
                other => {
                    warn!(
                        "Trigger mode {:?} disallowed in standard data taking; using CPU only",
                        other
                    );
                    run.trigger_mode = TriggerMode::Cpu;
                    hal.trigger_source(TriggerSource::FORCED);
                }
            }
            if run.alt_trigger_mode != TriggerMode::Cpu {
                warn!(
                    "Alternate trigger mode {:?} ignored in standard data taking",
                    run.alt_trigger_mode
                );
                run.alt_trigger_mode = TriggerMode::Cpu;
            }
            hal.cal_source(CalSource::FORCED);
            hal.cal_pulser_rate(run.pulser_rate);
        }
    }

    fn program_daq_mode<H: DomHal>(&mut self, hal: &mut H) {
        if !self.run.extended_mode && self.run.daq_mode != DaqMode::AtwdFadc {
            warn!(
                "DAQ mode {:?} not allowed in normal mode; using ATWD+FADC",
                self.run.daq_mode
            );
            self.run.daq_mode = DaqMode::AtwdFadc;
        }
        hal.daq_mode(self.run.daq_mode);
    }
}
