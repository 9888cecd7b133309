//! DOM Application
//!
//! Owns every piece of acquisition state and drives it one poll at a
//! time. Nothing here blocks; the caller decides how often to poll.

use anyhow::{bail, Context};
use data_access::message::status;
use data_access::{AcquisitionContext, IntervalAction, IntervalService, Message, SupernovaStream};
use dom_hal::{DomHal, SimulatedDom, TICKS_PER_SEC};
use exp_control::commands::{encode_flasher, encode_pedestal_goals, subtype};
use exp_control::{ExpControl, RunState, RunStateMachine};
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::config::DomappConfig;
use crate::feeder::Feeder;

pub struct Domapp {
    config: DomappConfig,
    dom: SimulatedDom,
    feeder: Feeder,
    ctx: AcquisitionContext,
    sn: SupernovaStream,
    interval: IntervalService,
    exp: ExpControl,
    intervals: u64,
}

impl Domapp {
    pub fn new(config: DomappConfig) -> anyhow::Result<Self> {
        let geometry = config.lbm.geometry().context("LBM geometry")?;
        let ctx = AcquisitionContext::new(&config.acquisition, geometry)
            .context("acquisition configuration")?;

        let mut dom = SimulatedDom::new(geometry);
        dom.set_hv_adc(config.simulation.hv_adc);

        let machine = RunStateMachine::new(
            config.run.clone(),
            config.interlock,
            config.pedestal,
        );
        let interval_ticks = config.poll.interval_secs as u64 * TICKS_PER_SEC;

        Ok(Self {
            feeder: Feeder::new(config.simulation),
            config,
            dom,
            ctx,
            sn: SupernovaStream::new(),
            interval: IntervalService::new(interval_ticks),
            exp: ExpControl::new(machine),
            intervals: 0,
        })
    }

    pub fn state(&self) -> RunState {
        self.exp.machine().state()
    }

    pub fn context(&self) -> &AcquisitionContext {
        &self.ctx
    }

    pub fn dom(&self) -> &SimulatedDom {
        &self.dom
    }

    /// Forward one run-control request. A run that starts opens a fresh
    /// interval; a run that ends closes it.
    pub fn command(&mut self, subtype: u8, payload: &[u8]) -> Message {
        let reply = self.exp.handle(&mut self.ctx, &mut self.dom, subtype, payload);
        if reply.status() != status::SUCCESS {
            return reply;
        }
        match subtype {
            subtype::BEGIN_RUN | subtype::BEGIN_FB_RUN => {
                self.sn.reset();
                self.interval
                    .start(self.dom.clock_ticks(), self.dom.sn_running());
                info!("Run started ({})", self.state());
            }
            subtype::END_RUN | subtype::END_FB_RUN => {
                self.interval.stop();
                info!("Run ended");
            }
            _ => {}
        }
        reply
    }

    fn command_ok(&mut self, subtype: u8, payload: &[u8]) -> bool {
        self.command(subtype, payload).status() == status::SUCCESS
    }

    /// Run the configured startup commands and open the first interval
    pub fn start(&mut self) -> anyhow::Result<()> {
        let startup = self.config.startup.clone();

        if let Some(goals) = startup.pedestal_goals {
            if !self.command_ok(subtype::DO_PEDESTAL_COLLECTION, &encode_pedestal_goals(&goals)) {
                warn!(
                    "Pedestal collection failed, continuing with zero pedestals: {}",
                    self.exp.last_error().text
                );
            }
        }

        if !startup.begin_run {
            info!("No run requested at startup");
            return Ok(());
        }

        let started = match &startup.flasher {
            Some(settings) => self.command_ok(subtype::BEGIN_FB_RUN, &encode_flasher(settings)),
            None => self.command_ok(subtype::BEGIN_RUN, &[]),
        };
        if !started {
            bail!("run start refused: {}", self.exp.last_error().text);
        }
        Ok(())
    }

    /// One loop iteration after `elapsed_us` of wall time
    pub fn poll(&mut self, elapsed_us: u32) -> anyhow::Result<IntervalAction> {
        self.feeder.advance(&mut self.dom, elapsed_us);

        let action = self
            .interval
            .service(&mut self.ctx, &mut self.sn, &mut self.dom)?;
        match &action {
            IntervalAction::Idle => {}
            IntervalAction::Data(msg) => {
                debug!("Data message: {} bytes", msg.data().len());
                counter!("domapp_data_messages_total").increment(1);
            }
            IntervalAction::Monitoring => self.monitor(),
            IntervalAction::Supernova(msg) => {
                debug!("Supernova message: {} bytes", msg.data().len());
                counter!("domapp_sn_messages_total").increment(1);
            }
        }
        Ok(action)
    }

    /// Per-interval monitoring record
    fn monitor(&mut self) {
        self.intervals += 1;
        let hits = self.ctx.take_hit_count();
        gauge!("domapp_interval_hits").set(hits as f64);
        info!(
            "Interval {}: state={} hits={} read out={} overflows={} sn discontinuities={}",
            self.intervals,
            self.state(),
            hits,
            self.ctx.triggers_read_out(),
            self.ctx.overflow_count(),
            self.sn.discontinuities()
        );

        if !self.ctx.histogramming() {
            return;
        }
        let secs = self.intervals * self.config.poll.interval_secs as u64;
        let every = self.ctx.histogram_interval_secs() as u64;
        if secs % every == 0 {
            let snap = self.ctx.histogram().snapshot();
            info!(
                "Charge-stamp histogram ({:?}, prescale {}): fadc entries={} atwd entries={:?}",
                snap.mode, snap.prescale, snap.fadc_entries, snap.atwd_entries
            );
            self.ctx.histogram_mut().reset();
        }
    }

    /// End the run, if one is going
    pub fn shutdown(&mut self) {
        if self.state().is_run() && !self.command_ok(subtype::END_RUN, &[]) {
            warn!("Run end refused: {}", self.exp.last_error().text);
        }
        self.interval.stop();
        info!(
            "Shutdown after {} intervals, {} hits total",
            self.intervals,
            self.ctx.hits_total()
        );
    }
}
