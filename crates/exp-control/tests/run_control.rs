//! Run control against the simulated mainboard

use data_access::message::status;
use data_access::{AcquisitionConfig, AcquisitionContext, MessageBatchPacker, WarningKind};
use dom_hal::layout::CompressedSlot;
use dom_hal::{HalCall, SimulatedDom, TriggerSource};
use event_codec::{Compression, DataFormat};
use exp_control::commands::{error_id, subtype};
use exp_control::{
    ExpControl, FlasherSettings, InterlockConfig, PedestalConfig, PedestalGoals, RunConfig,
    RunError, RunState, RunStateMachine, SupernovaRequest,
};
use lbm::LbmGeometry;

fn geometry() -> LbmGeometry {
    LbmGeometry::new(16, 20, 2048, 2048).unwrap()
}

fn setup() -> (RunStateMachine, AcquisitionContext, SimulatedDom) {
    let ctx = AcquisitionContext::new(&AcquisitionConfig::default(), geometry()).unwrap();
    let machine = RunStateMachine::new(
        RunConfig::default(),
        InterlockConfig::default(),
        PedestalConfig::default(),
    );
    (machine, ctx, SimulatedDom::new(geometry()))
}

fn flasher(delay: i16) -> FlasherSettings {
    FlasherSettings {
        brightness: 10,
        width: 10,
        delay,
        mask: 0b0100,
        rate: 50,
    }
}

#[test]
fn test_idle_running_idle() {
    let (mut m, mut ctx, mut hal) = setup();
    assert_eq!(m.state(), RunState::Idle);
    m.begin_run(&mut ctx, &mut hal).unwrap();
    assert_eq!(m.state(), RunState::Running);
    assert!(hal.daq_enabled());
    m.end_run(&mut ctx, &mut hal).unwrap();
    assert_eq!(m.state(), RunState::Idle);
    assert!(!hal.daq_enabled());
}

#[test]
fn test_begin_while_running_leaves_counters() {
    let (mut m, mut ctx, mut hal) = setup();
    ctx.set_data_format(DataFormat::Delta, Compression::Delta)
        .unwrap();
    m.begin_run(&mut ctx, &mut hal).unwrap();

    for _ in 0..3 {
        hal.push_compressed(&CompressedSlot::new(7, 20, 0, 0));
    }
    let mut buf = vec![0u8; 4096];
    let summary = MessageBatchPacker::fill(&mut ctx, &hal, &mut buf).unwrap();
    assert_eq!(summary.events, 3);

    let hits = ctx.hit_count();
    let cursor = ctx.read_cursor();
    hal.clear_calls();
    assert_eq!(
        m.begin_run(&mut ctx, &mut hal),
        Err(RunError::NotIdle(RunState::Running))
    );
    assert_eq!(m.state(), RunState::Running);
    assert_eq!(ctx.hit_count(), hits);
    assert_eq!(ctx.read_cursor(), cursor);
    assert!(hal.calls().is_empty());
}

#[test]
fn test_flasher_refused_with_hv_on() {
    let (mut m, mut ctx, mut hal) = setup();
    hal.set_hv_adc(InterlockConfig::default().max_hvadc_off + 100);
    let err = m.begin_fb_run(&mut ctx, &mut hal, flasher(0)).unwrap_err();
    assert!(matches!(err, RunError::HighVoltageOn { .. }));
    assert_eq!(m.state(), RunState::Idle);
    assert!(hal.calls().is_empty());
    assert!(hal.base_powered());
}

#[test]
fn test_flasher_run_lifecycle() {
    let (mut m, mut ctx, mut hal) = setup();
    m.begin_fb_run(&mut ctx, &mut hal, flasher(-50)).unwrap();
    assert_eq!(m.state(), RunState::FlasherRunning);
    assert!(ctx.fb_run());
    assert!(hal.fb_enabled());
    assert_eq!(hal.trigger(), TriggerSource::FLASHER);
    assert!(hal.calls().contains(&HalCall::FbMux(2)));
    assert!(hal.calls().contains(&HalCall::FbDelay(-50)));

    hal.clear_calls();
    m.change_fb_settings(&mut hal, FlasherSettings { brightness: 20, ..flasher(10) })
        .unwrap();
    assert!(hal.calls().contains(&HalCall::FbBrightness(20)));
    assert_eq!(m.flasher().map(|f| f.delay), Some(10));

    m.end_run(&mut ctx, &mut hal).unwrap();
    assert!(!hal.fb_enabled());
    assert!(!ctx.fb_run());
    assert!(m.flasher().is_none());
}

#[test]
fn test_change_settings_requires_flasher_run() {
    let (mut m, mut ctx, mut hal) = setup();
    m.begin_run(&mut ctx, &mut hal).unwrap();
    assert_eq!(
        m.change_fb_settings(&mut hal, flasher(0)),
        Err(RunError::NotFlasherRun(RunState::Running))
    );
}

#[test]
fn test_bad_flasher_delay() {
    let (mut m, mut ctx, mut hal) = setup();
    assert_eq!(
        m.begin_fb_run(&mut ctx, &mut hal, flasher(176)),
        Err(RunError::BadFlasherDelay(176))
    );
    assert!(hal.calls().is_empty());
}

#[test]
fn test_flasher_enable_failure_is_rolled_back() {
    let (mut m, mut ctx, mut hal) = setup();
    hal.set_fb_enable_fails(true);
    assert!(matches!(
        m.begin_fb_run(&mut ctx, &mut hal, flasher(0)),
        Err(RunError::Hal(_))
    ));
    assert_eq!(m.state(), RunState::Idle);
    assert!(!hal.fb_enabled());
    assert!(!hal.daq_enabled());
}

#[test]
fn test_supernova_failure_refuses_run() {
    let (mut m, mut ctx, mut hal) = setup();
    m.run_config_mut().supernova = Some(SupernovaRequest {
        mode: 1,
        deadtime: 6400,
    });
    hal.set_sn_start_fails(true);
    assert!(matches!(
        m.begin_run(&mut ctx, &mut hal),
        Err(RunError::Hal(_))
    ));
    assert_eq!(m.state(), RunState::Idle);
    assert!(!hal.daq_enabled());

    hal.set_sn_start_fails(false);
    m.begin_run(&mut ctx, &mut hal).unwrap();
    assert!(hal.sn_running());
    m.end_run(&mut ctx, &mut hal).unwrap();
    assert!(!hal.sn_running());
}

#[test]
fn test_pedestals_programmed() {
    let (mut m, mut ctx, mut hal) = setup();
    let goals = PedestalGoals {
        atwd_a: 10,
        atwd_b: 10,
        fadc: 20,
    };
    let counts = m.collect_pedestals(&mut ctx, &mut hal, goals).unwrap();
    assert_eq!((counts.atwd_a, counts.atwd_b, counts.fadc), (10, 10, 20));
    assert_eq!(m.state(), RunState::Idle);
    assert!(!hal.daq_enabled());
    assert!(!hal.lc_enabled());

    // Baseline 130 + 2*ch + (i % 2): only the odd/even fingerprint remains
    let ped = hal.pedestal(1, 2);
    assert_eq!((ped[0], ped[1]), (0, 1));
    let avg = m.pedestal_averages().unwrap();
    assert_eq!(avg.fadc[0], 100);
    assert_eq!(avg.atwd[0][3][7], 1);
}

#[test]
fn test_pedestal_contamination_retried() {
    let (mut m, mut ctx, mut hal) = setup();
    // Light during the first pass only
    hal.set_light(Some(|n| if n < 20 { 300 } else { 0 }));
    let goals = PedestalGoals {
        atwd_a: 10,
        atwd_b: 10,
        fadc: 20,
    };
    m.collect_pedestals(&mut ctx, &mut hal, goals).unwrap();
    // Two clean passes were needed after the contaminated one
    assert_eq!(hal.launches(), 60);
    assert_eq!(hal.pedestal(0, 0)[44], 0);
}

#[test]
fn test_pedestal_contamination_gives_up() {
    let (mut m, mut ctx, mut hal) = setup();
    // Light alternates between passes
    hal.set_light(Some(|n| if (n / 20) % 2 == 0 { 300 } else { 0 }));
    let goals = PedestalGoals {
        atwd_a: 10,
        atwd_b: 10,
        fadc: 20,
    };
    let retries = PedestalConfig::default().max_retries;
    assert_eq!(
        m.collect_pedestals(&mut ctx, &mut hal, goals),
        Err(RunError::PedestalContaminated {
            attempts: 2 + retries
        })
    );
    assert_eq!(m.state(), RunState::Idle);
    assert_eq!(m.pedestal_averages(), Err(RunError::PedestalsNotAvailable));
    assert!(!hal.daq_enabled());
}

#[test]
fn test_missed_triggers_counted_out() {
    let (_, mut ctx, mut hal) = setup();
    let cfg = PedestalConfig {
        contamination_check: false,
        ..Default::default()
    };
    let mut m = RunStateMachine::new(RunConfig::default(), InterlockConfig::default(), cfg);
    hal.miss_launches(3);
    let counts = m
        .collect_pedestals(
            &mut ctx,
            &mut hal,
            PedestalGoals {
                atwd_a: 10,
                atwd_b: 5,
                fadc: 15,
            },
        )
        .unwrap();
    assert_eq!((counts.atwd_a, counts.atwd_b, counts.fadc), (7, 5, 12));
    assert!(ctx
        .warnings()
        .issued()
        .contains(WarningKind::MISSED_CAL_TRIGGER));
    // Averages still exist for the triggers that did arrive
    assert!(m.pedestal_averages().is_ok());
}

#[test]
fn test_command_dispatch() {
    let (m, mut ctx, mut hal) = setup();
    let mut exp = ExpControl::new(m);

    let reply = exp.handle(&mut ctx, &mut hal, subtype::BEGIN_RUN, &[]);
    assert_eq!(reply.status(), status::SUCCESS);

    let reply = exp.handle(&mut ctx, &mut hal, subtype::BEGIN_RUN, &[]);
    assert_eq!(
        reply.status(),
        status::SERVICE_SPECIFIC_ERROR | status::SEVERE_ERROR
    );
    assert!(reply.data().is_empty());
    assert_eq!(exp.last_error().id, error_id::CANNOT_BEGIN_RUN);

    let reply = exp.handle(&mut ctx, &mut hal, subtype::GET_DOM_STATE, &[]);
    assert_eq!(reply.data()[0], RunState::Running.code());

    let reply = exp.handle(&mut ctx, &mut hal, subtype::END_RUN, &[]);
    assert_eq!(reply.status(), status::SUCCESS);

    // Delay 200 is out of range
    let payload = [0, 1, 0, 1, 0, 200, 0, 1, 0, 10];
    let reply = exp.handle(&mut ctx, &mut hal, subtype::BEGIN_FB_RUN, &payload);
    assert_ne!(reply.status(), status::SUCCESS);
    assert_eq!(exp.last_error().id, error_id::BAD_FB_DELAY);

    let reply = exp.handle(&mut ctx, &mut hal, subtype::GET_PEDESTAL_AVERAGES, &[]);
    assert_eq!(exp.last_error().id, error_id::PEDESTALS_NOT_AVAIL);
    assert!(reply.data().is_empty());

    let goals = [0, 0, 3, 0xE9, 0, 0, 0, 1, 0, 0, 0, 1];
    exp.handle(&mut ctx, &mut hal, subtype::DO_PEDESTAL_COLLECTION, &goals);
    assert_eq!(exp.last_error().id, error_id::TOO_MANY_PEDS);

    let goals = [0, 0, 0, 4, 0, 0, 0, 4, 0, 0, 0, 8];
    let reply = exp.handle(&mut ctx, &mut hal, subtype::DO_PEDESTAL_COLLECTION, &goals);
    assert_eq!(reply.status(), status::SUCCESS);
    let reply = exp.handle(&mut ctx, &mut hal, subtype::GET_NUM_PEDESTALS, &[]);
    assert_eq!(reply.data(), &[0, 0, 0, 4, 0, 0, 0, 4, 0, 0, 0, 8]);
    let reply = exp.handle(&mut ctx, &mut hal, subtype::GET_PEDESTAL_AVERAGES, &[]);
    assert_eq!(reply.data().len(), 2 * (2 * 4 * 128 + 256));

    let reply = exp.handle(&mut ctx, &mut hal, 99, &[]);
    assert_eq!(
        reply.status(),
        status::SERVICE_SPECIFIC_ERROR | status::WARNING_ERROR
    );
    assert_eq!(exp.stats().refused, 1);
}
