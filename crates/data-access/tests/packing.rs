//! Packer behaviour against a simulated lookback memory

use std::cell::Cell;

use data_access::{
    AcquisitionConfig, AcquisitionContext, MessageBatchPacker, RateType, StopReason,
};
use dom_hal::layout::{CompressedSlot, EngineeringSlot};
use dom_hal::{
    AtwdMode, AtwdSelect, CalMode, CalSource, CompressionMode, DaqMode, DomHal, HalError,
    LbmMode, RateMonitor, ScalerFifo, SimulatedDom, SnSample, TriggerSource, ATWD_SAMPLES,
};
use event_codec::{Compression, DataFormat};
use lbm::{LbmGeometry, LbmIndex};
use proptest::prelude::*;

fn geometry() -> LbmGeometry {
    LbmGeometry::new(18, 22, 2048, 2048).unwrap()
}

fn setup(format: DataFormat, compression: Compression) -> (AcquisitionContext, SimulatedDom) {
    let cfg = AcquisitionConfig {
        data_format: format,
        compression,
        rate_type: RateType::Slc,
        ..Default::default()
    };
    (
        AcquisitionContext::new(&cfg, geometry()).unwrap(),
        SimulatedDom::new(geometry()),
    )
}

#[test]
fn delta_end_to_end() {
    let (mut ctx, mut dom) = setup(DataFormat::Delta, Compression::Delta);
    ctx.set_rate_type(RateType::Hlc);
    for size in [13, 13, 14] {
        dom.push_compressed(&CompressedSlot::new(0x00C0, size, 0, 0));
    }
    let start = ctx.read_cursor();

    let mut buf = vec![0u8; 4096];
    let s = MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();

    assert_eq!(s.bytes, 40 + 8);
    assert_eq!(ctx.read_cursor(), geometry().advance_by(start, 3));
    assert_eq!(ctx.hit_count(), 3);
    assert_eq!(ctx.triggers_read_out(), 3);
    assert_eq!(&buf[..8], &[0, 48, 0, 0x90, 0x00, 0xC0, 0, 0]);
}

#[test]
fn delta_groups_split_on_time_msb() {
    let (mut ctx, mut dom) = setup(DataFormat::Delta, Compression::Delta);
    for tag in [5u16, 5, 5, 6, 6] {
        dom.push_compressed(&CompressedSlot::new(tag, 16, 0, 0));
    }

    let mut groups = Vec::new();
    loop {
        let mut buf = vec![0u8; 64 * 1024];
        let s = MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();
        if s.bytes == 0 {
            break;
        }
        buf.truncate(s.bytes);
        groups.push((s, buf));
    }

    assert_eq!(groups.len(), 2);
    let (first, bytes) = &groups[0];
    assert_eq!(first.events, 3);
    assert_eq!(first.stop, StopReason::GroupChange);
    assert_eq!(bytes.len(), 8 + 3 * 16);
    assert_eq!(&bytes[4..6], &[0, 5]);
    // One sub-header per group: hit payloads follow back to back
    assert_eq!(bytes.iter().filter(|&&b| b == 0x90).count(), 1);

    let (second, bytes) = &groups[1];
    assert_eq!(second.events, 2);
    assert_eq!(&bytes[4..6], &[0, 6]);
    assert_eq!(bytes.len(), 8 + 2 * 16);
}

#[test]
fn engineering_forced_and_spe_reports_forced() {
    let (mut ctx, mut dom) = setup(DataFormat::Engineering, Compression::None);
    dom.push_engineering(
        &EngineeringSlot::new(1, (TriggerSource::FORCED | TriggerSource::SPE).bits())
            .with_baselines(0, 0),
    );
    let mut buf = vec![0u8; 4096];
    MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();
    assert_eq!(buf[8], 1);
}

#[test]
fn fill_resyncs_when_writer_laps_reader() {
    let (mut ctx, mut dom) = setup(DataFormat::Delta, Compression::Delta);
    ctx.set_lbm_depth(14).unwrap();
    dom.push_compressed(&CompressedSlot::new(1, 16, 0, 0));
    // Writer runs far ahead without the reader draining
    dom.advance_write(20);
    dom.push_compressed(&CompressedSlot::new(1, 16, 0, 0));

    let mut buf = vec![0u8; 4096];
    let before = MessageBatchPacker::count(&ctx, &dom, buf.len()).unwrap();
    assert_eq!(before.stop, StopReason::Overflow);
    assert_eq!(before.bytes, 0);
    assert_eq!(ctx.overflow_count(), 0);

    let s = MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();
    assert_eq!(s.bytes, 0);
    assert_eq!(ctx.overflow_count(), 1);
    let rd = ctx.read_cursor();
    assert_eq!(rd.raw() & 0x7FF, 0);
    assert!(rd <= dom_hal::DomHal::lbm_pointer(&dom));
    assert_eq!(rd, LbmIndex::new(22 * 2048));
}

/// Mainboard whose writer jumps `jump` events ahead from the `at`-th
/// read of the write pointer onwards, as if it raced the reader.
struct RacingDom {
    inner: SimulatedDom,
    reads: Cell<u32>,
    at: u32,
    jump: u32,
}

impl RacingDom {
    fn new(inner: SimulatedDom, at: u32, jump: u32) -> Self {
        Self {
            inner,
            reads: Cell::new(0),
            at,
            jump,
        }
    }
}

impl ScalerFifo for RacingDom {
    fn sn_ready(&self) -> bool {
        self.inner.sn_ready()
    }

    fn sn_next(&mut self) -> Option<SnSample> {
        self.inner.sn_next()
    }
}

impl DomHal for RacingDom {
    fn lbm_pointer(&self) -> LbmIndex {
        let n = self.reads.get() + 1;
        self.reads.set(n);
        let write = self.inner.lbm_pointer();
        if n >= self.at {
            geometry().advance_by(write, self.jump)
        } else {
            write
        }
    }

    fn lbm_memory(&self) -> &[u8] {
        self.inner.lbm_memory()
    }

    fn lbm_reset(&mut self) {
        self.inner.lbm_reset()
    }

    fn lbm_mode(&mut self, mode: LbmMode) {
        self.inner.lbm_mode(mode)
    }

    fn enable_daq(&mut self) {
        self.inner.enable_daq()
    }

    fn disable_daq(&mut self) {
        self.inner.disable_daq()
    }

    fn daq_mode(&mut self, mode: DaqMode) {
        self.inner.daq_mode(mode)
    }

    fn atwd_mode(&mut self, mode: AtwdMode) {
        self.inner.atwd_mode(mode)
    }

    fn enable_atwds(&mut self, atwds: AtwdSelect) {
        self.inner.enable_atwds(atwds)
    }

    fn compression_mode(&mut self, mode: CompressionMode) {
        self.inner.compression_mode(mode)
    }

    fn delta_compression_all_available(&mut self) {
        self.inner.delta_compression_all_available()
    }

    fn trigger_source(&mut self, source: TriggerSource) {
        self.inner.trigger_source(source)
    }

    fn cal_source(&mut self, source: CalSource) {
        self.inner.cal_source(source)
    }

    fn cal_mode(&mut self, mode: CalMode) {
        self.inner.cal_mode(mode)
    }

    fn cal_pulser_rate(&mut self, hz: u16) {
        self.inner.cal_pulser_rate(hz)
    }

    fn cal_launch(&mut self) {
        self.inner.cal_launch()
    }

    fn rate_monitor_enable(&mut self, monitors: RateMonitor) {
        self.inner.rate_monitor_enable(monitors)
    }

    fn apply_local_coincidence(&mut self) {
        self.inner.apply_local_coincidence()
    }

    fn disable_local_coincidence(&mut self) {
        self.inner.disable_local_coincidence()
    }

    fn sn_start(&mut self, mode: u8, deadtime: u32) -> Result<(), HalError> {
        self.inner.sn_start(mode, deadtime)
    }

    fn sn_stop(&mut self) {
        self.inner.sn_stop()
    }

    fn set_atwd_pedestal(&mut self, chip: usize, channel: usize, pattern: &[u16; ATWD_SAMPLES]) {
        self.inner.set_atwd_pedestal(chip, channel, pattern)
    }

    fn base_hv_adc(&self) -> u16 {
        self.inner.base_hv_adc()
    }

    fn power_down_base(&mut self) {
        self.inner.power_down_base()
    }

    fn enable_led_power(&mut self) {
        self.inner.enable_led_power()
    }

    fn disable_led_power(&mut self) {
        self.inner.disable_led_power()
    }

    fn fb_enable(&mut self) -> Result<(), HalError> {
        self.inner.fb_enable()
    }

    fn fb_disable(&mut self) {
        self.inner.fb_disable()
    }

    fn fb_set_brightness(&mut self, brightness: u8) {
        self.inner.fb_set_brightness(brightness)
    }

    fn fb_set_width(&mut self, width: u8) {
        self.inner.fb_set_width(width)
    }

    fn fb_enable_leds(&mut self, mask: u16) {
        self.inner.fb_enable_leds(mask)
    }

    fn fb_select_mux(&mut self, led: u8) {
        self.inner.fb_select_mux(led)
    }

    fn fb_set_delay(&mut self, delay: i16) {
        self.inner.fb_set_delay(delay)
    }

    fn fb_set_rate(&mut self, hz: u16) -> u16 {
        self.inner.fb_set_rate(hz)
    }

    fn clock_ticks(&self) -> u64 {
        self.inner.clock_ticks()
    }

    fn sleep_us(&mut self, us: u32) {
        self.inner.sleep_us(us)
    }
}

fn three_delta_hits() -> (AcquisitionContext, SimulatedDom) {
    let (mut ctx, mut dom) = setup(DataFormat::Delta, Compression::Delta);
    // Eight events of depth
    ctx.set_lbm_depth(14).unwrap();
    for _ in 0..3 {
        dom.push_compressed(&CompressedSlot::new(1, 16, 0, 0));
    }
    (ctx, dom)
}

#[test]
fn fill_rechecks_overflow_after_packing() {
    let (mut ctx, dom) = three_delta_hits();
    let start = ctx.read_cursor();
    // Four pointer reads inside the loop, the fifth is the final re-check
    let dom = RacingDom::new(dom, 5, 20);

    let mut buf = vec![0u8; 4096];
    let s = MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();

    assert_eq!(s.bytes, 0);
    assert_eq!(s.stop, StopReason::Overflow);
    assert_eq!(ctx.overflow_count(), 1);
    assert_eq!(ctx.triggers_read_out(), 0);
    assert_eq!(ctx.hit_count(), 0);
    let rd = ctx.read_cursor();
    assert_eq!(rd.raw() & 0x7FF, 0);
    assert_eq!(rd, geometry().advance_by(start, 23));
    assert_eq!(rd, dom.lbm_pointer());
}

#[test]
fn fill_does_not_trust_an_earlier_count() {
    let (mut ctx, dom) = three_delta_hits();
    let start = ctx.read_cursor();
    // count uses reads 1..=5; the writer laps the reader before fill
    let dom = RacingDom::new(dom, 6, 20);

    let counted = MessageBatchPacker::count(&ctx, &dom, 4096).unwrap();
    assert_eq!(counted.bytes, 8 + 3 * 16);
    assert_eq!(counted.stop, StopReason::NoData);

    let mut buf = vec![0u8; 4096];
    let s = MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();
    assert_eq!(s.bytes, 0);
    assert_eq!(s.stop, StopReason::Overflow);
    assert_eq!(ctx.overflow_count(), 1);
    assert_eq!(ctx.read_cursor(), geometry().advance_by(start, 23));
}

#[test]
fn fill_takes_events_written_after_count() {
    let (mut ctx, mut dom) = three_delta_hits();
    let counted = MessageBatchPacker::count(&ctx, &dom, 4096).unwrap();
    assert_eq!(counted.events, 3);

    dom.push_compressed(&CompressedSlot::new(1, 16, 0, 0));
    let mut buf = vec![0u8; 4096];
    let s = MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();
    assert_eq!(s.events, 4);
    assert_eq!(s.bytes, 8 + 4 * 16);
    assert_eq!(ctx.overflow_count(), 0);
}

#[test]
fn group_length_never_exceeds_sixteen_bits() {
    let (mut ctx, mut dom) = setup(DataFormat::Delta, Compression::Delta);
    for _ in 0..40 {
        dom.push_compressed(&CompressedSlot::new(1, 2000, 0, 0));
    }
    let mut buf = vec![0u8; 128 * 1024];
    let s = MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();
    assert_eq!(s.events, 32);
    assert_eq!(s.stop, StopReason::Full);
    assert_eq!(s.bytes, 8 + 32 * 2000);
    assert_eq!(u16::from_be_bytes([buf[0], buf[1]]) as usize, s.bytes);
}

#[derive(Debug, Clone)]
enum Slot {
    Hit { tag: u16, size: u16 },
    Uncompressed { size: u16 },
}

fn slot_strategy() -> impl Strategy<Value = Slot> {
    prop_oneof![
        8 => (0u16..3, 12u16..200).prop_map(|(tag, size)| Slot::Hit { tag, size }),
        1 => (12u16..200).prop_map(|size| Slot::Uncompressed { size }),
    ]
}

fn load(dom: &mut SimulatedDom, slots: &[Slot]) {
    for s in slots {
        match *s {
            Slot::Hit { tag, size } => dom.push_compressed(&CompressedSlot::new(tag, size, 0, 0)),
            Slot::Uncompressed { size } => {
                dom.push_compressed(&CompressedSlot::new(0, size, 0, 0).uncompressed())
            }
        }
    }
}

proptest! {
    #[test]
    fn count_then_fill_agree(
        slots in prop::collection::vec(slot_strategy(), 0..40),
        capacity in 16usize..4096,
        road_grade in any::<bool>(),
    ) {
        let (format, compression) = if road_grade {
            (DataFormat::RoadGrade, Compression::RoadGrade)
        } else {
            (DataFormat::Delta, Compression::Delta)
        };
        let (mut ctx, mut dom) = setup(format, compression);
        load(&mut dom, &slots);
        let start = ctx.read_cursor();

        let counted = MessageBatchPacker::count(&ctx, &dom, capacity).unwrap();
        prop_assert_eq!(ctx.read_cursor(), start);

        let mut buf = vec![0u8; capacity];
        let filled = MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();

        prop_assert_eq!(counted, filled);
        prop_assert_eq!(ctx.read_cursor(), geometry().advance_by(start, counted.events));
        prop_assert!(filled.bytes <= capacity);
    }

    #[test]
    fn engineering_count_then_fill_agree(
        n in 0usize..8,
        capacity in 16usize..8192,
        fadc_samples in any::<u8>(),
        m01 in any::<u8>(),
    ) {
        let (mut ctx, mut dom) = setup(DataFormat::Engineering, Compression::None);
        ctx.set_engineering_format(fadc_samples, m01, 0xFF);
        for i in 0..n {
            dom.push_engineering(
                &EngineeringSlot::new(i as u64, TriggerSource::SPE.bits()).with_baselines(3, 4),
            );
        }
        let counted = MessageBatchPacker::count(&ctx, &dom, capacity).unwrap();
        let mut buf = vec![0u8; capacity];
        let filled = MessageBatchPacker::fill(&mut ctx, &dom, &mut buf).unwrap();
        prop_assert_eq!(counted, filled);
        prop_assert_eq!(ctx.triggers_read_out(), counted.events as u64);
    }
}
