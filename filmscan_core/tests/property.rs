use std::collections::VecDeque;

use filmscan_core::frame_steps::{GaugeSteps, Observation};
use filmscan_core::sensor::PtEnvelope;
use filmscan_core::protocol::EVENT_FRAME_LEN;
use filmscan_core::{
    CommandChannel, EventFrame, FrameStepCalibrator, Gauge, GaugeThresholds, RawCommand, ThresholdCalibrator,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Push(u8, u16),
    Pop,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), any::<u16>()).prop_map(|(c, p)| Op::Push(c, p)),
        Just(Op::Pop),
    ]
}

fn baselines() -> GaugeSteps {
    GaugeSteps {
        super8: 285,
        regular8: 235,
    }
}

proptest! {
    #[test]
    fn channel_is_fifo_with_one_spare_slot(ops in prop::collection::vec(op(), 0..200)) {
        let ch: CommandChannel<8> = CommandChannel::new();
        let mut model = VecDeque::new();
        for op in ops {
            match op {
                Op::Push(c, p) => {
                    let accepted = ch.push(c, p);
                    prop_assert_eq!(accepted, model.len() < 7);
                    if accepted {
                        model.push_back(RawCommand::new(c, p));
                    }
                }
                Op::Pop => prop_assert_eq!(ch.pop(), model.pop_front()),
            }
            prop_assert_eq!(ch.len(), model.len());
        }
    }

    #[test]
    fn observed_extremes_only_widen(levels in prop::collection::vec(0u16..=1023, 1..300)) {
        let mut env = PtEnvelope::new();
        let (mut max, mut min) = (env.max_observed(), env.min_observed());
        for &l in &levels {
            env.observe(l);
            prop_assert!(env.max_observed() >= max);
            prop_assert!(env.min_observed() <= min);
            prop_assert_eq!(env.raw(), l);
            max = env.max_observed();
            min = env.min_observed();
        }
    }

    #[test]
    fn dynamic_min_holds_or_rises_on_rising_input(
        levels in prop::collection::vec(0u16..=1023, 2..300).prop_map(|mut v| {
            v.sort_unstable();
            v
        }),
    ) {
        let mut env = PtEnvelope::new();
        env.observe(levels[0]);
        let mut min = env.min_dynamic();
        for &l in &levels[1..] {
            env.observe(l);
            prop_assert!(env.min_dynamic() >= min, "{} dropped below {}", env.min_dynamic(), min);
            min = env.min_dynamic();
        }
    }

    #[test]
    fn event_frames_survive_the_wire(code in any::<u8>(), params in any::<[u16; 4]>()) {
        let frame = EventFrame::new(code, params);
        let bytes = frame.encode();
        prop_assert_eq!(bytes.len(), EVENT_FRAME_LEN);
        prop_assert_eq!(bytes[0], code);
        prop_assert_eq!(EventFrame::decode(&bytes), Ok(frame));
        prop_assert!(EventFrame::decode(&bytes[..EVENT_FRAME_LEN - 1]).is_err());
    }

    #[test]
    fn auto_threshold_stays_inside_the_envelope(
        levels in prop::collection::vec(0u16..=1023, 1..300),
        ratio in 1u8..=100,
    ) {
        let mut env = PtEnvelope::new();
        let mut cal = ThresholdCalibrator::new(GaugeThresholds::default(), Gauge::Super8, ratio);
        for &l in &levels {
            env.observe(l);
            cal.track(&env);
            let lo = env.min_dynamic().min(env.max_dynamic()) / 10;
            let hi = env.min_dynamic().max(env.max_dynamic()) / 10;
            let t = i32::from(cal.threshold());
            prop_assert!(lo <= t && t <= hi, "{} not in {}..={}", t, lo, hi);
            prop_assert!(cal.threshold() <= env.max_observed());
        }
    }

    #[test]
    fn full_window_learns_rounded_mean_minus_margin(
        samples in prop::collection::vec(271u32..=299, 32),
    ) {
        let mut cal = FrameStepCalibrator::new(baselines(), Gauge::Super8, 0);
        let mut last = Observation::Recorded;
        for &s in &samples {
            last = cal.observe(s);
        }
        let total: u32 = samples.iter().sum();
        let mean = (f64::from(total) / 32.0).round() as u16;
        prop_assert_eq!(last, Observation::Updated(mean - 10));
        prop_assert_eq!(cal.min_frame_steps(), mean - 10);
    }

    #[test]
    fn outliers_never_enter_the_window(steps in prop_oneof![0u32..270, 300u32..5000]) {
        let mut cal = FrameStepCalibrator::new(baselines(), Gauge::Super8, 0);
        prop_assert_eq!(cal.observe(steps), Observation::Rejected);
        prop_assert_eq!(cal.samples(), 0);
        prop_assert_eq!(cal.min_frame_steps(), 285);
    }

    #[test]
    fn decoded_commands_encode_back(code in any::<u8>(), param in any::<u16>()) {
        let raw = RawCommand::new(code, param);
        if let Ok(cmd) = raw.decode() {
            let back = cmd.encode();
            prop_assert_eq!(back.code, code);
            prop_assert_eq!(back.decode(), Ok(cmd));
        }
    }
}

#[test]
fn manual_steps_stop_learning() {
    let mut cal = FrameStepCalibrator::new(baselines(), Gauge::Super8, 0);
    assert!(cal.set_manual(300));
    for _ in 0..32 {
        cal.observe(300);
    }
    assert_eq!(cal.min_frame_steps(), 300);
    assert!(!cal.set_manual(700));
    cal.select_gauge(Gauge::Regular8);
    cal.select_gauge(Gauge::Super8);
    assert_eq!(cal.min_frame_steps(), 300, "manual value rebases the gauge baseline");
}
