use std::time::Duration;

use filmscan_core::mocks::{CountingStepper, FixedSwitch, RecordingLed, ScriptedSensor, StepperTally};
use filmscan_core::{Command, Event, Gauge, ScanCfg, ScanState, Scanner};
use filmscan_traits::{Clock, ManualClock};
use rstest::rstest;

struct Rig {
    scanner: Scanner,
    clock: ManualClock,
    capstan: StepperTally,
    takeup: StepperTally,
    uv: std::rc::Rc<std::cell::Cell<u16>>,
}

fn rig(scan: ScanCfg, sensor: ScriptedSensor) -> Rig {
    let clock = ManualClock::new();
    let capstan = CountingStepper::new();
    let takeup = CountingStepper::new();
    let uv = RecordingLed::new();
    let (capstan_tally, takeup_tally, uv_level) = (capstan.tally(), takeup.tally(), uv.level());
    let scanner = Scanner::builder()
        .with_sensor(sensor)
        .with_transport(CountingStepper::new(), capstan, takeup, FixedSwitch(true))
        .with_leds(uv, RecordingLed::new())
        .with_scan(scan)
        .with_clock(Box::new(clock.clone()))
        .build()
        .unwrap();
    Rig {
        scanner,
        clock,
        capstan: capstan_tally,
        takeup: takeup_tally,
        uv: uv_level,
    }
}

impl Rig {
    fn send(&self, cmd: Command) {
        assert!(self.scanner.peripheral().send(cmd));
    }

    fn tick(&mut self) -> ScanState {
        self.scanner.tick().unwrap()
    }

    /// Tick, sleeping as the scanner asks, until an event shows up.
    fn run_until_event(&mut self, max_ticks: usize) -> Vec<Event> {
        for _ in 0..max_ticks {
            self.tick();
            let events = self.scanner.drain_events();
            if !events.is_empty() {
                return events;
            }
            self.clock.sleep(self.scanner.idle_for());
        }
        panic!("no event after {max_ticks} ticks");
    }
}

#[test]
fn start_scan_turns_uv_on_and_waits_for_warmup() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    r.send(Command::StartScan);
    assert_eq!(r.tick(), ScanState::Scanning);
    assert_eq!(r.uv.get(), u16::MAX);
    assert!(r.scanner.core().hold_pending());

    // Nothing moves until the lamp has warmed up.
    r.clock.advance(Duration::from_millis(499));
    r.tick();
    assert_eq!(r.capstan.pulses(), 0);
    r.clock.advance(Duration::from_millis(1));
    r.tick();
    assert_eq!(r.capstan.pulses(), 1);
}

#[test]
fn next_frame_reports_auto_levels() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    r.send(Command::NextFrame);
    assert_eq!(r.tick(), ScanState::Scanning);
    assert_eq!(
        r.scanner.drain_events(),
        vec![Event::AutoLevels {
            threshold: 90,
            min_frame_steps: 285
        }]
    );
}

#[test]
fn next_frame_with_manual_levels_is_silent() {
    let scan = ScanCfg {
        pt_level: 400,
        min_frame_steps: 280,
        ..ScanCfg::default()
    };
    let mut r = rig(scan, ScriptedSensor::constant(60));
    r.send(Command::NextFrame);
    r.tick();
    assert!(r.scanner.drain_events().is_empty());
}

#[test]
fn missing_perforation_raises_scan_error() {
    let scan = ScanCfg {
        pt_level: 500,
        min_frame_steps: 200,
        slowdown_lead_steps: 99,
        ..ScanCfg::default()
    };
    let mut r = rig(scan, ScriptedSensor::constant(60));
    r.send(Command::StartScan);
    let events = r.run_until_event(1_000_000);
    assert_eq!(
        events,
        vec![Event::ScanError {
            steps: 203,
            limit: 202
        }]
    );
    assert_eq!(r.scanner.state(), ScanState::Idle);
    assert_eq!(r.capstan.pulses(), 203);
    assert_eq!(r.scanner.session().scan_errors, 1);
    assert_eq!(r.scanner.session().frame_steps_done, 0);
}

#[test]
fn frame_is_detected_once_past_seventy_percent() {
    let scan = ScanCfg {
        pt_level: 400,
        ..ScanCfg::default()
    };
    // Bright from the first read, but too early to count as a perforation.
    let mut levels = vec![800u16; 10];
    levels.extend(std::iter::repeat_n(60, 200));
    levels.push(800);
    let mut r = rig(scan, ScriptedSensor::new(levels));
    r.send(Command::StartScan);
    let events = r.run_until_event(1_000_000);
    assert_eq!(events, vec![Event::FrameAvailable]);
    assert_eq!(r.capstan.pulses(), 210);
    assert_eq!(r.scanner.session().last_frame_steps, 210);
    assert_eq!(r.scanner.session().frames, 1);
    assert_eq!(r.scanner.state(), ScanState::Idle);
    // The lamp stays lit between frames.
    assert_eq!(r.uv.get(), u16::MAX);
}

#[test]
fn throttle_runs_on_every_loop_pass_between_capstan_steps() {
    let clock = ManualClock::new();
    let capstan = CountingStepper::new();
    let takeup = CountingStepper::new();
    let (capstan_tally, takeup_tally) = (capstan.tally(), takeup.tally());
    let mut scanner = Scanner::builder()
        .with_sensor(ScriptedSensor::constant(60))
        .with_transport(CountingStepper::new(), capstan, takeup, FixedSwitch(false))
        .with_leds(RecordingLed::new(), RecordingLed::new())
        .with_clock(Box::new(clock.clone()))
        .build()
        .unwrap();
    scanner.peripheral().send(Command::StartScan);
    scanner.tick().unwrap();
    assert_eq!(scanner.idle_for(), Duration::from_micros(100));
    clock.advance(Duration::from_millis(500));

    scanner.tick().unwrap();
    assert_eq!(scanner.idle_for(), Duration::from_micros(1));
    for _ in 0..10 {
        clock.sleep(scanner.idle_for());
        scanner.tick().unwrap();
    }
    // Two capstan steps 10 us apart, with the modulo-10 throttle firing once per step.
    assert_eq!(capstan_tally.pulses(), 2);
    assert_eq!(takeup_tally.pulses(), 2);
    assert_eq!(scanner.core().throttle().modulo(), 10);
}

#[test]
fn terminate_during_scan_returns_to_idle_with_uv_off() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    r.send(Command::StartScan);
    r.tick();
    r.clock.advance(Duration::from_millis(500));
    r.tick();
    assert_eq!(r.capstan.pulses(), 1);

    r.send(Command::Terminate);
    assert_eq!(r.tick(), ScanState::Idle);
    assert_eq!(r.uv.get(), 0);
    assert_eq!(r.scanner.session().last_frame_steps, 0);
    assert_eq!(r.capstan.pulses(), 1);
}

#[test]
fn start_scan_again_stops_scanning() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    r.send(Command::StartScan);
    r.tick();
    r.clock.advance(Duration::from_millis(500));
    r.send(Command::StartScan);
    assert_eq!(r.tick(), ScanState::Idle);
}

#[test]
fn frame_step_count_carries_over_a_restarted_scan() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    r.send(Command::StartScan);
    r.tick();
    r.clock.advance(Duration::from_millis(500));
    for _ in 0..3 {
        r.tick();
        r.clock.advance(Duration::from_micros(10));
    }
    assert_eq!(r.scanner.session().frame_steps_done, 3);
    r.send(Command::Terminate);
    assert_eq!(r.tick(), ScanState::Idle);

    // The film has not moved, so the partial frame still counts.
    r.send(Command::StartScan);
    r.tick();
    r.clock.advance(Duration::from_millis(500));
    r.tick();
    assert_eq!(r.scanner.session().frame_steps_done, 4);
    assert_eq!(r.capstan.pulses(), 4);
}

#[test]
fn version_check_answers_in_any_state() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    r.send(Command::FilmForward);
    r.tick();
    r.clock.advance(Duration::from_millis(50));
    r.send(Command::VersionCheck);
    assert_eq!(r.tick(), ScanState::SlowForwarding);
    assert_eq!(
        r.scanner.drain_events(),
        vec![Event::Version { major: 1, minor: 0 }]
    );
}

#[rstest]
#[case(Gauge::Regular8, 235, 180)]
#[case(Gauge::Super8, 285, 90)]
fn selecting_a_gauge_twice_is_idempotent(
    #[case] gauge: Gauge,
    #[case] steps: u16,
    #[case] threshold: u16,
) {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    for _ in 0..2 {
        r.send(Command::SelectGauge(gauge));
        r.tick();
        assert_eq!(r.scanner.frame_steps().min_frame_steps(), steps);
        assert_eq!(r.scanner.frame_steps().gauge(), gauge);
        assert_eq!(r.scanner.threshold().original(), threshold);
    }
}

#[test]
fn manual_levels_follow_the_gauge() {
    let scan = ScanCfg {
        pt_level: 300,
        ..ScanCfg::default()
    };
    let mut r = rig(scan, ScriptedSensor::constant(60));
    r.send(Command::SelectGauge(Gauge::Regular8));
    r.tick();
    assert_eq!(r.scanner.threshold().threshold(), 180);
}

#[rstest]
#[case(Command::SetPtLevel(950), 90)]
#[case(Command::SetPtLevel(450), 450)]
fn pt_level_out_of_range_is_ignored(#[case] cmd: Command, #[case] expected: u16) {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    r.send(cmd);
    r.tick();
    assert_eq!(r.scanner.threshold().threshold(), expected);
}

#[test]
fn reel_lock_toggles_neutrals_and_uv() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    r.send(Command::ToggleReelLock);
    assert_eq!(r.tick(), ScanState::UnlockingReels);
    r.clock.advance(Duration::from_millis(50));
    r.tick();
    assert!(r.capstan.released());
    assert!(r.takeup.released());
    assert_eq!(r.uv.get(), u16::MAX);
    assert!(r.scanner.session().reels_unlocked);

    r.send(Command::ToggleReelLock);
    assert_eq!(r.tick(), ScanState::Idle);
    assert!(!r.capstan.released());
    assert!(!r.takeup.released());
    assert_eq!(r.uv.get(), 0);
}

#[test]
fn slow_forward_moves_one_step_per_period() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    r.send(Command::FilmForward);
    assert_eq!(r.tick(), ScanState::SlowForwarding);
    r.clock.advance(Duration::from_millis(50));
    r.tick();
    assert_eq!(r.capstan.pulses(), 1);
    r.tick();
    assert_eq!(r.capstan.pulses(), 1);
    r.clock.advance(Duration::from_micros(700));
    r.tick();
    assert_eq!(r.capstan.pulses(), 2);

    r.send(Command::FilmForward);
    assert_eq!(r.tick(), ScanState::Idle);
    assert!(r.scanner.core().hold_pending());
}

#[test]
fn scan_speed_changes_pacing() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    assert_eq!(r.scanner.core().pacing().original_us(), 10);
    r.send(Command::SetScanSpeed(1));
    r.tick();
    assert_eq!(r.scanner.core().pacing().original_us(), 910);
    r.send(Command::SetScanSpeed(10));
    r.tick();
    assert_eq!(r.scanner.core().pacing().original_us(), 10);
}

#[test]
fn unknown_command_is_dropped() {
    let mut r = rig(ScanCfg::default(), ScriptedSensor::constant(60));
    assert!(r.scanner.peripheral().on_receive(&[99, 0, 0]) == 1);
    assert_eq!(r.tick(), ScanState::Idle);
    assert!(r.scanner.drain_events().is_empty());
    assert!(r.scanner.is_quiescent());
}

#[test]
fn sensor_failure_propagates_from_tick() {
    let clock = ManualClock::new();
    let mut scanner = Scanner::builder()
        .with_sensor(filmscan_core::mocks::FailingSensor)
        .with_transport(
            CountingStepper::new(),
            CountingStepper::new(),
            CountingStepper::new(),
            FixedSwitch(true),
        )
        .with_leds(RecordingLed::new(), RecordingLed::new())
        .with_clock(Box::new(clock.clone()))
        .build()
        .unwrap();
    scanner.peripheral().send(Command::FilmForward);
    scanner.tick().unwrap();
    clock.advance(Duration::from_millis(50));
    let err = scanner.tick().unwrap_err();
    assert!(format!("{err:#}").contains("read phototransistor"));
}
