//! The scan controller (`ScannerCore`).
//!
//! One call to `tick` is one iteration of the control loop: honor a pending
//! settle hold, pop at most one command, apply the commands every state
//! accepts, then run the behavior of the current state. Events for the host
//! are queued and collected with `drain_events`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use filmscan_traits::{Clock, Led, PhotoSensor, Stepper, TensionSwitch};

use crate::channel::CommandChannel;
use crate::config::{ScanCfg, TensionCfg};
use crate::error::Result;
use crate::fixed_point::percent_of;
use crate::frame_steps::{FrameStepCalibrator, Observation};
use crate::hw_error::hw_report;
use crate::link::I2cPeripheral;
use crate::motion::{MotionRamp, RampLimits, RampStep, WindSpeed, advance};
use crate::pacing::ScanPacing;
use crate::protocol::{Command, Event, VERSION_MAJOR, VERSION_MINOR};
use crate::sensor::{PtEnvelope, SensorReader};
use crate::session::ScanSession;
use crate::status::{ScanResult, ScanState};
use crate::telemetry::{PlotterReporter, RepeatCollapser};
use crate::tension::CollectionThrottle;
use crate::threshold::ThresholdCalibrator;
use crate::types::{Gauge, LearnedLevels};

/// Settle time after engaging the reel solenoids or entering a manual mode.
const SHORT_SETTLE: Duration = Duration::from_millis(50);
/// Settle time around rewind / fast-forward.
const LONG_SETTLE: Duration = Duration::from_millis(100);
/// Capstan pulses sampled by the film-gate check.
const GATE_CHECK_PULSES: u32 = 301;
/// Pulse width for capstan moves during scanning; pacing happens between steps.
const CAPSTAN_PULSE: Duration = Duration::ZERO;

/// Reel motors and the tension switch.
pub struct Transport<M, T> {
    /// Motor A.
    pub supply: M,
    /// Motor B.
    pub capstan: M,
    /// Motor C.
    pub takeup: M,
    pub tension: T,
}

/// UV backlight and green progress LED.
pub struct Lamps<L> {
    pub uv: L,
    pub green: L,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Hold {
    until: Instant,
    then: Option<Event>,
}

/// Unified core for both dynamic (boxed) and generic (static dispatch) variants.
pub struct ScannerCore<P, M, T, L> {
    pub(crate) reader: SensorReader<P>,
    pub(crate) transport: Transport<M, T>,
    pub(crate) lamps: Lamps<L>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) channel: Arc<CommandChannel>,
    pub(crate) scan: ScanCfg,
    pub(crate) tension: TensionCfg,
    pub(crate) threshold: ThresholdCalibrator,
    pub(crate) frames: FrameStepCalibrator,
    pub(crate) pacing: ScanPacing,
    pub(crate) throttle: CollectionThrottle,
    pub(crate) wind: WindSpeed,
    pub(crate) ramp_limits: RampLimits,
    pub(crate) ramp: Option<MotionRamp>,
    pub(crate) session: ScanSession,
    pub(crate) hold: Option<Hold>,
    pub(crate) next_slow_move: Option<Instant>,
    pub(crate) plotter: PlotterReporter,
    pub(crate) debug: RepeatCollapser,
    pub(crate) events: VecDeque<Event>,
}

impl<P, M, T, L> std::fmt::Debug for ScannerCore<P, M, T, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerCore")
            .field("state", &self.session.state)
            .field("threshold", &self.threshold.threshold())
            .field("min_frame_steps", &self.frames.min_frame_steps())
            .field("frames", &self.session.frames)
            .finish()
    }
}

impl<P, M, T, L> ScannerCore<P, M, T, L>
where
    P: PhotoSensor,
    M: Stepper,
    T: TensionSwitch,
    L: Led,
{
    /// One iteration of the control loop.
    pub fn tick(&mut self) -> Result<ScanState> {
        let now = self.clock.now();
        if let Some(hold) = self.hold {
            if now < hold.until {
                return Ok(self.session.state);
            }
            self.hold = None;
            if let Some(event) = hold.then {
                self.emit(event);
            }
        }

        let command = self.next_command();

        self.plotter.report(
            now,
            self.reader.envelope(),
            self.threshold.threshold(),
            self.session.last_frame_steps,
        );

        if let Some(cmd) = command {
            self.apply_global(cmd);
        }

        match self.session.state {
            ScanState::Idle => self.idle(command)?,
            ScanState::Scanning => {
                self.collect()?;
                if command == Some(Command::StartScan) {
                    self.debug.log("-Scan");
                    self.enter(ScanState::Idle);
                } else if self.scan_step(command)? != ScanResult::NoFrame {
                    self.enter(ScanState::Idle);
                }
            }
            ScanState::SingleStep => {
                if self.scan_step(command)? != ScanResult::NoFrame {
                    self.enter(ScanState::Idle);
                }
            }
            ScanState::UnlockingReels => self.unlock_reels(command)?,
            ScanState::Rewinding | ScanState::FastForwarding => self.wind_step(command)?,
            ScanState::SlowForwarding => self.slow_forward(command)?,
        }
        Ok(self.session.state)
    }

    /// How long the caller may sleep before the next `tick` has work to do,
    /// capped at the idle poll interval (the scan loop period while scanning).
    pub fn idle_for(&self) -> Duration {
        let poll = if self.hold.is_none() && self.session.state == ScanState::Scanning {
            Duration::from_micros(self.tension.scan_loop_us)
        } else {
            Duration::from_micros(self.scan.idle_poll_us)
        };
        let deadline = match self.hold {
            Some(h) => Some(h.until),
            None => match self.session.state {
                ScanState::Scanning | ScanState::SingleStep => self.pacing.next_scan_at(),
                ScanState::SlowForwarding => self.next_slow_move,
                // Each ramp quantum already sleeps for its pulse.
                ScanState::Rewinding | ScanState::FastForwarding => return Duration::ZERO,
                ScanState::Idle | ScanState::UnlockingReels => None,
            },
        };
        match deadline {
            Some(at) => at.saturating_duration_since(self.clock.now()).min(poll),
            None => poll,
        }
    }

    /// Idle, nothing queued and no settle pending.
    pub fn is_quiescent(&self) -> bool {
        self.session.state == ScanState::Idle && self.hold.is_none() && self.channel.is_empty()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn state(&self) -> ScanState {
        self.session.state
    }
    pub fn session(&self) -> &ScanSession {
        &self.session
    }
    pub fn threshold(&self) -> &ThresholdCalibrator {
        &self.threshold
    }
    pub fn frame_steps(&self) -> &FrameStepCalibrator {
        &self.frames
    }
    pub fn pacing(&self) -> &ScanPacing {
        &self.pacing
    }
    pub fn throttle(&self) -> &CollectionThrottle {
        &self.throttle
    }
    pub fn wind(&self) -> &WindSpeed {
        &self.wind
    }
    pub fn envelope(&self) -> &PtEnvelope {
        self.reader.envelope()
    }
    pub fn hold_pending(&self) -> bool {
        self.hold.is_some()
    }
    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    /// Receive side bound to this scanner's channel.
    pub fn peripheral(&self) -> I2cPeripheral {
        I2cPeripheral::new(self.channel.clone())
    }

    /// Levels worth persisting for the next session.
    pub fn learned_levels(&self) -> LearnedLevels {
        LearnedLevels {
            pt_level: self.threshold.threshold().max(1),
            min_frame_steps: self.frames.min_frame_steps(),
        }
    }

    /// Check the gate for film: backlight on, settle, sample while moving
    /// the capstan, backlight off.
    pub fn film_in_gate(&mut self) -> Result<bool> {
        self.set_uv(true)?;
        self.clock.sleep(Duration::from_millis(self.scan.uv_warmup_ms));
        let (mut lo, mut hi) = (800i32, 0i32);
        for _ in 0..GATE_CHECK_PULSES {
            advance(&mut self.transport.capstan, 1, CAPSTAN_PULSE, self.clock.as_ref())?;
            let level = i32::from(self.reader.read_level(&mut self.threshold)?);
            hi = hi.max(level);
            lo = lo.min(level);
        }
        self.set_uv(false)?;
        let env = self.reader.envelope();
        let observed = i32::from(env.max_observed()) - i32::from(env.min_observed());
        let present = 2 * (hi - lo).abs() > observed;
        tracing::debug!(lo, hi, observed, present, "film gate check");
        Ok(present)
    }

    // ── Private: command handling ────────────────────────────────────────────

    fn next_command(&mut self) -> Option<Command> {
        let raw = self.channel.pop()?;
        match raw.decode() {
            Ok(cmd) => {
                tracing::debug!(?cmd, state = %self.session.state, "command");
                Some(cmd)
            }
            Err(e) => {
                tracing::warn!(code = raw.code, param = raw.param, error = %e, "dropping command");
                None
            }
        }
    }

    /// Commands honored in every state.
    fn apply_global(&mut self, cmd: Command) {
        match cmd {
            Command::VersionCheck => self.emit(Event::Version {
                major: VERSION_MAJOR,
                minor: VERSION_MINOR,
            }),
            Command::SetPtLevel(0) => {
                self.threshold.set_auto();
                self.debug.log(">PTLevel=0");
            }
            Command::SetPtLevel(p) if p <= crate::threshold::MAX_PT_LEVEL => {
                self.threshold.set_manual(p);
                self.debug.log(&format!(">PTLevel={p}"));
            }
            Command::SetPtLevel(p) => tracing::warn!(param = p, "pt level out of range, ignored"),
            Command::SetMinFrameSteps(0) => self.frames.set_auto(),
            Command::SetMinFrameSteps(p) => {
                if self.frames.set_manual(p) {
                    self.debug.log(&format!(">MinSteps={p}"));
                } else {
                    tracing::warn!(param = p, "min frame steps out of range, ignored");
                }
            }
            Command::SetFineTune(v) => self.pacing.set_fine_tune(v),
            Command::SetScanSpeed(p) => {
                if self.pacing.set_speed_param(p) {
                    self.throttle.speed_up();
                }
                tracing::debug!(speed_us = self.pacing.original_us(), "scan speed");
            }
            _ => {}
        }
    }

    fn idle(&mut self, command: Option<Command>) -> Result<()> {
        let Some(cmd) = command else {
            return Ok(());
        };
        match cmd {
            Command::StartScan => {
                self.debug.log(">Scan");
                self.enter(ScanState::Scanning);
                self.set_uv(true)?;
                self.hold_for(Duration::from_millis(self.scan.uv_warmup_ms), None);
                self.pacing.reset();
                self.throttle.reset(self.tension.scan_modulo);
            }
            Command::Terminate => {
                if self.session.uv_led_on {
                    self.set_uv(false)?;
                }
            }
            Command::NextFrame => {
                self.debug.log(">Next fr.");
                self.enter(ScanState::Scanning);
                self.pacing.reset();
                if self.threshold.is_auto() || self.frames.is_auto() {
                    self.emit(Event::AutoLevels {
                        threshold: self.threshold.threshold(),
                        min_frame_steps: self.frames.min_frame_steps(),
                    });
                }
            }
            Command::SelectGauge(gauge) => self.select_gauge(gauge),
            Command::ToggleReelLock => {
                self.enter(ScanState::UnlockingReels);
                self.hold_for(SHORT_SETTLE, None);
            }
            Command::FilmForward => {
                self.throttle.reset(self.tension.forward_modulo);
                self.enter(ScanState::SlowForwarding);
                self.hold_for(SHORT_SETTLE, None);
            }
            Command::SingleStep => {
                self.debug.log(">SStep");
                self.enter(ScanState::SingleStep);
                self.hold_for(SHORT_SETTLE, None);
            }
            Command::Rewind { checked } => {
                if checked && self.film_in_gate()? {
                    self.debug.log("Rwnd err");
                    self.emit(Event::RewindError);
                    self.hold_for(SHORT_SETTLE, None);
                } else {
                    self.debug.log("Rwnd");
                    self.set_neutrals(false, true, true)?;
                    self.start_ramp(ScanState::Rewinding);
                    self.hold_for(LONG_SETTLE, None);
                }
            }
            Command::FastForward { checked } => {
                if checked && self.film_in_gate()? {
                    self.debug.log("FF err");
                    self.emit(Event::FastForwardError);
                } else {
                    self.debug.log(">FF");
                    self.set_neutrals(true, true, false)?;
                    self.start_ramp(ScanState::FastForwarding);
                    self.hold_for(LONG_SETTLE, None);
                }
            }
            Command::IncreaseWindDelay => self.wind.slower(),
            Command::DecreaseWindDelay => self.wind.faster(),
            Command::VersionCheck
            | Command::SetPtLevel(_)
            | Command::SetMinFrameSteps(_)
            | Command::SetFineTune(_)
            | Command::SetScanSpeed(_) => {}
        }
        Ok(())
    }

    fn select_gauge(&mut self, gauge: Gauge) {
        self.threshold.select_gauge(gauge);
        self.frames.select_gauge(gauge);
        tracing::info!(
            %gauge,
            min_frame_steps = self.frames.min_frame_steps(),
            threshold = self.threshold.threshold(),
            "gauge selected"
        );
    }

    // ── Private: per-state behavior ──────────────────────────────────────────

    /// One paced scan step. Returns `NoFrame` while still searching.
    fn scan_step(&mut self, command: Option<Command>) -> Result<ScanResult> {
        let now = self.clock.now();
        let terminating = matches!(command, Some(Command::StartScan | Command::Terminate));
        if !terminating && !self.pacing.due(now) {
            return Ok(ScanResult::NoFrame);
        }
        self.pacing.schedule(now);

        self.set_uv(true)?;
        if self.session.green_led_on {
            self.session.green_led_on = false;
            self.set_green(0)?;
        }

        let decrease_at = self.frames.decrease_speed_steps();
        if self.session.frame_steps_done > u32::from(decrease_at) {
            self.pacing
                .slow_down(self.session.frame_steps_done, decrease_at);
        }

        let mut detected = false;
        if terminating {
            self.session.last_frame_steps = 0;
            if self.session.uv_led_on {
                self.set_uv(false)?;
            }
        } else {
            detected = self.hole_detected()?;
            if !detected {
                advance(&mut self.transport.capstan, 1, CAPSTAN_PULSE, self.clock.as_ref())?;
                self.session.frame_steps_done += 1;
                tracing::trace!(steps = self.session.frame_steps_done, "capstan step");
            }
        }

        let green = self.session.green_level();
        self.set_green(green)?;

        if terminating {
            return Ok(ScanResult::TerminationRequested);
        }

        if detected {
            self.debug.log("Frame!");
            let fine = self.pacing.fine_tune_steps();
            if fine > 0 {
                advance(&mut self.transport.capstan, u32::from(fine), CAPSTAN_PULSE, self.clock.as_ref())?;
            }
            let steps = self.session.frame_steps_done;
            self.session.frame_done(steps);
            if let Observation::Updated(min) = self.frames.observe(steps) {
                tracing::debug!(min_frame_steps = min, "frame steps relearned");
            }
            if self.session.state != ScanState::SingleStep {
                self.session.frames += 1;
                self.emit(Event::FrameAvailable);
            }
            self.debug.log(&format!("FrmS={steps}"));
            return Ok(ScanResult::FrameDetected);
        }

        let limit = 2 * u32::from(decrease_at);
        if self.session.frame_steps_done > limit {
            let steps = self.session.frame_steps_done;
            tracing::warn!(steps, limit, "no perforation found");
            self.session.scan_errors += 1;
            self.session.frame_steps_done = 0;
            self.emit(Event::ScanError {
                steps: clamp_u16(steps),
                limit: clamp_u16(limit),
            });
            return Ok(ScanResult::DetectionError);
        }
        Ok(ScanResult::NoFrame)
    }

    fn hole_detected(&mut self) -> Result<bool> {
        let level = self.reader.read_level(&mut self.threshold)?;
        let boosted = u32::from(level) + u32::from(self.pacing.pt_boost());
        let min = u32::from(self.frames.min_frame_steps());
        let steps = self.session.frame_steps_done;
        let optical = boosted >= u32::from(self.threshold.threshold()) && steps >= percent_of(min, 70);
        let fuse = steps > percent_of(min, 150);
        if optical || fuse {
            self.session.green_led_on = true;
            if fuse && !optical {
                tracing::debug!(steps, "frame forced by step limit");
            }
        }
        Ok(optical || fuse)
    }

    fn collect(&mut self) -> Result<()> {
        let modulo = self.throttle.modulo();
        self.throttle
            .tick(&mut self.transport.takeup, &mut self.transport.tension, self.clock.as_ref())?;
        if self.throttle.modulo() != modulo {
            self.debug.log(&format!("Collect Mod={}", self.throttle.modulo()));
        }
        Ok(())
    }

    fn unlock_reels(&mut self, command: Option<Command>) -> Result<()> {
        if command == Some(Command::ToggleReelLock) {
            self.session.reels_unlocked = false;
            set_neutral(&mut self.transport.capstan, false)?;
            set_neutral(&mut self.transport.takeup, false)?;
            self.enter(ScanState::Idle);
            self.set_uv(false)?;
            return Ok(());
        }
        if !self.session.reels_unlocked {
            self.session.reels_unlocked = true;
            set_neutral(&mut self.transport.capstan, true)?;
            set_neutral(&mut self.transport.takeup, true)?;
            self.set_uv(true)?;
        }
        // Only feeds the plotter.
        self.reader.read_level(&mut self.threshold)?;
        Ok(())
    }

    fn start_ramp(&mut self, state: ScanState) {
        self.ramp = Some(MotionRamp::new(self.wind.target_us(), self.ramp_limits));
        self.enter(state);
    }

    fn wind_step(&mut self, command: Option<Command>) -> Result<()> {
        let rewinding = self.session.state == ScanState::Rewinding;
        let stop = match command {
            Some(Command::Rewind { .. }) => rewinding,
            Some(Command::FastForward { .. }) => !rewinding,
            _ => false,
        };
        let target = self.wind.target_us();
        let limits = self.ramp_limits;
        let ramp = self.ramp.get_or_insert_with(|| MotionRamp::new(target, limits));
        match ramp.step(stop) {
            RampStep::Pulse(delay_us) => {
                let motor = if rewinding {
                    &mut self.transport.supply
                } else {
                    &mut self.transport.takeup
                };
                advance(motor, 1, Duration::from_micros(u64::from(delay_us)), self.clock.as_ref())?;
            }
            RampStep::Finished => {
                self.ramp = None;
                self.set_neutrals(true, false, false)?;
                let (line, event) = if rewinding {
                    ("-rwnd", Event::RewindEnded)
                } else {
                    ("-FF", Event::FastForwardEnded)
                };
                self.debug.log(line);
                self.enter(ScanState::Idle);
                self.hold_for(LONG_SETTLE, Some(event));
            }
        }
        Ok(())
    }

    fn slow_forward(&mut self, command: Option<Command>) -> Result<()> {
        if command == Some(Command::FilmForward) {
            self.next_slow_move = None;
            self.enter(ScanState::Idle);
            self.hold_for(SHORT_SETTLE, None);
            return Ok(());
        }
        let now = self.clock.now();
        if self.next_slow_move.is_none_or(|at| now >= at) {
            self.reader.read_level(&mut self.threshold)?;
            self.collect()?;
            advance(&mut self.transport.capstan, 1, CAPSTAN_PULSE, self.clock.as_ref())?;
            self.next_slow_move =
                Some(now + Duration::from_micros(self.tension.slow_forward_period_us));
        }
        Ok(())
    }

    // ── Private: outputs ─────────────────────────────────────────────────────

    fn enter(&mut self, state: ScanState) {
        if self.session.state != state {
            tracing::debug!(from = %self.session.state, to = %state, "state");
            self.session.state = state;
        }
    }

    fn emit(&mut self, event: Event) {
        tracing::debug!(event = event.name(), params = ?event.params(), "event");
        self.events.push_back(event);
    }

    fn hold_for(&mut self, d: Duration, then: Option<Event>) {
        self.hold = Some(Hold {
            until: self.clock.now() + d,
            then,
        });
    }

    fn set_uv(&mut self, on: bool) -> Result<()> {
        let level = if on { self.scan.uv_brightness } else { 0 };
        self.lamps
            .uv
            .set_level(level)
            .map_err(hw_report)
            .wrap_err("set uv led")?;
        self.session.uv_led_on = on;
        Ok(())
    }

    fn set_green(&mut self, level: u16) -> Result<()> {
        self.lamps
            .green
            .set_level(level)
            .map_err(hw_report)
            .wrap_err("set green led")
    }

    /// Drive the three neutral lines (`true` releases the motor).
    fn set_neutrals(&mut self, supply: bool, capstan: bool, takeup: bool) -> Result<()> {
        set_neutral(&mut self.transport.supply, supply)?;
        set_neutral(&mut self.transport.capstan, capstan)?;
        set_neutral(&mut self.transport.takeup, takeup)
    }
}

fn set_neutral<M: Stepper + ?Sized>(motor: &mut M, released: bool) -> Result<()> {
    motor
        .set_neutral(released)
        .map_err(hw_report)
        .wrap_err("set motor neutral")
}

fn clamp_u16(v: u32) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}
