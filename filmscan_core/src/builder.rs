//! Type-state builder for `Scanner` and generic `build_scanner` constructor.
//!
//! The builder enforces at compile time that the sensor, the transport and the
//! LEDs are provided before `build()` is available. `try_build()` is always
//! available for dynamic checks.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use filmscan_traits::{Clock, Led, MonotonicClock, PhotoSensor, Stepper, TensionSwitch};

use crate::channel::CommandChannel;
use crate::config::{ScanCfg, TelemetryCfg, TensionCfg, WindCfg};
use crate::error::{BuildError, Result};
use crate::frame_steps::{FrameGeometry, FrameStepCalibrator, MIN_MANUAL_STEPS};
use crate::link::I2cPeripheral;
use crate::machine::{Lamps, ScannerCore, Transport};
use crate::motion::{RampLimits, WindSpeed};
use crate::pacing::ScanPacing;
use crate::protocol::Event;
use crate::sensor::{PtEnvelope, SensorReader};
use crate::session::ScanSession;
use crate::status::ScanState;
use crate::telemetry::{PlotterReporter, RepeatCollapser};
use crate::tension::CollectionThrottle;
use crate::threshold::{GaugeThresholds, MAX_PT_LEVEL, ThresholdCalibrator};
use crate::types::LearnedLevels;

/// Core with every device boxed, as held by `Scanner`.
pub type DynScannerCore = ScannerCore<
    Box<dyn PhotoSensor>,
    Box<dyn Stepper>,
    Box<dyn TensionSwitch>,
    Box<dyn Led>,
>;

// ── Public dynamic-dispatch wrapper ──────────────────────────────────────────

/// Public dynamic (boxed) scanner.
pub struct Scanner {
    pub(crate) inner: DynScannerCore,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

impl Scanner {
    /// Start building a Scanner.
    pub fn builder() -> ScannerBuilder<Missing, Missing, Missing> {
        ScannerBuilder::default()
    }

    /// One iteration of the control loop.
    pub fn tick(&mut self) -> Result<ScanState> {
        self.inner.tick()
    }

    pub fn idle_for(&self) -> Duration {
        self.inner.idle_for()
    }

    pub fn is_quiescent(&self) -> bool {
        self.inner.is_quiescent()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.inner.drain_events()
    }

    pub fn state(&self) -> ScanState {
        self.inner.state()
    }

    pub fn session(&self) -> &ScanSession {
        self.inner.session()
    }

    pub fn threshold(&self) -> &ThresholdCalibrator {
        self.inner.threshold()
    }

    pub fn frame_steps(&self) -> &FrameStepCalibrator {
        self.inner.frame_steps()
    }

    pub fn envelope(&self) -> &PtEnvelope {
        self.inner.envelope()
    }

    pub fn peripheral(&self) -> I2cPeripheral {
        self.inner.peripheral()
    }

    pub fn learned_levels(&self) -> LearnedLevels {
        self.inner.learned_levels()
    }

    pub fn film_in_gate(&mut self) -> Result<bool> {
        self.inner.film_in_gate()
    }

    /// Access to the generic core, e.g. for pacing and wind inspection.
    pub fn core(&self) -> &DynScannerCore {
        &self.inner
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Runtime settings shared by the builder and `build_scanner`.
#[derive(Debug, Clone, Default)]
pub struct ScannerSettings {
    pub scan: ScanCfg,
    pub wind: WindCfg,
    pub tension: TensionCfg,
    pub telemetry: TelemetryCfg,
    pub geometry: FrameGeometry,
    pub thresholds: GaugeThresholds,
    /// Levels learned by a previous session.
    pub learned: Option<LearnedLevels>,
}

/// Builder for `Scanner`. All fields are validated on `build()`.
pub struct ScannerBuilder<S, T, L> {
    sensor: Option<Box<dyn PhotoSensor>>,
    transport: Option<Transport<Box<dyn Stepper>, Box<dyn TensionSwitch>>>,
    lamps: Option<Lamps<Box<dyn Led>>>,
    settings: ScannerSettings,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    channel: Option<Arc<CommandChannel>>,
    _s: PhantomData<S>,
    _t: PhantomData<T>,
    _l: PhantomData<L>,
}

impl Default for ScannerBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            transport: None,
            lamps: None,
            settings: ScannerSettings::default(),
            clock: None,
            channel: None,
            _s: PhantomData,
            _t: PhantomData,
            _l: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate settings and construct a `ScannerCore`.
///
/// Single source of truth for validation and construction, used by both
/// `ScannerBuilder::try_build()` and `build_scanner()`.
fn validate_and_build<P, M, T, L>(
    sensor: P,
    transport: Transport<M, T>,
    lamps: Lamps<L>,
    settings: ScannerSettings,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    channel: Option<Arc<CommandChannel>>,
) -> Result<ScannerCore<P, M, T, L>>
where
    P: PhotoSensor,
    M: Stepper,
    T: TensionSwitch,
    L: Led,
{
    let ScannerSettings {
        scan,
        wind,
        tension,
        telemetry,
        geometry,
        thresholds,
        learned,
    } = settings;

    // ── Validation ───────────────────────────────────────────────────────────
    if scan.pt_level > MAX_PT_LEVEL {
        return Err(invalid("pt_level must be 0 (auto) or in 1..=900"));
    }
    if scan.min_frame_steps != 0 && !(100..=600).contains(&scan.min_frame_steps) {
        return Err(invalid("min_frame_steps must be 0 (auto) or in 100..=600"));
    }
    if scan.auto_level_ratio == 0 || scan.auto_level_ratio > 100 {
        return Err(invalid("auto_level_ratio must be in 1..=100"));
    }
    if scan.slowdown_lead_steps >= MIN_MANUAL_STEPS {
        return Err(invalid("slowdown_lead_steps must be below 100"));
    }
    if !(1..=10).contains(&scan.scan_speed) {
        return Err(invalid("scan_speed must be in 1..=10"));
    }
    if scan.uv_brightness == 0 {
        return Err(invalid("uv_brightness must be > 0"));
    }
    if scan.idle_poll_us == 0 {
        return Err(invalid("idle_poll_us must be >= 1"));
    }
    if !(geometry.capstan_diameter_mm > 0.0 && geometry.step_angle_deg > 0.0) {
        return Err(invalid("capstan diameter and step angle must be > 0"));
    }
    if geometry.microsteps == 0 {
        return Err(invalid("microsteps must be >= 1"));
    }
    if wind.min_target_us == 0 || wind.min_target_us > wind.max_target_us {
        return Err(invalid("wind target bounds must satisfy 1 <= min <= max"));
    }
    if wind.stop_delay_us < wind.max_target_us {
        return Err(invalid("wind stop delay must be >= max target"));
    }
    if wind.ramp_divisor == 0 {
        return Err(invalid("wind ramp divisor must be >= 1"));
    }
    if tension.scan_modulo == 0 || tension.forward_modulo == 0 || tension.modulo_floor == 0 {
        return Err(invalid("tension modulos must be >= 1"));
    }
    if tension.slow_forward_period_us == 0 {
        return Err(invalid("slow_forward_period_us must be >= 1"));
    }
    if tension.scan_loop_us == 0 {
        return Err(invalid("scan_loop_us must be >= 1"));
    }

    // ── Assemble ─────────────────────────────────────────────────────────────
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    let channel = channel.unwrap_or_default();

    let mut threshold = ThresholdCalibrator::new(thresholds, scan.gauge, scan.auto_level_ratio);
    let mut frames = FrameStepCalibrator::new(
        geometry.defaults(),
        scan.gauge,
        scan.slowdown_lead_steps,
    );
    if let Some(levels) = learned {
        threshold.seed(levels.pt_level);
        frames.seed(levels.min_frame_steps);
        tracing::info!(
            pt_level = levels.pt_level,
            min_frame_steps = levels.min_frame_steps,
            "seeded learned levels"
        );
    }
    if scan.pt_level != 0 {
        threshold.set_manual(scan.pt_level);
    }
    if scan.min_frame_steps != 0 {
        frames.set_manual(scan.min_frame_steps);
    }

    let now: Instant = clock.now();
    let pacing = ScanPacing::new(&scan);
    let throttle = CollectionThrottle::new(
        tension.scan_modulo,
        tension.modulo_floor,
        Duration::from_millis(tension.window_ms),
        now,
    );
    let wind_speed = WindSpeed::new(
        wind.target_delay_us,
        wind.adjust_step_us,
        wind.min_target_us,
        wind.max_target_us,
    );
    let ramp_limits = RampLimits {
        stop_delay_us: wind.stop_delay_us,
        divisor: wind.ramp_divisor,
    };
    let plotter = PlotterReporter::new(
        telemetry.plotter,
        Duration::from_millis(telemetry.interval_ms),
    );

    Ok(ScannerCore {
        reader: SensorReader::new(sensor),
        transport,
        lamps,
        clock,
        channel,
        scan,
        tension,
        threshold,
        frames,
        pacing,
        throttle,
        wind: wind_speed,
        ramp_limits,
        ramp: None,
        session: ScanSession::default(),
        hold: None,
        next_slow_move: None,
        plotter,
        debug: RepeatCollapser::new(telemetry.max_repetitions),
        events: VecDeque::new(),
    })
}

impl<S, T, L> ScannerBuilder<S, T, L> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Scanner> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let transport = self
            .transport
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTransport))?;
        let lamps = self
            .lamps
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLeds))?;
        let inner = validate_and_build(
            sensor,
            transport,
            lamps,
            self.settings,
            self.clock,
            self.channel,
        )?;
        Ok(Scanner { inner })
    }
}

/// Chainable setters that do not affect type-state.
impl<S, T, L> ScannerBuilder<S, T, L> {
    pub fn with_scan(mut self, scan: ScanCfg) -> Self {
        self.settings.scan = scan;
        self
    }
    pub fn with_wind(mut self, wind: WindCfg) -> Self {
        self.settings.wind = wind;
        self
    }
    pub fn with_tension(mut self, tension: TensionCfg) -> Self {
        self.settings.tension = tension;
        self
    }
    pub fn with_telemetry(mut self, telemetry: TelemetryCfg) -> Self {
        self.settings.telemetry = telemetry;
        self
    }
    pub fn with_geometry(mut self, geometry: FrameGeometry) -> Self {
        self.settings.geometry = geometry;
        self
    }
    pub fn with_thresholds(mut self, thresholds: GaugeThresholds) -> Self {
        self.settings.thresholds = thresholds;
        self
    }
    pub fn with_learned_levels(mut self, levels: LearnedLevels) -> Self {
        self.settings.learned = Some(levels);
        self
    }
    pub fn with_settings(mut self, settings: ScannerSettings) -> Self {
        self.settings = settings;
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    /// Share an existing command channel (e.g. with a receive thread).
    pub fn with_channel(mut self, channel: Arc<CommandChannel>) -> Self {
        self.channel = Some(channel);
        self
    }
}

// Setters that advance type-state
impl<T, L> ScannerBuilder<Missing, T, L> {
    pub fn with_sensor(self, sensor: impl PhotoSensor + 'static) -> ScannerBuilder<Set, T, L> {
        ScannerBuilder {
            sensor: Some(Box::new(sensor)),
            transport: self.transport,
            lamps: self.lamps,
            settings: self.settings,
            clock: self.clock,
            channel: self.channel,
            _s: PhantomData,
            _t: PhantomData,
            _l: PhantomData,
        }
    }
}

impl<S, L> ScannerBuilder<S, Missing, L> {
    /// Supply (A), capstan (B) and take-up (C) motors plus the tension switch.
    pub fn with_transport(
        self,
        supply: impl Stepper + 'static,
        capstan: impl Stepper + 'static,
        takeup: impl Stepper + 'static,
        tension: impl TensionSwitch + 'static,
    ) -> ScannerBuilder<S, Set, L> {
        ScannerBuilder {
            sensor: self.sensor,
            transport: Some(Transport {
                supply: Box::new(supply),
                capstan: Box::new(capstan),
                takeup: Box::new(takeup),
                tension: Box::new(tension),
            }),
            lamps: self.lamps,
            settings: self.settings,
            clock: self.clock,
            channel: self.channel,
            _s: PhantomData,
            _t: PhantomData,
            _l: PhantomData,
        }
    }
}

impl<S, T> ScannerBuilder<S, T, Missing> {
    pub fn with_leds(
        self,
        uv: impl Led + 'static,
        green: impl Led + 'static,
    ) -> ScannerBuilder<S, T, Set> {
        ScannerBuilder {
            sensor: self.sensor,
            transport: self.transport,
            lamps: Some(Lamps {
                uv: Box::new(uv),
                green: Box::new(green),
            }),
            settings: self.settings,
            clock: self.clock,
            channel: self.channel,
            _s: PhantomData,
            _t: PhantomData,
            _l: PhantomData,
        }
    }
}

impl ScannerBuilder<Set, Set, Set> {
    /// Validate and build the Scanner. Only available when sensor, transport and LEDs are set.
    pub fn build(self) -> Result<Scanner> {
        self.try_build()
    }
}

/// Generic, statically-dispatched alias using the unified core.
pub type ScannerG<P, M, T, L> = ScannerCore<P, M, T, L>;

/// Build a generic, statically-dispatched `ScannerG` from concrete devices.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_scanner<P, M, T, L>(
    sensor: P,
    transport: Transport<M, T>,
    lamps: Lamps<L>,
    settings: ScannerSettings,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    channel: Option<Arc<CommandChannel>>,
) -> Result<ScannerG<P, M, T, L>>
where
    P: PhotoSensor,
    M: Stepper,
    T: TensionSwitch,
    L: Led,
{
    validate_and_build(sensor, transport, lamps, settings, clock, channel)
}
