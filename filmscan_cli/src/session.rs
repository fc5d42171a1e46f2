//! Device assembly and the simulated capture hosts behind each subcommand.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use filmscan_config::{Config, ScriptRow};
use filmscan_core::error::{AbortReason, Result, ScannerError};
use filmscan_core::protocol::code_for_name;
use filmscan_core::pump::{EventPump, EventRecord};
use filmscan_core::runner::{Host, RunOptions, RunReport, run};
use filmscan_core::{Command, Event, Gauge, I2cPeripheral, LearnedLevels, RawCommand, Scanner, ScannerSettings};
use filmscan_hardware::sim::{FilmProfile, LedKind, Reel, SimulatedFilm};
use filmscan_traits::ManualClock;

/// Consecutive scan errors tolerated before a capture session gives up.
pub const MAX_CONSECUTIVE_SCAN_ERRORS: u32 = 3;
/// Queue depth between the control loop and the event printer.
const EVENT_QUEUE: usize = 64;

/// Map the config file onto the core's runtime settings.
pub fn settings_from(cfg: &Config, gauge: Option<Gauge>) -> ScannerSettings {
    let mut scan: filmscan_core::ScanCfg = (&cfg.scan).into();
    if let Some(g) = gauge {
        scan.gauge = g;
    }
    ScannerSettings {
        scan,
        wind: (&cfg.wind).into(),
        tension: (&cfg.tension).into(),
        telemetry: (&cfg.telemetry).into(),
        geometry: (&cfg.film).into(),
        thresholds: (&cfg.film).into(),
        learned: cfg.calibration.as_ref().map(LearnedLevels::from),
    }
}

/// A scanner plus, on the simulator, the film it is threaded with.
pub struct Rig {
    pub scanner: Scanner,
    pub film: Option<SimulatedFilm>,
}

/// Build against real GPIO when wired and compiled in, the simulator otherwise.
pub fn assemble(cfg: &Config, gauge: Option<Gauge>) -> Result<Rig> {
    let settings = settings_from(cfg, gauge);

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    if let Some(pins) = &cfg.pins {
        return assemble_hardware(pins, &cfg.scan, settings);
    }

    let film = SimulatedFilm::default();
    if settings.scan.gauge == Gauge::Regular8 {
        film.set_profile(FilmProfile::regular8());
    }
    // Loop time is virtual on the simulator; a long capture runs in wall milliseconds.
    let clock = ManualClock::new();
    let scanner = Scanner::builder()
        .with_sensor(film.sensor())
        .with_transport(
            film.stepper(Reel::Supply),
            film.stepper(Reel::Capstan),
            film.stepper(Reel::TakeUp),
            film.tension_switch(),
        )
        .with_leds(film.led(LedKind::Uv), film.led(LedKind::Green))
        .with_settings(settings)
        .with_clock(Box::new(clock))
        .build()?;
    tracing::info!(backend = "sim", "scanner assembled");
    Ok(Rig {
        scanner,
        film: Some(film),
    })
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn assemble_hardware(
    pins: &filmscan_config::Pins,
    scan: &filmscan_config::ScanCfg,
    settings: ScannerSettings,
) -> Result<Rig> {
    use eyre::WrapErr;
    use filmscan_hardware::ads1115::Ads1115;
    use filmscan_hardware::gpio::{GpioTransport, TransportPins};

    let sensor = Ads1115::new(
        pins.pt_i2c_address,
        pins.pt_channel,
        Duration::from_millis(scan.sensor_timeout_ms),
    )
    .wrap_err("open ads1115")?;
    let t = GpioTransport::open(&TransportPins {
        supply: (pins.supply_step, pins.supply_neutral),
        capstan: (pins.capstan_step, pins.capstan_neutral),
        takeup: (pins.takeup_step, pins.takeup_neutral),
        traction_in: pins.traction_in,
        uv_led: pins.uv_led,
        green_led: pins.green_led,
    })
    .wrap_err("open transport gpio")?;
    let scanner = Scanner::builder()
        .with_sensor(sensor)
        .with_transport(t.supply, t.capstan, t.takeup, t.tension)
        .with_leds(t.uv, t.green)
        .with_settings(settings)
        .build()?;
    tracing::info!(backend = "gpio", "scanner assembled");
    Ok(Rig { scanner, film: None })
}

/// One printed line per device event.
pub fn event_line(rec: &EventRecord, json: bool) -> String {
    let e = &rec.event;
    if json {
        serde_json::json!({
            "at_ms": rec.at_ms,
            "event": e.name(),
            "code": e.code(),
            "params": e.params(),
        })
        .to_string()
    } else {
        let [a, b, ..] = e.params();
        match e {
            Event::ScanError { .. } | Event::AutoLevels { .. } | Event::Version { .. } => {
                format!("{:>8} ms  {} ({a}, {b})", rec.at_ms, e.name())
            }
            _ => format!("{:>8} ms  {}", rec.at_ms, e.name()),
        }
    }
}

/// Printer thread for device events.
pub fn spawn_printer(json: bool) -> EventPump {
    EventPump::spawn(EVENT_QUEUE, move |rec| println!("{}", event_line(rec, json)))
}

pub fn run_options(max_run_ms: Option<u64>, shutdown: Arc<AtomicBool>) -> RunOptions {
    RunOptions {
        max_run: max_run_ms.map(Duration::from_millis),
        shutdown: Some(shutdown),
    }
}

// ── Capture session ──────────────────────────────────────────────────────────

/// Plays the capture computer: start the scan, ask for the next frame after
/// each one arrives, switch the lamp off once enough frames were taken.
#[derive(Debug)]
pub struct AutoCaptureHost {
    wanted: u64,
    captured: u64,
    started: bool,
    terminated: bool,
    consecutive_errors: u32,
}

impl AutoCaptureHost {
    pub fn new(wanted: u64) -> Self {
        Self {
            wanted,
            captured: 0,
            started: false,
            terminated: false,
            consecutive_errors: 0,
        }
    }

    pub fn captured(&self) -> u64 {
        self.captured
    }

    fn send(link: &I2cPeripheral, cmd: Command) {
        if !link.send(cmd) {
            tracing::warn!(?cmd, "command channel full");
        }
    }

    fn finish(&mut self, link: &I2cPeripheral) {
        Self::send(link, Command::Terminate);
        self.terminated = true;
        tracing::info!(frames = self.captured, "capture complete");
    }
}

impl Host for AutoCaptureHost {
    fn poll(&mut self, _elapsed: Duration, link: &I2cPeripheral) -> Result<()> {
        if !self.started {
            self.started = true;
            if self.wanted == 0 {
                self.finish(link);
            } else {
                Self::send(link, Command::StartScan);
            }
        }
        Ok(())
    }

    fn on_event(&mut self, event: &Event, link: &I2cPeripheral) -> Result<()> {
        match *event {
            Event::FrameAvailable => {
                self.captured += 1;
                self.consecutive_errors = 0;
                tracing::debug!(frame = self.captured, "frame captured");
                if self.captured >= self.wanted {
                    self.finish(link);
                } else {
                    Self::send(link, Command::NextFrame);
                }
            }
            Event::ScanError { steps, limit } => {
                self.consecutive_errors += 1;
                tracing::warn!(steps, limit, consecutive = self.consecutive_errors, "scan error");
                if self.consecutive_errors >= MAX_CONSECUTIVE_SCAN_ERRORS {
                    return Err(eyre::Report::new(ScannerError::Abort(AbortReason::ScanErrors(
                        self.consecutive_errors,
                    ))));
                }
                Self::send(link, Command::NextFrame);
            }
            _ => {}
        }
        Ok(())
    }

    fn finished(&self) -> bool {
        self.terminated
    }
}

pub fn capture(
    rig: &mut Rig,
    frames: u64,
    opts: &RunOptions,
    pump: Option<&EventPump>,
) -> Result<RunReport> {
    let mut host = AutoCaptureHost::new(frames);
    let report = run(&mut rig.scanner, &mut host, opts, pump)?;
    tracing::info!(captured = host.captured(), frames = report.frames, "capture session done");
    if let Some(film) = &rig.film {
        let snap = film.snapshot();
        tracing::info!(
            position = snap.position,
            takeup_pulses = snap.takeup_pulses,
            slack = snap.slack,
            "film transport"
        );
    }
    Ok(report)
}

// ── Scripted host ────────────────────────────────────────────────────────────

/// One resolved script step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptStep {
    pub at: Duration,
    pub raw: RawCommand,
}

/// Resolve names and cumulative delays. Numeric codes pass through as-is.
pub fn compile_script(rows: &[ScriptRow]) -> Result<Vec<ScriptStep>> {
    let mut at = Duration::ZERO;
    let mut steps = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let line = idx + 2;
        let Some(code) = code_for_name(&row.command) else {
            eyre::bail!("script row {line}: unknown command '{}'", row.command);
        };
        let param = param_bits(row.param)
            .ok_or_else(|| eyre::eyre!("script row {line}: param {} out of range", row.param))?;
        let raw = RawCommand::new(code, param);
        at += Duration::from_millis(row.delay_ms);
        steps.push(ScriptStep { at, raw });
    }
    Ok(steps)
}

/// 16-bit wire pattern for a script parameter; negatives are two's complement.
fn param_bits(p: i32) -> Option<u16> {
    u16::try_from(p)
        .ok()
        .or_else(|| i16::try_from(p).ok().map(|v| u16::from_le_bytes(v.to_le_bytes())))
}

#[derive(Debug)]
pub struct ScriptHost {
    steps: Vec<ScriptStep>,
    next: usize,
}

impl ScriptHost {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps, next: 0 }
    }
}

impl Host for ScriptHost {
    fn poll(&mut self, elapsed: Duration, link: &I2cPeripheral) -> Result<()> {
        while let Some(step) = self.steps.get(self.next)
            && elapsed >= step.at
        {
            tracing::debug!(code = step.raw.code, param = step.raw.param, "script send");
            if !link.send_raw(step.raw) {
                tracing::warn!(code = step.raw.code, "command channel full, script step dropped");
            }
            self.next += 1;
        }
        Ok(())
    }

    fn on_event(&mut self, _event: &Event, _link: &I2cPeripheral) -> Result<()> {
        Ok(())
    }

    fn finished(&self) -> bool {
        self.next >= self.steps.len()
    }
}

pub fn play_script(
    rig: &mut Rig,
    steps: Vec<ScriptStep>,
    opts: &RunOptions,
    pump: Option<&EventPump>,
) -> Result<RunReport> {
    let mut host = ScriptHost::new(steps);
    run(&mut rig.scanner, &mut host, opts, pump)
}

// ── Self-check ───────────────────────────────────────────────────────────────

/// Outcome of `self_check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfCheck {
    pub film_in_gate: bool,
    pub single_step_steps: u32,
}

/// Sends one single-step and waits for it to finish.
struct SingleStepHost {
    sent: bool,
}

impl Host for SingleStepHost {
    fn poll(&mut self, _elapsed: Duration, link: &I2cPeripheral) -> Result<()> {
        if !self.sent {
            self.sent = link.send(Command::SingleStep);
        }
        Ok(())
    }

    fn on_event(&mut self, _event: &Event, _link: &I2cPeripheral) -> Result<()> {
        Ok(())
    }

    fn finished(&self) -> bool {
        self.sent
    }
}

/// Film-gate check, then one single step that must find a perforation.
pub fn self_check(rig: &mut Rig, opts: &RunOptions) -> Result<SelfCheck> {
    let film_in_gate = rig.scanner.film_in_gate()?;
    if let Some(film) = &rig.film {
        // The simulator is always threaded; an empty gate must read as empty.
        film.set_loaded(false);
        let empty = rig.scanner.film_in_gate()?;
        film.set_loaded(true);
        if empty {
            eyre::bail!("film gate check reports film in an empty gate");
        }
    }
    run(&mut rig.scanner, &mut SingleStepHost { sent: false }, opts, None)?;
    let steps = rig.scanner.session().last_frame_steps;
    if steps == 0 {
        eyre::bail!("single step did not find a perforation");
    }
    Ok(SelfCheck {
        film_in_gate,
        single_step_steps: steps,
    })
}
