#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and host-script parsing for the film scanner controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `PersistedLevels` round-trips the learned PT threshold and frame-step
//!   count so a restarted controller does not relearn them from scratch.
//! - Host command scripts are CSV files with strict headers.
use serde::{Deserialize, Serialize};

/// Host script CSV schema.
///
/// Expected headers:
/// delay_ms,command,param
///
/// `command` is a command name (`start_scan`, `next_frame`, ...) or its
/// numeric code. `delay_ms` is measured from the previous row.
///
/// Example:
/// delay_ms,command,param
/// 0,super8,0
/// 10,start_scan,0
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ScriptRow {
    pub delay_ms: u64,
    pub command: String,
    #[serde(default)]
    pub param: i32,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gauge {
    #[default]
    Super8,
    Regular8,
}

/// GPIO/I2C wiring for the `hardware` backend.
#[derive(Debug, Deserialize, Clone)]
pub struct Pins {
    #[serde(default = "default_pt_address")]
    pub pt_i2c_address: u16,
    #[serde(default)]
    pub pt_channel: u8,
    pub supply_step: u8,
    pub supply_neutral: u8,
    pub capstan_step: u8,
    pub capstan_neutral: u8,
    pub takeup_step: u8,
    pub takeup_neutral: u8,
    pub traction_in: u8,
    pub uv_led: u8,
    pub green_led: u8,
}

fn default_pt_address() -> u16 {
    0x48
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScanCfg {
    pub gauge: Gauge,
    /// Manual PT threshold; 0 selects automatic thresholding.
    pub pt_level: u16,
    /// Manual minimum frame steps; 0 selects automatic learning.
    pub min_frame_steps: u16,
    /// Where the automatic threshold sits between the dynamic min and max (percent).
    pub auto_level_ratio: u8,
    /// Steps before `min_frame_steps` at which the capstan starts slowing down.
    pub slowdown_lead_steps: u16,
    /// Host-visible speed knob, 1 (slowest) ..= 10 (fastest).
    pub scan_speed: u8,
    pub base_step_delay_us: u64,
    pub step_delay_increment_us: u64,
    pub slowdown_step_us: u64,
    pub max_slowdown_us: u64,
    /// Signed framing offset; negative values boost the sensor level instead.
    pub fine_tune: i16,
    pub uv_brightness: u16,
    pub uv_warmup_ms: u64,
    pub idle_poll_us: u64,
    pub sensor_timeout_ms: u64,
}

impl Default for ScanCfg {
    fn default() -> Self {
        Self {
            gauge: Gauge::Super8,
            pt_level: 0,
            min_frame_steps: 0,
            auto_level_ratio: 50,
            slowdown_lead_steps: 0,
            scan_speed: 10,
            base_step_delay_us: 10,
            step_delay_increment_us: 100,
            slowdown_step_us: 50,
            max_slowdown_us: 20_000,
            fine_tune: 0,
            uv_brightness: u16::MAX,
            uv_warmup_ms: 500,
            idle_poll_us: 100,
            sensor_timeout_ms: 50,
        }
    }
}

/// Transport geometry used to derive per-gauge defaults.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilmCfg {
    pub capstan_diameter_mm: f64,
    pub step_angle_deg: f64,
    pub microsteps: u16,
    pub super8_pitch_mm: f64,
    pub regular8_pitch_mm: f64,
    pub super8_threshold: u16,
    pub regular8_threshold: u16,
}

impl Default for FilmCfg {
    fn default() -> Self {
        Self {
            capstan_diameter_mm: 14.3,
            step_angle_deg: 1.8,
            microsteps: 16,
            super8_pitch_mm: 4.01,
            regular8_pitch_mm: 3.3,
            super8_threshold: 90,
            regular8_threshold: 180,
        }
    }
}

/// Rewind / fast-forward ramp.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindCfg {
    /// Delay the ramp starts from and parks at (µs per pulse).
    pub stop_delay_us: u32,
    /// Initial cruise delay.
    pub target_delay_us: u32,
    pub adjust_step_us: u32,
    pub min_target_us: u32,
    pub max_target_us: u32,
    /// Ramp divisor: delay changes by max(1, delay / divisor) per pulse.
    pub ramp_divisor: u32,
}

impl Default for WindCfg {
    fn default() -> Self {
        Self {
            stop_delay_us: 4000,
            target_delay_us: 200,
            adjust_step_us: 20,
            min_target_us: 200,
            max_target_us: 4000,
            ramp_divisor: 400,
        }
    }
}

/// Outgoing film collection.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TensionCfg {
    pub scan_modulo: u32,
    pub forward_modulo: u32,
    pub modulo_floor: u32,
    pub window_ms: u64,
    pub slow_forward_period_us: u64,
    /// Control loop period while scanning.
    pub scan_loop_us: u64,
}

impl Default for TensionCfg {
    fn default() -> Self {
        Self {
            scan_modulo: 10,
            forward_modulo: 4,
            modulo_floor: 2,
            window_ms: 1000,
            slow_forward_period_us: 700,
            scan_loop_us: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryCfg {
    /// Emit plotter lines (target `filmscan::plotter`).
    pub plotter: bool,
    pub interval_ms: u64,
    /// Identical debug lines tolerated before collapsing.
    pub max_repetitions: u32,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            plotter: false,
            interval_ms: 20,
            max_repetitions: 3,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Learned levels saved by a previous session.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PersistedLevels {
    /// PT threshold the previous session ended with.
    pub pt_level: u16,
    /// Minimum frame steps the previous session ended with.
    pub min_frame_steps: u16,
}

impl PersistedLevels {
    pub fn to_toml_string(&self) -> eyre::Result<String> {
        #[derive(Serialize)]
        struct Wrapper<'a> {
            calibration: &'a PersistedLevels,
        }
        toml::to_string(&Wrapper { calibration: self })
            .map_err(|e| eyre::eyre!("serialize learned levels: {e}"))
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub pins: Option<Pins>,
    #[serde(default)]
    pub scan: ScanCfg,
    #[serde(default)]
    pub film: FilmCfg,
    #[serde(default)]
    pub wind: WindCfg,
    #[serde(default)]
    pub tension: TensionCfg,
    #[serde(default)]
    pub telemetry: TelemetryCfg,
    #[serde(default)]
    pub logging: Logging,
    /// Optional persisted levels; applied on top of `[scan]` at startup.
    #[serde(default)]
    pub calibration: Option<PersistedLevels>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_script_csv(path: &std::path::Path) -> eyre::Result<Vec<ScriptRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open script CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["delay_ms", "command", "param"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "script CSV must have headers 'delay_ms,command,param', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<ScriptRow>().enumerate() {
        match rec {
            Ok(row) => {
                if row.command.is_empty() {
                    eyre::bail!("script row {}: empty command", idx + 2);
                }
                if !(i32::from(i16::MIN)..=i32::from(u16::MAX)).contains(&row.param) {
                    eyre::bail!(
                        "script row {}: param {} does not fit in 16 bits",
                        idx + 2,
                        row.param
                    );
                }
                rows.push(row);
            }
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    if rows.is_empty() {
        eyre::bail!("script CSV {:?} has no rows", path);
    }

    Ok(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Scan
        if self.scan.pt_level > 900 {
            eyre::bail!("scan.pt_level must be 0 (auto) or in 1..=900");
        }
        if self.scan.min_frame_steps != 0 && !(100..=600).contains(&self.scan.min_frame_steps) {
            eyre::bail!("scan.min_frame_steps must be 0 (auto) or in 100..=600");
        }
        if self.scan.auto_level_ratio == 0 || self.scan.auto_level_ratio > 100 {
            eyre::bail!("scan.auto_level_ratio must be in 1..=100");
        }
        // Below the smallest manual frame length, so a slowdown point always remains.
        if self.scan.slowdown_lead_steps >= 100 {
            eyre::bail!("scan.slowdown_lead_steps must be below 100");
        }
        if !(1..=10).contains(&self.scan.scan_speed) {
            eyre::bail!("scan.scan_speed must be in 1..=10");
        }
        if self.scan.base_step_delay_us == 0 {
            eyre::bail!("scan.base_step_delay_us must be >= 1");
        }
        if self.scan.max_slowdown_us > 1_000_000 {
            eyre::bail!("scan.max_slowdown_us is unreasonably large (>1s)");
        }
        if self.scan.uv_brightness == 0 {
            eyre::bail!("scan.uv_brightness must be > 0");
        }
        if self.scan.idle_poll_us == 0 {
            eyre::bail!("scan.idle_poll_us must be >= 1");
        }
        if self.scan.sensor_timeout_ms == 0 {
            eyre::bail!("scan.sensor_timeout_ms must be >= 1");
        }

        // Film geometry
        if !(self.film.capstan_diameter_mm.is_finite() && self.film.capstan_diameter_mm > 0.0) {
            eyre::bail!("film.capstan_diameter_mm must be > 0");
        }
        if !(self.film.step_angle_deg.is_finite() && self.film.step_angle_deg > 0.0) {
            eyre::bail!("film.step_angle_deg must be > 0");
        }
        if self.film.microsteps == 0 {
            eyre::bail!("film.microsteps must be >= 1");
        }
        for (key, pitch) in [
            ("film.super8_pitch_mm", self.film.super8_pitch_mm),
            ("film.regular8_pitch_mm", self.film.regular8_pitch_mm),
        ] {
            if !(pitch.is_finite() && pitch > 0.0) {
                eyre::bail!("{key} must be > 0");
            }
        }
        if self.film.super8_threshold == 0 || self.film.super8_threshold > 900 {
            eyre::bail!("film.super8_threshold must be in 1..=900");
        }
        if self.film.regular8_threshold == 0 || self.film.regular8_threshold > 900 {
            eyre::bail!("film.regular8_threshold must be in 1..=900");
        }

        // Wind
        if self.wind.min_target_us == 0 {
            eyre::bail!("wind.min_target_us must be >= 1");
        }
        if self.wind.min_target_us > self.wind.max_target_us {
            eyre::bail!("wind.min_target_us must be <= wind.max_target_us");
        }
        if !(self.wind.min_target_us..=self.wind.max_target_us).contains(&self.wind.target_delay_us)
        {
            eyre::bail!("wind.target_delay_us must be within [min_target_us, max_target_us]");
        }
        if self.wind.stop_delay_us < self.wind.max_target_us {
            eyre::bail!("wind.stop_delay_us must be >= wind.max_target_us");
        }
        if self.wind.ramp_divisor == 0 {
            eyre::bail!("wind.ramp_divisor must be >= 1");
        }

        // Tension
        if self.tension.modulo_floor == 0 {
            eyre::bail!("tension.modulo_floor must be >= 1");
        }
        if self.tension.scan_modulo == 0 || self.tension.forward_modulo == 0 {
            eyre::bail!("tension.scan_modulo and tension.forward_modulo must be >= 1");
        }
        if self.tension.window_ms == 0 {
            eyre::bail!("tension.window_ms must be >= 1");
        }
        if self.tension.slow_forward_period_us == 0 {
            eyre::bail!("tension.slow_forward_period_us must be >= 1");
        }
        if self.tension.scan_loop_us == 0 {
            eyre::bail!("tension.scan_loop_us must be >= 1");
        }

        // Telemetry
        if self.telemetry.interval_ms == 0 {
            eyre::bail!("telemetry.interval_ms must be >= 1");
        }

        // Persisted levels
        if let Some(levels) = &self.calibration {
            if levels.pt_level == 0 || levels.pt_level > 900 {
                eyre::bail!("calibration.pt_level must be in 1..=900");
            }
            if !(100..=600).contains(&levels.min_frame_steps) {
                eyre::bail!("calibration.min_frame_steps must be in 100..=600");
            }
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
