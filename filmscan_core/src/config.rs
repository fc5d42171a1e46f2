//! Runtime configuration for the scanner core.
//!
//! Separate from the TOML-deserialized config in `filmscan_config`; see
//! `conversions` for the mapping.

use crate::types::Gauge;

/// Frame scanning: detection thresholds and capstan pacing.
#[derive(Debug, Clone)]
pub struct ScanCfg {
    pub gauge: Gauge,
    /// Manual PT threshold; 0 keeps automatic thresholding.
    pub pt_level: u16,
    /// Manual minimum frame steps; 0 keeps automatic learning.
    pub min_frame_steps: u16,
    /// Position of the auto threshold between the dynamic min and max (percent).
    pub auto_level_ratio: u8,
    /// Steps before the minimum frame length at which the capstan slows down.
    pub slowdown_lead_steps: u16,
    /// Speed knob, 1 (slowest) ..= 10 (fastest).
    pub scan_speed: u16,
    pub base_step_delay_us: u32,
    pub step_delay_increment_us: u32,
    pub slowdown_step_us: u32,
    pub max_slowdown_us: u32,
    pub fine_tune: i16,
    pub uv_brightness: u16,
    pub uv_warmup_ms: u64,
    /// Upper bound on how long the runner sleeps between ticks.
    pub idle_poll_us: u64,
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
        }
    }
}

/// Rewind / fast-forward ramp.
#[derive(Debug, Clone)]
pub struct WindCfg {
    pub stop_delay_us: u32,
    pub target_delay_us: u32,
    pub adjust_step_us: u32,
    pub min_target_us: u32,
    pub max_target_us: u32,
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

/// Take-up throttle and slow-forward pacing.
#[derive(Debug, Clone)]
pub struct TensionCfg {
    pub scan_modulo: u32,
    pub forward_modulo: u32,
    pub modulo_floor: u32,
    pub window_ms: u64,
    pub slow_forward_period_us: u64,
    /// Loop period while scanning; the throttle runs on every loop pass,
    /// several times per capstan step.
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

#[derive(Debug, Clone)]
pub struct TelemetryCfg {
    /// Emit plotter lines on the `filmscan::plotter` target.
    pub plotter: bool,
    pub interval_ms: u64,
    /// Identical debug lines printed before collapsing.
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
