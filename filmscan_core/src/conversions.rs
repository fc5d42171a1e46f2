//! `From` implementations bridging `filmscan_config` types to `filmscan_core` types.

use crate::config::{ScanCfg, TelemetryCfg, TensionCfg, WindCfg};
use crate::frame_steps::FrameGeometry;
use crate::threshold::GaugeThresholds;
use crate::types::{Gauge, LearnedLevels};

// ── Gauge ────────────────────────────────────────────────────────────────────

impl From<filmscan_config::Gauge> for Gauge {
    fn from(g: filmscan_config::Gauge) -> Self {
        match g {
            filmscan_config::Gauge::Super8 => Gauge::Super8,
            filmscan_config::Gauge::Regular8 => Gauge::Regular8,
        }
    }
}

// ── ScanCfg ──────────────────────────────────────────────────────────────────

fn saturate_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

impl From<&filmscan_config::ScanCfg> for ScanCfg {
    fn from(c: &filmscan_config::ScanCfg) -> Self {
        Self {
            gauge: c.gauge.into(),
            pt_level: c.pt_level,
            min_frame_steps: c.min_frame_steps,
            auto_level_ratio: c.auto_level_ratio,
            slowdown_lead_steps: c.slowdown_lead_steps,
            scan_speed: u16::from(c.scan_speed),
            base_step_delay_us: saturate_u32(c.base_step_delay_us),
            step_delay_increment_us: saturate_u32(c.step_delay_increment_us),
            slowdown_step_us: saturate_u32(c.slowdown_step_us),
            max_slowdown_us: saturate_u32(c.max_slowdown_us),
            fine_tune: c.fine_tune,
            uv_brightness: c.uv_brightness,
            uv_warmup_ms: c.uv_warmup_ms,
            idle_poll_us: c.idle_poll_us,
        }
    }
}

// ── Film geometry and gauge thresholds ───────────────────────────────────────

impl From<&filmscan_config::FilmCfg> for FrameGeometry {
    fn from(c: &filmscan_config::FilmCfg) -> Self {
        Self {
            capstan_diameter_mm: c.capstan_diameter_mm,
            step_angle_deg: c.step_angle_deg,
            microsteps: c.microsteps,
            super8_pitch_mm: c.super8_pitch_mm,
            regular8_pitch_mm: c.regular8_pitch_mm,
        }
    }
}

impl From<&filmscan_config::FilmCfg> for GaugeThresholds {
    fn from(c: &filmscan_config::FilmCfg) -> Self {
        Self {
            super8: c.super8_threshold,
            regular8: c.regular8_threshold,
        }
    }
}

// ── WindCfg ──────────────────────────────────────────────────────────────────

impl From<&filmscan_config::WindCfg> for WindCfg {
    fn from(c: &filmscan_config::WindCfg) -> Self {
        Self {
            stop_delay_us: c.stop_delay_us,
            target_delay_us: c.target_delay_us,
            adjust_step_us: c.adjust_step_us,
            min_target_us: c.min_target_us,
            max_target_us: c.max_target_us,
            ramp_divisor: c.ramp_divisor,
        }
    }
}

// ── TensionCfg ───────────────────────────────────────────────────────────────

impl From<&filmscan_config::TensionCfg> for TensionCfg {
    fn from(c: &filmscan_config::TensionCfg) -> Self {
        Self {
            scan_modulo: c.scan_modulo,
            forward_modulo: c.forward_modulo,
            modulo_floor: c.modulo_floor,
            window_ms: c.window_ms,
            slow_forward_period_us: c.slow_forward_period_us,
            scan_loop_us: c.scan_loop_us,
        }
    }
}

// ── TelemetryCfg ─────────────────────────────────────────────────────────────

impl From<&filmscan_config::TelemetryCfg> for TelemetryCfg {
    fn from(c: &filmscan_config::TelemetryCfg) -> Self {
        Self {
            plotter: c.plotter,
            interval_ms: c.interval_ms,
            max_repetitions: c.max_repetitions,
        }
    }
}

// ── Learned levels ───────────────────────────────────────────────────────────

impl From<&filmscan_config::PersistedLevels> for LearnedLevels {
    fn from(c: &filmscan_config::PersistedLevels) -> Self {
        Self {
            pt_level: c.pt_level,
            min_frame_steps: c.min_frame_steps,
        }
    }
}

impl From<LearnedLevels> for filmscan_config::PersistedLevels {
    fn from(l: LearnedLevels) -> Self {
        Self {
            pt_level: l.pt_level,
            min_frame_steps: l.min_frame_steps,
        }
    }
}
