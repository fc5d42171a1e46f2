//! Perforation threshold: automatic (tracks the sensor envelope) or manual.

use crate::sensor::PtEnvelope;
use crate::types::Gauge;

pub const MAX_PT_LEVEL: u16 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeThresholds {
    pub super8: u16,
    pub regular8: u16,
}

impl GaugeThresholds {
    pub fn for_gauge(&self, gauge: Gauge) -> u16 {
        match gauge {
            Gauge::Super8 => self.super8,
            Gauge::Regular8 => self.regular8,
        }
    }
}

impl Default for GaugeThresholds {
    fn default() -> Self {
        Self {
            super8: 90,
            regular8: 180,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdCalibrator {
    threshold: u16,
    /// Manual fallback restored on gauge changes.
    original: u16,
    auto: bool,
    ratio_pct: u8,
    defaults: GaugeThresholds,
}

impl ThresholdCalibrator {
    pub fn new(defaults: GaugeThresholds, gauge: Gauge, ratio_pct: u8) -> Self {
        let t = defaults.for_gauge(gauge);
        Self {
            threshold: t,
            original: t,
            auto: true,
            ratio_pct,
            defaults,
        }
    }

    /// Recompute from the envelope when in auto mode.
    pub fn track(&mut self, envelope: &PtEnvelope) {
        if self.auto {
            self.threshold = envelope.auto_threshold(self.ratio_pct);
        }
    }

    /// Fix the threshold and stop tracking. Clamped to 1..=900.
    pub fn set_manual(&mut self, value: u16) {
        let v = value.clamp(1, MAX_PT_LEVEL);
        self.auto = false;
        self.threshold = v;
        self.original = v;
    }

    pub fn set_auto(&mut self) {
        self.auto = true;
    }

    /// Seed the current value without changing mode (learned level from a previous run).
    pub fn seed(&mut self, value: u16) {
        self.threshold = value.clamp(1, MAX_PT_LEVEL);
    }

    pub fn select_gauge(&mut self, gauge: Gauge) {
        let t = self.defaults.for_gauge(gauge);
        if !self.auto {
            self.threshold = t;
        }
        self.original = t;
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }
    pub fn original(&self) -> u16 {
        self.original
    }
    pub fn is_auto(&self) -> bool {
        self.auto
    }
}
