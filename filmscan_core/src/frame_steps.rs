//! Minimum-frame-step calibration.
//!
//! Gauge defaults come from the transport geometry; observed frame lengths
//! feed a 32-slot window whose mean (minus a margin) becomes the live value
//! in auto mode. Samples more than 5% away from the baseline are discarded
//! and reset the live value to that baseline.

use crate::fixed_point::percent_of;
use crate::types::Gauge;

pub const WINDOW: usize = 32;
/// Safety margin below the observed mean.
pub const MEAN_MARGIN_STEPS: u16 = 10;
pub const MIN_MANUAL_STEPS: u16 = 100;
pub const MAX_MANUAL_STEPS: u16 = 600;

/// Capstan and stepper geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub capstan_diameter_mm: f64,
    pub step_angle_deg: f64,
    pub microsteps: u16,
    pub super8_pitch_mm: f64,
    pub regular8_pitch_mm: f64,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            capstan_diameter_mm: 14.3,
            step_angle_deg: 1.8,
            microsteps: 16,
            super8_pitch_mm: 4.01,
            regular8_pitch_mm: 3.3,
        }
    }
}

impl FrameGeometry {
    /// Film travel per micro-step, in mm.
    pub fn mm_per_step(&self) -> f64 {
        let steps_per_rev = 360.0 / (self.step_angle_deg / f64::from(self.microsteps));
        (std::f64::consts::PI * self.capstan_diameter_mm) / steps_per_rev
    }

    pub fn steps_for_pitch(&self, pitch_mm: f64) -> u16 {
        let steps = (pitch_mm / self.mm_per_step()).trunc();
        if steps.is_finite() && steps >= 1.0 {
            steps.min(f64::from(u16::MAX)) as u16
        } else {
            1
        }
    }

    pub fn defaults(&self) -> GaugeSteps {
        GaugeSteps {
            super8: self.steps_for_pitch(self.super8_pitch_mm),
            regular8: self.steps_for_pitch(self.regular8_pitch_mm),
        }
    }
}

/// Per-gauge frame-step baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeSteps {
    pub super8: u16,
    pub regular8: u16,
}

impl GaugeSteps {
    pub fn for_gauge(&self, gauge: Gauge) -> u16 {
        match gauge {
            Gauge::Super8 => self.super8,
            Gauge::Regular8 => self.regular8,
        }
    }

    fn set(&mut self, gauge: Gauge, steps: u16) {
        match gauge {
            Gauge::Super8 => self.super8 = steps,
            Gauge::Regular8 => self.regular8 = steps,
        }
    }
}

/// Outcome of feeding one observed frame length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Outside ±5% of the baseline; live value reset to the baseline.
    Rejected,
    Recorded,
    /// Window full in auto mode; live value recomputed.
    Updated(u16),
}

#[derive(Debug, Clone)]
pub struct FrameStepCalibrator {
    window: [u16; WINDOW],
    next: usize,
    filled: usize,
    min_frame_steps: u16,
    original: u16,
    decrease_speed_steps: u16,
    slowdown_lead: u16,
    auto: bool,
    gauge: Gauge,
    baselines: GaugeSteps,
}

impl FrameStepCalibrator {
    pub fn new(baselines: GaugeSteps, gauge: Gauge, slowdown_lead: u16) -> Self {
        let min = baselines.for_gauge(gauge);
        let mut cal = Self {
            window: [0; WINDOW],
            next: 0,
            filled: 0,
            min_frame_steps: min,
            original: min,
            decrease_speed_steps: 0,
            slowdown_lead,
            auto: true,
            gauge,
            baselines,
        };
        cal.rederive();
        cal
    }

    /// The slowdown point never reaches zero, so the detection limit stays above one step.
    fn rederive(&mut self) {
        self.decrease_speed_steps = self
            .min_frame_steps
            .saturating_sub(self.slowdown_lead)
            .max(1);
    }

    pub fn observe(&mut self, steps: u32) -> Observation {
        let orig = u32::from(self.original);
        if steps > percent_of(orig, 105) || steps < percent_of(orig, 95) {
            self.min_frame_steps = self.original;
            self.rederive();
            return Observation::Rejected;
        }

        self.window[self.next] = u16::try_from(steps).unwrap_or(u16::MAX);
        self.next = (self.next + 1) % WINDOW;
        if self.filled < WINDOW {
            self.filled += 1;
        }

        if self.auto && self.filled == WINDOW {
            let total: u32 = self.window.iter().map(|&s| u32::from(s)).sum();
            let mean = (total + (WINDOW as u32) / 2) / WINDOW as u32;
            self.min_frame_steps = (mean as u16).saturating_sub(MEAN_MARGIN_STEPS);
            self.rederive();
            return Observation::Updated(self.min_frame_steps);
        }
        Observation::Recorded
    }

    /// Fix the count (100..=600) and stop learning. Also rebases this
    /// gauge's baseline. Values outside the range are ignored.
    pub fn set_manual(&mut self, steps: u16) -> bool {
        if !(MIN_MANUAL_STEPS..=MAX_MANUAL_STEPS).contains(&steps) {
            return false;
        }
        self.auto = false;
        self.min_frame_steps = steps;
        self.original = steps;
        self.baselines.set(self.gauge, steps);
        self.rederive();
        true
    }

    pub fn set_auto(&mut self) {
        self.auto = true;
    }

    /// Seed this gauge's baseline from a previous run.
    pub fn seed(&mut self, steps: u16) {
        let steps = steps.clamp(MIN_MANUAL_STEPS, MAX_MANUAL_STEPS);
        self.baselines.set(self.gauge, steps);
        self.min_frame_steps = steps;
        self.original = steps;
        self.rederive();
    }

    pub fn select_gauge(&mut self, gauge: Gauge) {
        self.gauge = gauge;
        self.min_frame_steps = self.baselines.for_gauge(gauge);
        self.original = self.min_frame_steps;
        self.rederive();
    }

    pub fn min_frame_steps(&self) -> u16 {
        self.min_frame_steps
    }
    pub fn original(&self) -> u16 {
        self.original
    }
    pub fn decrease_speed_steps(&self) -> u16 {
        self.decrease_speed_steps
    }
    pub fn is_auto(&self) -> bool {
        self.auto
    }
    pub fn gauge(&self) -> Gauge {
        self.gauge
    }
    pub fn samples(&self) -> usize {
        self.filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_geometry_defaults() {
        let d = FrameGeometry::default().defaults();
        assert_eq!(d.super8, 285);
        assert_eq!(d.regular8, 235);
    }

    #[test]
    fn decrease_tracks_lead() {
        let cal = FrameStepCalibrator::new(
            GaugeSteps {
                super8: 285,
                regular8: 235,
            },
            Gauge::Super8,
            20,
        );
        assert_eq!(cal.decrease_speed_steps(), 265);
    }

    #[test]
    fn lead_past_the_minimum_keeps_one_step() {
        let mut cal = FrameStepCalibrator::new(
            GaugeSteps {
                super8: 285,
                regular8: 235,
            },
            Gauge::Super8,
            300,
        );
        assert_eq!(cal.decrease_speed_steps(), 1);

        let mut cal2 = FrameStepCalibrator::new(cal.baselines, Gauge::Super8, 99);
        assert!(cal2.set_manual(MIN_MANUAL_STEPS));
        assert_eq!(cal2.decrease_speed_steps(), 1);
        assert!(cal.set_manual(MIN_MANUAL_STEPS));
        assert_eq!(cal.decrease_speed_steps(), 1);
    }

    #[test]
    fn outlier_after_full_window_resets_to_baseline() {
        let mut cal = FrameStepCalibrator::new(
            GaugeSteps {
                super8: 285,
                regular8: 235,
            },
            Gauge::Super8,
            0,
        );
        for _ in 0..WINDOW - 1 {
            assert_eq!(cal.observe(290), Observation::Recorded);
        }
        assert_eq!(cal.observe(290), Observation::Updated(280));
        assert_eq!(cal.min_frame_steps(), 280);

        // 1.2x the baseline.
        assert_eq!(cal.observe(342), Observation::Rejected);
        assert_eq!(cal.min_frame_steps(), 285);
        assert_eq!(cal.decrease_speed_steps(), 285);
        assert_eq!(cal.samples(), WINDOW);

        // The window still holds only the accepted lengths.
        assert_eq!(cal.observe(290), Observation::Updated(280));
    }
}
