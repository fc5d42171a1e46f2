//! Capstan pacing during a frame scan.

use std::time::{Duration, Instant};

use crate::config::ScanCfg;

/// Fetch speed is this multiple of the configured scan delay.
const FETCH_SPEED_FACTOR: u32 = 3;
/// Each unit of negative fine-tune lifts the sensor reading by this much.
const PT_BOOST_PER_UNIT: u16 = 30;

#[derive(Debug, Clone)]
pub struct ScanPacing {
    base_us: u32,
    increment_us: u32,
    slowdown_step_us: u32,
    max_slowdown_us: u32,
    speed_us: u32,
    original_us: u32,
    next_scan_at: Option<Instant>,
    fine_tune_steps: u16,
    pt_boost: u16,
}

impl ScanPacing {
    pub fn new(cfg: &ScanCfg) -> Self {
        let mut pacing = Self {
            base_us: cfg.base_step_delay_us,
            increment_us: cfg.step_delay_increment_us,
            slowdown_step_us: cfg.slowdown_step_us,
            max_slowdown_us: cfg.max_slowdown_us,
            speed_us: 0,
            original_us: 0,
            next_scan_at: None,
            fine_tune_steps: 0,
            pt_boost: 0,
        };
        let speed = pacing.speed_for(cfg.scan_speed);
        pacing.speed_us = speed;
        pacing.original_us = speed;
        pacing.set_fine_tune(cfg.fine_tune);
        pacing
    }

    fn speed_for(&self, param: u16) -> u32 {
        let p = u32::from(param.clamp(1, 10));
        self.base_us + (10 - p) * self.increment_us
    }

    /// Whether the next scan step may run.
    pub fn due(&self, now: Instant) -> bool {
        self.next_scan_at.is_none_or(|at| now >= at)
    }

    pub fn schedule(&mut self, now: Instant) {
        self.next_scan_at = Some(now + Duration::from_micros(u64::from(self.speed_us)));
    }

    pub fn next_scan_at(&self) -> Option<Instant> {
        self.next_scan_at
    }

    /// Stretch the step delay once past the slowdown point.
    pub fn slow_down(&mut self, steps_done: u32, decrease_at: u16) {
        let over = steps_done.saturating_sub(u32::from(decrease_at)) + 1;
        let extra = self
            .slowdown_step_us
            .saturating_mul(over)
            .min(self.max_slowdown_us);
        self.speed_us = self.fetch_speed_us().saturating_add(extra);
    }

    pub fn fetch_speed_us(&self) -> u32 {
        self.original_us.saturating_mul(FETCH_SPEED_FACTOR)
    }

    /// Back to the configured speed (start of a new frame).
    pub fn reset(&mut self) {
        self.speed_us = self.original_us;
    }

    /// Apply the host speed knob. Returns `true` when the new speed is faster.
    pub fn set_speed_param(&mut self, param: u16) -> bool {
        let speed = self.speed_for(param);
        let faster = speed < self.original_us;
        self.speed_us = speed;
        self.original_us = speed;
        faster
    }

    /// Positive values add steps after detection; negative values boost the sensor level.
    pub fn set_fine_tune(&mut self, value: i16) {
        if value < 0 {
            self.pt_boost = value.unsigned_abs().saturating_mul(PT_BOOST_PER_UNIT);
            self.fine_tune_steps = 0;
        } else {
            self.fine_tune_steps = value.unsigned_abs();
            self.pt_boost = 0;
        }
    }

    pub fn speed_us(&self) -> u32 {
        self.speed_us
    }
    pub fn original_us(&self) -> u32 {
        self.original_us
    }
    pub fn fine_tune_steps(&self) -> u16 {
        self.fine_tune_steps
    }
    pub fn pt_boost(&self) -> u16 {
        self.pt_boost
    }
}
