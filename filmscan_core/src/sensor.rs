//! Phototransistor reader and its dynamic envelope.
//!
//! The envelope tracks a slowly decaying maximum and a quickly recovering
//! minimum, both scaled ×10 so the decay stays integral. The automatic
//! threshold sits between them.

use eyre::WrapErr;
use filmscan_traits::PhotoSensor;

use crate::error::Result;
use crate::fixed_point::{from_tenths, to_tenths};
use crate::hw_error::hw_report;
use crate::threshold::ThresholdCalibrator;

/// Decay applied to the dynamic maximum on every read (tenths).
pub const MAX_DECAY_TENTHS: i32 = 2;
/// Fraction of the gap the dynamic minimum recovers per read (1/n).
pub const MIN_RECOVERY_DIVISOR: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtEnvelope {
    raw: u16,
    max_observed: u16,
    min_observed: u16,
    max_dynamic: i32,
    min_dynamic: i32,
}

impl Default for PtEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl PtEnvelope {
    pub fn new() -> Self {
        Self {
            raw: 0,
            max_observed: 0,
            min_observed: 200,
            max_dynamic: 0,
            min_dynamic: 10_000,
        }
    }

    /// Fold one raw sample into the envelope.
    pub fn observe(&mut self, level: u16) {
        self.raw = level;
        self.max_observed = self.max_observed.max(level);
        self.min_observed = self.min_observed.min(level);
        let scaled = to_tenths(level);
        self.max_dynamic = self.max_dynamic.max(scaled);
        self.min_dynamic = self.min_dynamic.min(scaled);
        if self.max_dynamic > self.min_dynamic {
            self.max_dynamic -= MAX_DECAY_TENTHS;
        }
        if self.min_dynamic < self.max_dynamic {
            self.min_dynamic += (self.max_dynamic - self.min_dynamic) / MIN_RECOVERY_DIVISOR;
        }
    }

    /// Threshold `ratio_pct` percent of the way from the dynamic min to max.
    pub fn auto_threshold(&self, ratio_pct: u8) -> u16 {
        let span = self.max_dynamic - self.min_dynamic;
        let t = self.min_dynamic + span * i32::from(ratio_pct) / 100;
        from_tenths(t)
    }

    pub fn raw(&self) -> u16 {
        self.raw
    }
    pub fn max_observed(&self) -> u16 {
        self.max_observed
    }
    pub fn min_observed(&self) -> u16 {
        self.min_observed
    }
    /// Dynamic maximum, ×10.
    pub fn max_dynamic(&self) -> i32 {
        self.max_dynamic
    }
    /// Dynamic minimum, ×10.
    pub fn min_dynamic(&self) -> i32 {
        self.min_dynamic
    }
}

/// Owns the sensor and its envelope.
pub struct SensorReader<P> {
    sensor: P,
    envelope: PtEnvelope,
}

impl<P: PhotoSensor> SensorReader<P> {
    pub fn new(sensor: P) -> Self {
        Self {
            sensor,
            envelope: PtEnvelope::new(),
        }
    }

    /// One conversion: update the envelope and, in auto mode, the threshold.
    pub fn read_level(&mut self, threshold: &mut ThresholdCalibrator) -> Result<u16> {
        let level = self
            .sensor
            .read_level()
            .map_err(hw_report)
            .wrap_err("read phototransistor")?;
        self.envelope.observe(level);
        threshold.track(&self.envelope);
        tracing::trace!(level, threshold = threshold.threshold(), "pt sample");
        Ok(level)
    }

    pub fn envelope(&self) -> &PtEnvelope {
        &self.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_collapses_envelope() {
        let mut env = PtEnvelope::new();
        env.observe(40);
        assert_eq!(env.max_dynamic(), 400);
        assert_eq!(env.min_dynamic(), 400);
        assert_eq!(env.auto_threshold(50), 40);
    }

    #[test]
    fn max_decays_and_min_recovers() {
        let mut env = PtEnvelope::new();
        env.observe(100);
        env.observe(10);
        // max 1000 - 2, min 100 + (998 - 100) / 10
        assert_eq!(env.max_dynamic(), 998);
        assert_eq!(env.min_dynamic(), 189);
        assert_eq!(env.max_observed(), 100);
        assert_eq!(env.min_observed(), 10);
    }

    #[test]
    fn envelope_can_cross_over_near_convergence() {
        let mut env = PtEnvelope::new();
        for v in [4, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2] {
            env.observe(v);
        }
        assert_eq!(env.max_dynamic(), 18);
        assert_eq!(env.min_dynamic(), 19);
        assert!(env.min_dynamic() > env.max_dynamic());
    }
}
