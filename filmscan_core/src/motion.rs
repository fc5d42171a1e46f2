//! Stepper motion: the blocking `advance` primitive and the wind ramp.

use std::time::Duration;

use eyre::WrapErr;
use filmscan_traits::{Clock, Stepper};

use crate::error::Result;
use crate::hw_error::hw_report;

/// Issue `steps` rising/falling pulses, holding each level for `pulse`.
pub fn advance<M: Stepper + ?Sized>(
    stepper: &mut M,
    steps: u32,
    pulse: Duration,
    clock: &dyn Clock,
) -> Result<()> {
    for _ in 0..steps {
        stepper
            .set_step(true)
            .map_err(hw_report)
            .wrap_err("stepper pulse high")?;
        clock.sleep(pulse);
        stepper
            .set_step(false)
            .map_err(hw_report)
            .wrap_err("stepper pulse low")?;
    }
    Ok(())
}

/// Ramp parameters shared by rewind and fast-forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampLimits {
    /// Delay the ramp starts from and parks at.
    pub stop_delay_us: u32,
    /// Delay changes by `max(1, delay / divisor)` per quantum.
    pub divisor: u32,
}

impl Default for RampLimits {
    fn default() -> Self {
        Self {
            stop_delay_us: 4000,
            divisor: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampStep {
    /// Pulse the reel motor holding each level for this many µs.
    Pulse(u32),
    /// Ramp-down complete; park the motors and report.
    Finished,
}

/// Acceleration/deceleration state of one rewind or fast-forward run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionRamp {
    current_us: u32,
    target_us: u32,
    stopping: bool,
    limits: RampLimits,
}

impl MotionRamp {
    pub fn new(target_us: u32, limits: RampLimits) -> Self {
        Self {
            current_us: limits.stop_delay_us,
            target_us: target_us.min(limits.stop_delay_us),
            stopping: false,
            limits,
        }
    }

    fn increment(&self) -> u32 {
        (self.current_us / self.limits.divisor.max(1)).max(1)
    }

    /// One scheduling quantum. `stop_requested` latches the ramp-down.
    pub fn step(&mut self, stop_requested: bool) -> RampStep {
        if stop_requested {
            self.stopping = true;
        }
        if self.stopping {
            if self.current_us < self.limits.stop_delay_us {
                let delay = self.current_us;
                self.current_us = (self.current_us + self.increment()).min(self.limits.stop_delay_us);
                return RampStep::Pulse(delay);
            }
            self.stopping = false;
            return RampStep::Finished;
        }
        let delay = self.current_us;
        if self.current_us > self.target_us {
            self.current_us = self.current_us.saturating_sub(self.increment()).max(self.target_us);
        }
        RampStep::Pulse(delay)
    }

    pub fn current_us(&self) -> u32 {
        self.current_us
    }
    pub fn target_us(&self) -> u32 {
        self.target_us
    }
    pub fn is_stopping(&self) -> bool {
        self.stopping
    }
}

/// Cruise delay the host can nudge between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindSpeed {
    target_us: u32,
    step_us: u32,
    min_us: u32,
    max_us: u32,
}

impl WindSpeed {
    pub fn new(target_us: u32, step_us: u32, min_us: u32, max_us: u32) -> Self {
        Self {
            target_us: target_us.clamp(min_us, max_us),
            step_us,
            min_us,
            max_us,
        }
    }

    /// Longer delay, slower wind.
    pub fn slower(&mut self) {
        if self.target_us < self.max_us {
            self.target_us = (self.target_us + self.step_us).min(self.max_us);
        }
    }

    /// Shorter delay, faster wind.
    pub fn faster(&mut self) {
        if self.target_us > self.min_us {
            self.target_us = self.target_us.saturating_sub(self.step_us).max(self.min_us);
        }
    }

    pub fn target_us(&self) -> u32 {
        self.target_us
    }
}

impl Default for WindSpeed {
    fn default() -> Self {
        Self::new(200, 20, 200, 4000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::CountingStepper;
    use filmscan_traits::ManualClock;

    #[test]
    fn advance_pulses_and_sleeps() {
        let clock = ManualClock::new();
        let mut stepper = CountingStepper::new();
        let tally = stepper.tally();
        advance(&mut stepper, 5, Duration::from_micros(300), &clock).unwrap();
        assert_eq!(tally.pulses(), 5);
        assert_eq!(clock.elapsed(), Duration::from_micros(1500));
    }

    #[test]
    fn ramp_accelerates_to_target_then_holds() {
        let mut ramp = MotionRamp::new(200, RampLimits::default());
        let mut last = u32::MAX;
        loop {
            let RampStep::Pulse(d) = ramp.step(false) else {
                panic!("ramp finished without a stop request");
            };
            assert!(d <= last);
            last = d;
            if d == 200 {
                break;
            }
        }
        assert_eq!(ramp.step(false), RampStep::Pulse(200));
    }

    #[test]
    fn stop_decelerates_and_finishes_once() {
        let mut ramp = MotionRamp::new(200, RampLimits::default());
        for _ in 0..2000 {
            ramp.step(false);
        }
        assert_eq!(ramp.current_us(), 200);

        let mut pulses = 0;
        let mut finished = 0;
        let mut last = 0;
        let mut stop = true;
        for _ in 0..100_000 {
            match ramp.step(stop) {
                RampStep::Pulse(d) => {
                    assert!(d >= last, "delay must grow while stopping");
                    last = d;
                    pulses += 1;
                }
                RampStep::Finished => {
                    finished += 1;
                    break;
                }
            }
            stop = false;
        }
        assert_eq!(finished, 1);
        assert!(pulses > 0);
        assert_eq!(ramp.current_us(), 4000);
        assert!(!ramp.is_stopping());
    }

    #[test]
    fn stop_at_rest_finishes_immediately() {
        let mut ramp = MotionRamp::new(200, RampLimits::default());
        assert_eq!(ramp.step(true), RampStep::Finished);
    }

    #[test]
    fn wind_speed_is_bounded() {
        let mut w = WindSpeed::default();
        w.faster();
        assert_eq!(w.target_us(), 200);
        w.slower();
        assert_eq!(w.target_us(), 220);
        let mut w = WindSpeed::new(3990, 20, 200, 4000);
        w.slower();
        assert_eq!(w.target_us(), 4000);
        w.slower();
        assert_eq!(w.target_us(), 4000);
    }
}
