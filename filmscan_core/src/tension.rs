//! Take-up reel throttle.
//!
//! Pulses the take-up motor every `modulo` loop iterations while the tension
//! switch reports slack, and adapts `modulo` from how often the switch closes:
//! closing again within the window means collecting too eagerly (slow down),
//! staying open past the window means falling behind (speed up).

use std::time::{Duration, Instant};

use eyre::WrapErr;
use filmscan_traits::{Clock, Stepper, TensionSwitch};

use crate::error::Result;
use crate::hw_error::hw_report;
use crate::motion::advance;

#[derive(Debug, Clone)]
pub struct CollectionThrottle {
    modulo: u32,
    counter: u64,
    last_activation: Instant,
    collecting: bool,
    floor: u32,
    window: Duration,
}

impl CollectionThrottle {
    pub fn new(modulo: u32, floor: u32, window: Duration, now: Instant) -> Self {
        Self {
            modulo: modulo.max(1),
            counter: 0,
            last_activation: now,
            collecting: true,
            floor: floor.max(1),
            window,
        }
    }

    /// One loop iteration. Returns whether the take-up motor was pulsed.
    pub fn tick<M, T>(
        &mut self,
        takeup: &mut M,
        switch: &mut T,
        clock: &dyn Clock,
    ) -> Result<bool>
    where
        M: Stepper + ?Sized,
        T: TensionSwitch + ?Sized,
    {
        let mut pulsed = false;
        if self.counter % u64::from(self.modulo) == 0 {
            let now = clock.now();
            if !is_taut(switch)? {
                self.collecting = true;
                advance(takeup, 1, Duration::ZERO, clock)?;
                pulsed = true;
            }
            if is_taut(switch)? {
                if self.collecting {
                    if now < self.last_activation + self.window {
                        self.modulo += 1;
                    }
                    tracing::debug!(modulo = self.modulo, "collect modulo");
                    self.last_activation = now;
                }
                self.collecting = false;
            } else if self.modulo > self.floor && now > self.last_activation + self.window {
                self.last_activation = now;
                self.modulo = self.modulo.saturating_sub(2).max(1);
                tracing::debug!(modulo = self.modulo, "collect modulo");
            }
        }
        self.counter = self.counter.wrapping_add(1);
        Ok(pulsed)
    }

    /// Restart pacing at `modulo` (start-scan / film-forward).
    pub fn reset(&mut self, modulo: u32) {
        self.modulo = modulo.max(1);
    }

    /// Collect more often after a scan-speed increase.
    pub fn speed_up(&mut self) {
        if self.modulo > 1 {
            self.modulo -= 1;
        }
    }

    pub fn modulo(&self) -> u32 {
        self.modulo
    }
}

fn is_taut<T: TensionSwitch + ?Sized>(switch: &mut T) -> Result<bool> {
    switch
        .is_taut()
        .map_err(hw_report)
        .wrap_err("read tension switch")
}
