//! Test and helper mocks for filmscan_core.
//!
//! Each mock hands out a cheap tally that shares its state, so a test can
//! keep observing a device after the scanner has taken ownership of it.

use std::cell::Cell;
use std::rc::Rc;

use filmscan_traits::{HwResult, Led, PhotoSensor, Stepper, TensionSwitch};

/// Replays `levels` in order, then repeats the last one forever.
pub struct ScriptedSensor {
    levels: Vec<u16>,
    idx: usize,
    reads: Rc<Cell<u64>>,
}

impl ScriptedSensor {
    pub fn new(levels: Vec<u16>) -> Self {
        Self {
            levels,
            idx: 0,
            reads: Rc::new(Cell::new(0)),
        }
    }

    pub fn constant(level: u16) -> Self {
        Self::new(vec![level])
    }

    /// Shared read counter.
    pub fn reads(&self) -> Rc<Cell<u64>> {
        self.reads.clone()
    }
}

impl PhotoSensor for ScriptedSensor {
    fn read_level(&mut self) -> HwResult<u16> {
        self.reads.set(self.reads.get() + 1);
        let level = self
            .levels
            .get(self.idx)
            .or_else(|| self.levels.last())
            .copied()
            .unwrap_or(0);
        if self.idx < self.levels.len() {
            self.idx += 1;
        }
        Ok(level)
    }
}

/// Observable state of a `CountingStepper`.
#[derive(Debug, Clone, Default)]
pub struct StepperTally {
    pulses: Rc<Cell<u64>>,
    released: Rc<Cell<bool>>,
}

impl StepperTally {
    pub fn pulses(&self) -> u64 {
        self.pulses.get()
    }
    pub fn released(&self) -> bool {
        self.released.get()
    }
}

/// Counts rising edges on STEP and remembers the neutral line.
#[derive(Debug, Default)]
pub struct CountingStepper {
    tally: StepperTally,
    high: bool,
}

impl CountingStepper {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn tally(&self) -> StepperTally {
        self.tally.clone()
    }
}

impl Stepper for CountingStepper {
    fn set_step(&mut self, high: bool) -> HwResult<()> {
        if high && !self.high {
            self.tally.pulses.set(self.tally.pulses.get() + 1);
        }
        self.high = high;
        Ok(())
    }

    fn set_neutral(&mut self, released: bool) -> HwResult<()> {
        self.tally.released.set(released);
        Ok(())
    }
}

/// Tension switch stuck in one position.
#[derive(Debug, Clone, Copy)]
pub struct FixedSwitch(pub bool);

impl TensionSwitch for FixedSwitch {
    fn is_taut(&mut self) -> HwResult<bool> {
        Ok(self.0)
    }
}

/// Remembers the last level it was driven to.
#[derive(Debug, Default)]
pub struct RecordingLed {
    level: Rc<Cell<u16>>,
}

impl RecordingLed {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn level(&self) -> Rc<Cell<u16>> {
        self.level.clone()
    }
}

impl Led for RecordingLed {
    fn set_level(&mut self, level: u16) -> HwResult<()> {
        self.level.set(level);
        Ok(())
    }
}

/// A sensor whose every read fails; exercises error propagation.
pub struct FailingSensor;

impl PhotoSensor for FailingSensor {
    fn read_level(&mut self) -> HwResult<u16> {
        Err(Box::new(std::io::Error::other("adc bus stuck")))
    }
}
