//! Simulated film transport.
//!
//! One `SimulatedFilm` owns the shared state; the sensor, stepper, switch and
//! LED handles it hands out all mutate that state, so capstan pulses move the
//! perforations under the phototransistor and take-up pulses reel in slack.
//! The tension arm has hysteresis: the switch opens only once slack passes
//! `slack_open_above` and closes again at `taut_at_or_below`.

use std::cell::RefCell;
use std::rc::Rc;

use filmscan_traits::{HwResult, Led, PhotoSensor, Stepper, TensionSwitch};

use crate::error::HwError;

/// Optical layout of the simulated film strip, in capstan micro-steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilmProfile {
    /// Distance between two perforations.
    pub pitch_steps: u32,
    /// Length of the perforation seen by the sensor.
    pub hole_steps: u32,
    /// Sensor level through a perforation.
    pub hole_level: u16,
    /// Sensor level through the film base.
    pub base_level: u16,
    /// Sensor level with the UV backlight off.
    pub dark_level: u16,
    /// Sensor level with the gate empty and the backlight on.
    pub open_gate_level: u16,
}

impl FilmProfile {
    pub fn super8() -> Self {
        Self {
            pitch_steps: 285,
            hole_steps: 40,
            hole_level: 800,
            base_level: 60,
            dark_level: 5,
            open_gate_level: 900,
        }
    }

    pub fn regular8() -> Self {
        Self {
            pitch_steps: 235,
            hole_steps: 30,
            ..Self::super8()
        }
    }
}

impl Default for FilmProfile {
    fn default() -> Self {
        Self::super8()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reel {
    Supply,
    Capstan,
    TakeUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedKind {
    Uv,
    Green,
}

/// Point-in-time copy of the simulated transport, for assertions and logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilmSnapshot {
    pub position: u64,
    pub slack: u32,
    pub supply_pulses: u64,
    pub capstan_pulses: u64,
    pub takeup_pulses: u64,
    pub uv_level: u16,
    pub green_level: u16,
    pub supply_released: bool,
    pub capstan_released: bool,
    pub takeup_released: bool,
    pub reads: u64,
}

#[derive(Debug)]
struct FilmState {
    profile: FilmProfile,
    loaded: bool,
    takeup_per_pulse: u32,
    taut_at_or_below: u32,
    slack_open_above: u32,
    switch_closed: bool,
    fail_reads: u32,
    snap: FilmSnapshot,
    step_high: [bool; 3],
}

impl FilmState {
    fn level(&self) -> u16 {
        if self.snap.uv_level == 0 {
            return self.profile.dark_level;
        }
        if !self.loaded {
            return self.profile.open_gate_level;
        }
        let pitch = u64::from(self.profile.pitch_steps.max(1));
        let offset = self.snap.position % pitch;
        if offset < u64::from(self.profile.hole_steps) {
            self.profile.hole_level
        } else {
            self.profile.base_level
        }
    }

    fn pulse(&mut self, reel: Reel) {
        match reel {
            Reel::Supply => self.snap.supply_pulses += 1,
            Reel::Capstan => {
                self.snap.capstan_pulses += 1;
                if !self.snap.capstan_released {
                    self.snap.position += 1;
                    self.snap.slack = self.snap.slack.saturating_add(1);
                }
            }
            Reel::TakeUp => {
                self.snap.takeup_pulses += 1;
                self.snap.slack = self.snap.slack.saturating_sub(self.takeup_per_pulse);
            }
        }
        if self.switch_closed && self.snap.slack > self.slack_open_above {
            self.switch_closed = false;
        } else if !self.switch_closed && self.snap.slack <= self.taut_at_or_below {
            self.switch_closed = true;
        }
    }
}

/// Shared simulated transport. Clones share the same film.
#[derive(Debug, Clone)]
pub struct SimulatedFilm {
    state: Rc<RefCell<FilmState>>,
}

impl Default for SimulatedFilm {
    fn default() -> Self {
        Self::new(FilmProfile::default())
    }
}

impl SimulatedFilm {
    pub fn new(profile: FilmProfile) -> Self {
        Self {
            state: Rc::new(RefCell::new(FilmState {
                profile,
                loaded: true,
                takeup_per_pulse: 12,
                taut_at_or_below: 4,
                slack_open_above: 30,
                switch_closed: true,
                fail_reads: 0,
                snap: FilmSnapshot::default(),
                step_high: [false; 3],
            })),
        }
    }

    pub fn sensor(&self) -> SimPhotoSensor {
        SimPhotoSensor {
            state: self.state.clone(),
        }
    }

    pub fn stepper(&self, reel: Reel) -> SimStepper {
        SimStepper {
            reel,
            state: self.state.clone(),
        }
    }

    pub fn tension_switch(&self) -> SimTensionSwitch {
        SimTensionSwitch {
            state: self.state.clone(),
        }
    }

    pub fn led(&self, kind: LedKind) -> SimLed {
        SimLed {
            kind,
            state: self.state.clone(),
        }
    }

    /// Thread film through the gate (or remove it).
    pub fn set_loaded(&self, loaded: bool) {
        self.state.borrow_mut().loaded = loaded;
    }

    /// Replace the film profile, e.g. after a gauge change.
    pub fn set_profile(&self, profile: FilmProfile) {
        self.state.borrow_mut().profile = profile;
    }

    /// Make the next `n` sensor reads fail with a timeout.
    pub fn fail_next_reads(&self, n: u32) {
        self.state.borrow_mut().fail_reads = n;
    }

    pub fn snapshot(&self) -> FilmSnapshot {
        self.state.borrow().snap
    }
}

pub struct SimPhotoSensor {
    state: Rc<RefCell<FilmState>>,
}

impl PhotoSensor for SimPhotoSensor {
    fn read_level(&mut self) -> HwResult<u16> {
        let mut st = self.state.borrow_mut();
        if st.fail_reads > 0 {
            st.fail_reads -= 1;
            return Err(Box::new(HwError::Timeout));
        }
        st.snap.reads += 1;
        Ok(st.level())
    }
}

pub struct SimStepper {
    reel: Reel,
    state: Rc<RefCell<FilmState>>,
}

impl SimStepper {
    fn index(&self) -> usize {
        match self.reel {
            Reel::Supply => 0,
            Reel::Capstan => 1,
            Reel::TakeUp => 2,
        }
    }
}

impl Stepper for SimStepper {
    fn set_step(&mut self, high: bool) -> HwResult<()> {
        let idx = self.index();
        let mut st = self.state.borrow_mut();
        // Motion happens on the rising edge.
        if high && !st.step_high[idx] {
            st.pulse(self.reel);
        }
        st.step_high[idx] = high;
        Ok(())
    }

    fn set_neutral(&mut self, released: bool) -> HwResult<()> {
        let mut st = self.state.borrow_mut();
        match self.reel {
            Reel::Supply => st.snap.supply_released = released,
            Reel::Capstan => st.snap.capstan_released = released,
            Reel::TakeUp => st.snap.takeup_released = released,
        }
        Ok(())
    }
}

pub struct SimTensionSwitch {
    state: Rc<RefCell<FilmState>>,
}

impl TensionSwitch for SimTensionSwitch {
    fn is_taut(&mut self) -> HwResult<bool> {
        Ok(self.state.borrow().switch_closed)
    }
}

pub struct SimLed {
    kind: LedKind,
    state: Rc<RefCell<FilmState>>,
}

impl Led for SimLed {
    fn set_level(&mut self, level: u16) -> HwResult<()> {
        let mut st = self.state.borrow_mut();
        match self.kind {
            LedKind::Uv => st.snap.uv_level = level,
            LedKind::Green => st.snap.green_level = level,
        }
        Ok(())
    }
}
