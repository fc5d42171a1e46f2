//! Hardware seams for the film transport.
//!
//! Every trait returns a boxed error so backends (GPIO, ADC, simulator) can
//! surface their own error types; the core maps them through
//! `filmscan_core::hw_error::map_hw_error`.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Phototransistor behind the film gate.
pub trait PhotoSensor {
    /// One analog conversion, scaled to 0..=1023 (higher means more light).
    fn read_level(&mut self) -> HwResult<u16>;
}

/// One stepper driver (supply reel, capstan or take-up reel).
pub trait Stepper {
    /// Drive the STEP line.
    fn set_step(&mut self, high: bool) -> HwResult<()>;
    /// Drive the neutral/enable line. High releases holding torque.
    fn set_neutral(&mut self, released: bool) -> HwResult<()>;
}

/// Tension switch on the take-up side.
pub trait TensionSwitch {
    /// `true` when the outgoing film is taut.
    fn is_taut(&mut self) -> HwResult<bool>;
}

/// PWM-driven LED (UV backlight or green indicator).
pub trait Led {
    /// Brightness in 0..=65535; 0 is off.
    fn set_level(&mut self, level: u16) -> HwResult<()>;
}

impl<T: PhotoSensor + ?Sized> PhotoSensor for Box<T> {
    fn read_level(&mut self) -> HwResult<u16> {
        (**self).read_level()
    }
}

impl<T: Stepper + ?Sized> Stepper for Box<T> {
    fn set_step(&mut self, high: bool) -> HwResult<()> {
        (**self).set_step(high)
    }
    fn set_neutral(&mut self, released: bool) -> HwResult<()> {
        (**self).set_neutral(released)
    }
}

impl<T: TensionSwitch + ?Sized> TensionSwitch for Box<T> {
    fn is_taut(&mut self) -> HwResult<bool> {
        (**self).is_taut()
    }
}

impl<T: Led + ?Sized> Led for Box<T> {
    fn set_level(&mut self, level: u16) -> HwResult<()> {
        (**self).set_level(level)
    }
}
