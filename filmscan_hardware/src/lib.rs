//! Film transport backends: a simulator for development and tests, plus
//! Raspberry Pi GPIO/I2C drivers behind the `hardware` feature.

pub mod error;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod ads1115;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use error::HwError;
pub use sim::{FilmProfile, FilmSnapshot, LedKind, Reel, SimulatedFilm};
