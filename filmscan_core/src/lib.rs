#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core film-scanner control logic (hardware-agnostic).
//!
//! All hardware goes through the `filmscan_traits` seams (`PhotoSensor`,
//! `Stepper`, `TensionSwitch`, `Led`) and time through `Clock`.
//!
//! ## Architecture
//!
//! - **Command channel**: lock-free SPSC ring between the I2C receive path and
//!   the loop (`channel`, `link`), wire codecs in `protocol`
//! - **Sensing**: phototransistor envelope and perforation threshold
//!   (`sensor`, `threshold`)
//! - **Frame length**: learned minimum steps per frame (`frame_steps`)
//! - **Motion**: pulse primitive, wind ramp (`motion`), take-up throttle
//!   (`tension`), scan pacing (`pacing`)
//! - **State machine**: `ScannerCore::tick` (`machine`), built through
//!   `Scanner::builder()` (`builder`) and driven by `runner::run`
//!
//! ## Units
//!
//! Sensor levels are raw ADC counts (0..=1023). The dynamic envelope runs in
//! tenths of a count (`i32`) so it can decay by fractions per sample. Delays
//! are microseconds unless a name says otherwise.

pub mod atomic;
pub mod builder;
pub mod channel;
pub mod config;
pub mod conversions;
pub mod error;
pub mod fixed_point;
pub mod frame_steps;
pub mod hw_error;
pub mod link;
pub mod machine;
pub mod mocks;
pub mod motion;
pub mod pacing;
pub mod protocol;
pub mod pump;
pub mod runner;
pub mod sensor;
pub mod session;
pub mod status;
pub mod telemetry;
pub mod tension;
pub mod threshold;
pub mod types;
pub mod util;

pub use builder::{Missing, ScannerBuilder, ScannerSettings, Set, Scanner, build_scanner};
pub use channel::CommandChannel;
pub use config::{ScanCfg, TelemetryCfg, TensionCfg, WindCfg};
pub use error::{AbortReason, BuildError, ProtocolError, Result, ScannerError};
pub use frame_steps::{FrameGeometry, FrameStepCalibrator, GaugeSteps};
pub use link::I2cPeripheral;
pub use machine::{Lamps, ScannerCore, Transport};
pub use protocol::{Command, Event, EventFrame, RawCommand};
pub use status::{ScanResult, ScanState};
pub use threshold::{GaugeThresholds, ThresholdCalibrator};
pub use types::{Gauge, LearnedLevels};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{CountingStepper, FixedSwitch, RecordingLed, ScriptedSensor};

    #[test]
    fn builder_reports_missing_pieces() {
        let err = Scanner::builder().try_build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingSensor)
        ));

        let err = Scanner::builder()
            .with_sensor(ScriptedSensor::constant(0))
            .try_build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingTransport)
        ));
    }

    #[test]
    fn builder_rejects_bad_speed() {
        let err = Scanner::builder()
            .with_sensor(ScriptedSensor::constant(0))
            .with_transport(
                CountingStepper::new(),
                CountingStepper::new(),
                CountingStepper::new(),
                FixedSwitch(true),
            )
            .with_leds(RecordingLed::new(), RecordingLed::new())
            .with_scan(ScanCfg {
                scan_speed: 11,
                ..ScanCfg::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn builder_rejects_lead_reaching_the_smallest_frame() {
        let build = |lead: u16| {
            Scanner::builder()
                .with_sensor(ScriptedSensor::constant(0))
                .with_transport(
                    CountingStepper::new(),
                    CountingStepper::new(),
                    CountingStepper::new(),
                    FixedSwitch(true),
                )
                .with_leds(RecordingLed::new(), RecordingLed::new())
                .with_scan(ScanCfg {
                    slowdown_lead_steps: lead,
                    ..ScanCfg::default()
                })
                .build()
        };
        let err = build(100).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidConfig(_))
        ));
        let scanner = build(99).unwrap();
        assert_eq!(scanner.frame_steps().decrease_speed_steps(), 186);
    }

    #[test]
    fn statically_dispatched_core_answers_version() {
        let channel = std::sync::Arc::new(CommandChannel::new());
        let link = I2cPeripheral::new(channel.clone());
        let mut core = build_scanner(
            ScriptedSensor::constant(0),
            Transport {
                supply: CountingStepper::new(),
                capstan: CountingStepper::new(),
                takeup: CountingStepper::new(),
                tension: FixedSwitch(true),
            },
            Lamps {
                uv: RecordingLed::new(),
                green: RecordingLed::new(),
            },
            ScannerSettings::default(),
            None,
            Some(channel),
        )
        .unwrap();
        assert!(link.send(Command::VersionCheck));
        assert_eq!(core.tick().unwrap(), ScanState::Idle);
        assert_eq!(
            core.drain_events(),
            vec![Event::Version { major: 1, minor: 0 }]
        );
    }

    #[test]
    fn fresh_scanner_is_idle_with_gauge_defaults() {
        let scanner = Scanner::builder()
            .with_sensor(ScriptedSensor::constant(0))
            .with_transport(
                CountingStepper::new(),
                CountingStepper::new(),
                CountingStepper::new(),
                FixedSwitch(true),
            )
            .with_leds(RecordingLed::new(), RecordingLed::new())
            .build()
            .unwrap();
        assert_eq!(scanner.state(), ScanState::Idle);
        assert_eq!(scanner.frame_steps().min_frame_steps(), 285);
        assert_eq!(scanner.threshold().threshold(), 90);
        assert!(scanner.is_quiescent());
    }
}
