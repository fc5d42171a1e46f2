//! Wire protocol between the host and the controller.
//!
//! Host → device: 3-byte messages `[code, param_lo, param_hi]`.
//! Device → host: 9-byte frames `[code, p1_hi, p1_lo, .., p4_hi, p4_lo]`.

use crate::error::ProtocolError;
use crate::types::Gauge;

pub const COMMAND_LEN: usize = 3;
pub const EVENT_FRAME_LEN: usize = 9;

/// Firmware version reported on a version check.
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

pub mod codes {
    pub const VERSION_CHECK: u8 = 1;
    pub const START_SCAN: u8 = 10;
    pub const TERMINATE: u8 = 11;
    pub const NEXT_FRAME: u8 = 12;
    pub const SELECT_REGULAR_8: u8 = 18;
    pub const SELECT_SUPER_8: u8 = 19;
    pub const TOGGLE_REEL_LOCK: u8 = 20;
    pub const FILM_FORWARD: u8 = 30;
    pub const SINGLE_STEP: u8 = 40;
    pub const SET_PT_LEVEL: u8 = 50;
    pub const SET_MIN_FRAME_STEPS: u8 = 52;
    pub const SET_FINE_TUNE: u8 = 54;
    pub const REWIND: u8 = 60;
    pub const FAST_FORWARD: u8 = 61;
    pub const INCREASE_WIND_DELAY: u8 = 62;
    pub const DECREASE_WIND_DELAY: u8 = 63;
    pub const UNCONDITIONAL_REWIND: u8 = 64;
    pub const UNCONDITIONAL_FAST_FORWARD: u8 = 65;
    pub const SET_SCAN_SPEED: u8 = 70;

    pub const VERSION_ID: u8 = 1;
    pub const FRAME_AVAILABLE: u8 = 80;
    pub const SCAN_ERROR: u8 = 81;
    pub const REWIND_ERROR: u8 = 82;
    pub const FAST_FORWARD_ERROR: u8 = 83;
    pub const REWIND_ENDED: u8 = 84;
    pub const FAST_FORWARD_ENDED: u8 = 85;
    pub const AUTO_LEVELS: u8 = 86;
}

/// Command names accepted in host scripts, with their wire codes.
const COMMAND_NAMES: &[(&str, u8)] = &[
    ("version_check", codes::VERSION_CHECK),
    ("start_scan", codes::START_SCAN),
    ("terminate", codes::TERMINATE),
    ("next_frame", codes::NEXT_FRAME),
    ("regular8", codes::SELECT_REGULAR_8),
    ("super8", codes::SELECT_SUPER_8),
    ("reel_lock", codes::TOGGLE_REEL_LOCK),
    ("film_forward", codes::FILM_FORWARD),
    ("single_step", codes::SINGLE_STEP),
    ("set_pt_level", codes::SET_PT_LEVEL),
    ("set_min_frame_steps", codes::SET_MIN_FRAME_STEPS),
    ("set_fine_tune", codes::SET_FINE_TUNE),
    ("rewind", codes::REWIND),
    ("fast_forward", codes::FAST_FORWARD),
    ("wind_slower", codes::INCREASE_WIND_DELAY),
    ("wind_faster", codes::DECREASE_WIND_DELAY),
    ("force_rewind", codes::UNCONDITIONAL_REWIND),
    ("force_fast_forward", codes::UNCONDITIONAL_FAST_FORWARD),
    ("set_scan_speed", codes::SET_SCAN_SPEED),
];

/// Resolve a script command (name or numeric code) to its wire code.
pub fn code_for_name(name: &str) -> Option<u8> {
    let name = name.trim();
    if let Ok(code) = name.parse::<u8>() {
        return (code > 0).then_some(code);
    }
    let lower = name.to_ascii_lowercase();
    COMMAND_NAMES
        .iter()
        .find(|(n, _)| *n == lower)
        .map(|(_, c)| *c)
}

/// Undecoded command as it travels through the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCommand {
    pub code: u8,
    pub param: u16,
}

impl RawCommand {
    pub fn new(code: u8, param: u16) -> Self {
        Self { code, param }
    }

    /// Bytes as the host puts them on the bus.
    pub fn to_wire(self) -> [u8; COMMAND_LEN] {
        let [lo, hi] = self.param.to_le_bytes();
        [self.code, lo, hi]
    }

    pub fn decode(self) -> Result<Command, ProtocolError> {
        Command::decode(self.code, self.param)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    VersionCheck,
    StartScan,
    Terminate,
    NextFrame,
    SelectGauge(Gauge),
    ToggleReelLock,
    FilmForward,
    SingleStep,
    /// 0 selects automatic thresholding.
    SetPtLevel(u16),
    /// 0 selects automatic frame-step learning.
    SetMinFrameSteps(u16),
    SetFineTune(i16),
    Rewind { checked: bool },
    FastForward { checked: bool },
    IncreaseWindDelay,
    DecreaseWindDelay,
    SetScanSpeed(u16),
}

impl Command {
    pub fn decode(code: u8, param: u16) -> Result<Self, ProtocolError> {
        use codes::*;
        Ok(match code {
            VERSION_CHECK => Command::VersionCheck,
            START_SCAN => Command::StartScan,
            TERMINATE => Command::Terminate,
            NEXT_FRAME => Command::NextFrame,
            SELECT_REGULAR_8 => Command::SelectGauge(Gauge::Regular8),
            SELECT_SUPER_8 => Command::SelectGauge(Gauge::Super8),
            TOGGLE_REEL_LOCK => Command::ToggleReelLock,
            FILM_FORWARD => Command::FilmForward,
            SINGLE_STEP => Command::SingleStep,
            SET_PT_LEVEL => Command::SetPtLevel(param),
            SET_MIN_FRAME_STEPS => Command::SetMinFrameSteps(param),
            SET_FINE_TUNE => Command::SetFineTune(i16::from_le_bytes(param.to_le_bytes())),
            REWIND => Command::Rewind { checked: true },
            FAST_FORWARD => Command::FastForward { checked: true },
            INCREASE_WIND_DELAY => Command::IncreaseWindDelay,
            DECREASE_WIND_DELAY => Command::DecreaseWindDelay,
            UNCONDITIONAL_REWIND => Command::Rewind { checked: false },
            UNCONDITIONAL_FAST_FORWARD => Command::FastForward { checked: false },
            SET_SCAN_SPEED => Command::SetScanSpeed(param),
            other => return Err(ProtocolError::UnknownCommand(other)),
        })
    }

    pub fn encode(self) -> RawCommand {
        use codes::*;
        let (code, param) = match self {
            Command::VersionCheck => (VERSION_CHECK, 0),
            Command::StartScan => (START_SCAN, 0),
            Command::Terminate => (TERMINATE, 0),
            Command::NextFrame => (NEXT_FRAME, 0),
            Command::SelectGauge(Gauge::Regular8) => (SELECT_REGULAR_8, 0),
            Command::SelectGauge(Gauge::Super8) => (SELECT_SUPER_8, 0),
            Command::ToggleReelLock => (TOGGLE_REEL_LOCK, 0),
            Command::FilmForward => (FILM_FORWARD, 0),
            Command::SingleStep => (SINGLE_STEP, 0),
            Command::SetPtLevel(p) => (SET_PT_LEVEL, p),
            Command::SetMinFrameSteps(p) => (SET_MIN_FRAME_STEPS, p),
            Command::SetFineTune(p) => (SET_FINE_TUNE, u16::from_le_bytes(p.to_le_bytes())),
            Command::Rewind { checked: true } => (REWIND, 0),
            Command::Rewind { checked: false } => (UNCONDITIONAL_REWIND, 0),
            Command::FastForward { checked: true } => (FAST_FORWARD, 0),
            Command::FastForward { checked: false } => (UNCONDITIONAL_FAST_FORWARD, 0),
            Command::IncreaseWindDelay => (INCREASE_WIND_DELAY, 0),
            Command::DecreaseWindDelay => (DECREASE_WIND_DELAY, 0),
            Command::SetScanSpeed(p) => (SET_SCAN_SPEED, p),
        };
        RawCommand::new(code, param)
    }
}

/// Device → host notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Version { major: u16, minor: u16 },
    FrameAvailable,
    ScanError { steps: u16, limit: u16 },
    RewindError,
    FastForwardError,
    RewindEnded,
    FastForwardEnded,
    AutoLevels { threshold: u16, min_frame_steps: u16 },
}

impl Event {
    pub fn code(&self) -> u8 {
        use codes::*;
        match self {
            Event::Version { .. } => VERSION_ID,
            Event::FrameAvailable => FRAME_AVAILABLE,
            Event::ScanError { .. } => SCAN_ERROR,
            Event::RewindError => REWIND_ERROR,
            Event::FastForwardError => FAST_FORWARD_ERROR,
            Event::RewindEnded => REWIND_ENDED,
            Event::FastForwardEnded => FAST_FORWARD_ENDED,
            Event::AutoLevels { .. } => AUTO_LEVELS,
        }
    }

    pub fn params(&self) -> [u16; 4] {
        match *self {
            Event::Version { major, minor } => [major, minor, 0, 0],
            Event::ScanError { steps, limit } => [steps, limit, 0, 0],
            Event::AutoLevels {
                threshold,
                min_frame_steps,
            } => [threshold, min_frame_steps, 0, 0],
            _ => [0; 4],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::Version { .. } => "version",
            Event::FrameAvailable => "frame_available",
            Event::ScanError { .. } => "scan_error",
            Event::RewindError => "rewind_error",
            Event::FastForwardError => "fast_forward_error",
            Event::RewindEnded => "rewind_ended",
            Event::FastForwardEnded => "fast_forward_ended",
            Event::AutoLevels { .. } => "auto_levels",
        }
    }

    pub fn to_frame(&self) -> EventFrame {
        EventFrame::new(self.code(), self.params())
    }

    pub fn from_frame(frame: &EventFrame) -> Result<Self, ProtocolError> {
        use codes::*;
        let [p1, p2, _, _] = frame.params;
        Ok(match frame.code {
            VERSION_ID => Event::Version {
                major: p1,
                minor: p2,
            },
            FRAME_AVAILABLE => Event::FrameAvailable,
            SCAN_ERROR => Event::ScanError {
                steps: p1,
                limit: p2,
            },
            REWIND_ERROR => Event::RewindError,
            FAST_FORWARD_ERROR => Event::FastForwardError,
            REWIND_ENDED => Event::RewindEnded,
            FAST_FORWARD_ENDED => Event::FastForwardEnded,
            AUTO_LEVELS => Event::AutoLevels {
                threshold: p1,
                min_frame_steps: p2,
            },
            other => return Err(ProtocolError::UnknownEvent(other)),
        })
    }
}

/// The 9-byte response buffer read by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFrame {
    pub code: u8,
    pub params: [u16; 4],
}

impl EventFrame {
    pub fn new(code: u8, params: [u16; 4]) -> Self {
        Self { code, params }
    }

    pub fn encode(&self) -> [u8; EVENT_FRAME_LEN] {
        let mut out = [0u8; EVENT_FRAME_LEN];
        out[0] = self.code;
        for (i, p) in self.params.iter().enumerate() {
            let [hi, lo] = p.to_be_bytes();
            out[1 + 2 * i] = hi;
            out[2 + 2 * i] = lo;
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < EVENT_FRAME_LEN {
            return Err(ProtocolError::ShortFrame(bytes.len()));
        }
        let mut params = [0u16; 4];
        for (i, p) in params.iter_mut().enumerate() {
            *p = u16::from_be_bytes([bytes[1 + 2 * i], bytes[2 + 2 * i]]);
        }
        Ok(Self {
            code: bytes[0],
            params,
        })
    }
}
