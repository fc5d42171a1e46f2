use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScannerError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("run aborted: {0}")]
    Abort(AbortReason),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("maximum runtime exceeded")]
    MaxRuntime,
    #[error("shutdown requested")]
    Shutdown,
    #[error("{0} consecutive scan errors")]
    ScanErrors(u32),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command code {0}")]
    UnknownCommand(u8),
    #[error("unknown event code {0}")]
    UnknownEvent(u8),
    #[error("event frame too short: {0} bytes")]
    ShortFrame(usize),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing photo sensor")]
    MissingSensor,
    #[error("missing transport (steppers + tension switch)")]
    MissingTransport,
    #[error("missing leds")]
    MissingLeds,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
