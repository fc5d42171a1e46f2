//! States of the scan controller and outcomes of one scan evaluation.

/// Controller mode. `Idle` is initial and where every other mode returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    SingleStep,
    UnlockingReels,
    Rewinding,
    FastForwarding,
    SlowForwarding,
}

impl ScanState {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Scanning => "scanning",
            ScanState::SingleStep => "single_step",
            ScanState::UnlockingReels => "unlocking_reels",
            ScanState::Rewinding => "rewinding",
            ScanState::FastForwarding => "fast_forwarding",
            ScanState::SlowForwarding => "slow_forwarding",
        }
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one scan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    /// Still looking (or not yet due).
    NoFrame,
    FrameDetected,
    /// Too many steps without a perforation.
    DetectionError,
    TerminationRequested,
}
