//! Per-session bookkeeping owned by the state machine.

use crate::status::ScanState;

/// Initial divisor for the green LED ramp; raised as frames are observed.
pub const INITIAL_MAX_FRAME_STEPS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    pub state: ScanState,
    pub frame_steps_done: u32,
    pub last_frame_steps: u32,
    pub max_frame_steps: u32,
    pub uv_led_on: bool,
    pub green_led_on: bool,
    pub reels_unlocked: bool,
    /// Frame-available events sent.
    pub frames: u64,
    pub scan_errors: u64,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self {
            state: ScanState::Idle,
            frame_steps_done: 0,
            last_frame_steps: 0,
            max_frame_steps: INITIAL_MAX_FRAME_STEPS,
            uv_led_on: false,
            green_led_on: false,
            reels_unlocked: false,
            frames: 0,
            scan_errors: 0,
        }
    }
}

impl ScanSession {
    /// Green LED level proportional to progress through the current frame.
    pub fn green_level(&self) -> u16 {
        let max = u64::from(self.max_frame_steps.max(1));
        let level = u64::from(self.frame_steps_done) * u64::from(u16::MAX) / max;
        u16::try_from(level).unwrap_or(u16::MAX)
    }

    /// Record a completed frame of `steps` steps.
    pub fn frame_done(&mut self, steps: u32) {
        self.last_frame_steps = steps;
        self.max_frame_steps = self.max_frame_steps.max(steps);
        self.frame_steps_done = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn green_level_saturates() {
        let mut s = ScanSession::default();
        s.frame_steps_done = 50;
        assert_eq!(s.green_level(), 32767);
        s.frame_steps_done = 250;
        assert_eq!(s.green_level(), u16::MAX);
        s.frame_done(250);
        assert_eq!(s.max_frame_steps, 250);
        assert_eq!(s.frame_steps_done, 0);
        assert_eq!(s.green_level(), 0);
    }
}
