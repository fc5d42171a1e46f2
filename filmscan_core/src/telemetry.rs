//! Plotter lines and the collapsing debug stream.

use std::time::{Duration, Instant};

use crate::sensor::PtEnvelope;

pub const PLOTTER_TARGET: &str = "filmscan::plotter";
pub const DEBUG_TARGET: &str = "filmscan::debug";

const MAX_REPEAT_COUNT: u32 = 30_000;
const MAX_DEBUG_LINE: usize = 50;

/// Rate-limited `PT:..,MaxPT:..,MinPT:..,Threshold:..` lines for a serial plotter.
#[derive(Debug, Clone)]
pub struct PlotterReporter {
    enabled: bool,
    interval: Duration,
    next_report: Option<Instant>,
    previous_level: u16,
    previous_frame_steps: u32,
}

impl PlotterReporter {
    pub fn new(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval,
            next_report: None,
            previous_level: 0,
            previous_frame_steps: 0,
        }
    }

    /// Build (and log) a line when enabled, due, and something changed.
    pub fn report(
        &mut self,
        now: Instant,
        envelope: &PtEnvelope,
        threshold: u16,
        last_frame_steps: u32,
    ) -> Option<String> {
        if !self.enabled || self.next_report.is_some_and(|at| now <= at) {
            return None;
        }
        if envelope.raw() == self.previous_level && last_frame_steps == self.previous_frame_steps {
            return None;
        }
        self.next_report = Some(now + self.interval);
        self.previous_level = envelope.raw();
        self.previous_frame_steps = last_frame_steps;
        let line = format!(
            "PT:{},MaxPT:{},MinPT:{},Threshold:{}",
            envelope.raw(),
            envelope.max_dynamic() / 10,
            envelope.min_dynamic() / 10,
            threshold
        );
        tracing::info!(target: PLOTTER_TARGET, "{line}");
        Some(line)
    }
}

/// Suppresses a debug line after `max` identical repeats and reports how
/// many were swallowed once a different line arrives.
#[derive(Debug, Clone, Default)]
pub struct RepeatCollapser {
    previous: Option<String>,
    repeats: u32,
    max: u32,
}

impl RepeatCollapser {
    pub fn new(max: u32) -> Self {
        Self {
            previous: None,
            repeats: 0,
            max,
        }
    }

    /// Lines to print for `line`, oldest first.
    pub fn feed(&mut self, line: &str) -> Vec<String> {
        if line.len() >= MAX_DEBUG_LINE {
            return vec!["Cannot print debug line, too long".to_string()];
        }
        let mut out = Vec::new();
        let mut print = true;
        if self.previous.as_deref() == Some(line) {
            if self.repeats < MAX_REPEAT_COUNT {
                self.repeats += 1;
            }
            if self.repeats > self.max {
                print = false;
            }
        } else {
            if self.repeats > self.max {
                out.push(if self.repeats < MAX_REPEAT_COUNT {
                    format!("Previous line repeated {} times", self.repeats - self.max)
                } else {
                    "Previous line repeated more than 30,000 times".to_string()
                });
            }
            self.repeats = 0;
            self.previous = Some(line.to_string());
        }
        if print {
            out.push(line.to_string());
        }
        out
    }

    /// `feed` and send the result to the debug target.
    pub fn log(&mut self, line: &str) {
        for l in self.feed(line) {
            tracing::debug!(target: DEBUG_TARGET, "{l}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_after_max_repeats() {
        let mut c = RepeatCollapser::new(3);
        let mut printed = Vec::new();
        for _ in 0..10 {
            printed.extend(c.feed("Frame!"));
        }
        assert_eq!(printed.len(), 4);
        let tail = c.feed("FrmS=285");
        assert_eq!(
            tail,
            vec!["Previous line repeated 6 times".to_string(), "FrmS=285".to_string()]
        );
    }

    #[test]
    fn long_lines_are_refused() {
        let mut c = RepeatCollapser::new(3);
        let long = "x".repeat(60);
        assert_eq!(c.feed(&long), vec!["Cannot print debug line, too long"]);
    }

    #[test]
    fn plotter_reports_only_on_change_and_interval() {
        let mut p = PlotterReporter::new(true, Duration::from_millis(20));
        let mut env = PtEnvelope::new();
        env.observe(40);
        let t0 = Instant::now();
        assert_eq!(
            p.report(t0, &env, 40, 0).as_deref(),
            Some("PT:40,MaxPT:40,MinPT:40,Threshold:40")
        );
        env.observe(41);
        assert!(p.report(t0 + Duration::from_millis(5), &env, 40, 0).is_none());
        assert!(p.report(t0 + Duration::from_millis(25), &env, 40, 0).is_some());
        assert!(p.report(t0 + Duration::from_millis(60), &env, 40, 0).is_none());
    }

    #[test]
    fn disabled_plotter_is_silent() {
        let mut p = PlotterReporter::new(false, Duration::from_millis(20));
        let mut env = PtEnvelope::new();
        env.observe(500);
        assert!(p.report(Instant::now(), &env, 0, 0).is_none());
    }
}
