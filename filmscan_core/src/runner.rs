//! Drives a `Scanner` against a host until the host is done.
//!
//! The host stands in for the capture computer: it is polled once per loop
//! iteration (and may put commands on the bus through the peripheral) and is
//! told about every event the scanner produces.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::builder::Scanner;
use crate::error::{AbortReason, Result, ScannerError};
use crate::link::I2cPeripheral;
use crate::protocol::Event;
use crate::pump::{EventPump, EventRecord};
use crate::types::LearnedLevels;

pub trait Host {
    /// Called before every tick with the loop time elapsed so far.
    fn poll(&mut self, elapsed: Duration, link: &I2cPeripheral) -> Result<()>;
    /// Called for every event, in order.
    fn on_event(&mut self, event: &Event, link: &I2cPeripheral) -> Result<()>;
    /// `true` once the host has nothing more to send.
    fn finished(&self) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Hard cap on loop time.
    pub max_run: Option<Duration>,
    /// Set from a signal handler to stop the loop.
    pub shutdown: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub frames: u64,
    pub scan_errors: u64,
    pub events: u64,
    pub ticks: u64,
    pub elapsed: Duration,
    pub levels: LearnedLevels,
}

fn abort(reason: AbortReason) -> eyre::Report {
    eyre::Report::new(ScannerError::Abort(reason))
}

/// Run until the host is finished and the scanner has gone quiet.
pub fn run<H: Host + ?Sized>(
    scanner: &mut Scanner,
    host: &mut H,
    opts: &RunOptions,
    pump: Option<&EventPump>,
) -> Result<RunReport> {
    let clock = scanner.inner.clock.clone();
    let link = scanner.peripheral();
    let start = clock.now();
    let mut ticks: u64 = 0;
    let mut events: u64 = 0;

    tracing::info!(state = %scanner.state(), "control loop start");
    loop {
        let elapsed = clock.now().saturating_duration_since(start);
        if let Some(flag) = &opts.shutdown
            && flag.load(Ordering::Relaxed)
        {
            tracing::warn!(ticks, "shutdown requested");
            return Err(abort(AbortReason::Shutdown));
        }
        if let Some(max) = opts.max_run
            && elapsed >= max
        {
            tracing::warn!(?elapsed, "max run time exceeded");
            return Err(abort(AbortReason::MaxRuntime));
        }

        host.poll(elapsed, &link)?;
        scanner.tick()?;
        ticks += 1;

        for event in scanner.drain_events() {
            events += 1;
            if let Some(p) = pump {
                let at_ms = crate::util::duration_ms(elapsed);
                if !p.publish(EventRecord { at_ms, event }) {
                    tracing::warn!(event = event.name(), "event sink gone");
                }
            }
            host.on_event(&event, &link)?;
        }

        if host.finished() && scanner.is_quiescent() {
            break;
        }
        clock.sleep(scanner.idle_for());
    }

    let session = scanner.session();
    let report = RunReport {
        frames: session.frames,
        scan_errors: session.scan_errors,
        events,
        ticks,
        elapsed: clock.now().saturating_duration_since(start),
        levels: scanner.learned_levels(),
    };
    tracing::info!(
        frames = report.frames,
        scan_errors = report.scan_errors,
        ticks = report.ticks,
        "control loop done"
    );
    Ok(report)
}
