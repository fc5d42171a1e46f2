//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Loop-time cap of the current run (for JSON error details).
pub static LAST_MAX_RUN_MS: OnceLock<u64> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "filmscan", version, about = "Film scanner controller")]
pub struct Cli {
    /// Path to config TOML; without it `etc/filmscan.toml` is used when present
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); overrides `[logging] level`
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Film gauge as accepted on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum GaugeArg {
    Super8,
    Regular8,
}

impl From<GaugeArg> for filmscan_core::Gauge {
    fn from(g: GaugeArg) -> Self {
        match g {
            GaugeArg::Super8 => filmscan_core::Gauge::Super8,
            GaugeArg::Regular8 => filmscan_core::Gauge::Regular8,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture frames with a simulated host driving the scanner
    Scan {
        /// Frames to capture
        #[arg(long, default_value_t = 10)]
        frames: u64,
        /// Override the configured gauge
        #[arg(long, value_enum)]
        gauge: Option<GaugeArg>,
        /// Abort when loop time exceeds this many milliseconds
        #[arg(long, value_name = "MS")]
        max_run_ms: Option<u64>,
        /// Write the learned PT level and frame steps here on success
        #[arg(long, value_name = "FILE")]
        save_levels: Option<PathBuf>,
        /// Enable real-time mode (SCHED_FIFO, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on supported OSes.\n\nLinux: attempts SCHED_FIFO priority and mlockall(MCL_CURRENT|MCL_FUTURE). Needs CAP_SYS_NICE / CAP_IPC_LOCK (or root).\n\nmacOS: only mlockall is applied."
        )]
        rt: bool,
        /// SCHED_FIFO priority when --rt is enabled (Linux only)
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
    },
    /// Play a host command script (CSV: delay_ms,command,param)
    Script {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        /// Abort when loop time exceeds this many milliseconds
        #[arg(long, value_name = "MS")]
        max_run_ms: Option<u64>,
    },
    /// Single-step and film-gate sanity run
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
