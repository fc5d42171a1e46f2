#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `filmscan`: drive the film-scanner controller against the simulator or a
//! wired Raspberry Pi.

mod cli;
mod error_fmt;
mod rt;
mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use filmscan_config::Config;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, LAST_MAX_RUN_MS};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

const DEFAULT_CONFIG: &str = "etc/filmscan.toml";

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: color-eyre not installed: {e}");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            eprintln!("warning: no Ctrl-C handler: {e}");
        }
    }

    if let Err(err) = run(cli, shutdown) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::error!(error = %err, "exiting with error");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli, shutdown: Arc<AtomicBool>) -> eyre::Result<()> {
    if matches!(cli.cmd, Commands::Health) {
        return health(cli.json);
    }

    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(&cli, &cfg)?;
    tracing::debug!(?cfg, "config loaded");

    match cli.cmd {
        Commands::Scan {
            frames,
            gauge,
            max_run_ms,
            save_levels,
            rt,
            rt_prio,
        } => {
            rt::setup_rt_once(rt, rt_prio);
            scan(&cfg, frames, gauge.map(Into::into), max_run_ms, save_levels, cli.json, shutdown)
        }
        Commands::Script { file, max_run_ms } => script(&cfg, &file, max_run_ms, cli.json, shutdown),
        Commands::SelfCheck => self_check(&cfg, cli.json, shutdown),
        Commands::Health => health(cli.json),
    }
}

fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG);
            if !p.exists() {
                return Ok(Config::default());
            }
            p
        }
    };
    let text = std::fs::read_to_string(&path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = filmscan_config::load_toml(&text)?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, cfg: &Config) -> eyre::Result<()> {
    let level = cli
        .log_level
        .as_deref()
        .or(cfg.logging.level.as_deref())
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level '{level}'"))?;

    // Console logs go to stderr; stdout carries events and reports.
    let console = if cli.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let file = match &cfg.logging.file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
            let appender = match cfg.logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                "never" => tracing_appender::rolling::never(dir, name),
                other => eyre::bail!("logging.rotation must be never, daily or hourly (got '{other}')"),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))
}

fn health(json: bool) -> eyre::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") })
        );
    } else {
        println!("ok");
    }
    Ok(())
}

fn scan(
    cfg: &Config,
    frames: u64,
    gauge: Option<filmscan_core::Gauge>,
    max_run_ms: Option<u64>,
    save_levels: Option<PathBuf>,
    json: bool,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<()> {
    if let Some(ms) = max_run_ms {
        let _ = LAST_MAX_RUN_MS.set(ms);
    }
    let mut rig = session::assemble(cfg, gauge)?;
    let opts = session::run_options(max_run_ms, shutdown);
    let report = {
        let pump = session::spawn_printer(json);
        session::capture(&mut rig, frames, &opts, Some(&pump))?
        // Pump drops here, flushing every event before the summary.
    };

    if let Some(path) = &save_levels {
        filmscan_core::atomic::save_levels(path, report.levels)?;
        tracing::info!(path = %path.display(), "learned levels saved");
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "frames": report.frames,
                "scan_errors": report.scan_errors,
                "events": report.events,
                "elapsed_ms": filmscan_core::util::duration_ms(report.elapsed),
                "pt_level": report.levels.pt_level,
                "min_frame_steps": report.levels.min_frame_steps,
            })
        );
    } else {
        println!(
            "captured {} frames ({} scan errors) in {} ms; pt_level={} min_frame_steps={}",
            report.frames,
            report.scan_errors,
            filmscan_core::util::duration_ms(report.elapsed),
            report.levels.pt_level,
            report.levels.min_frame_steps,
        );
    }
    Ok(())
}

fn script(
    cfg: &Config,
    file: &Path,
    max_run_ms: Option<u64>,
    json: bool,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<()> {
    if let Some(ms) = max_run_ms {
        let _ = LAST_MAX_RUN_MS.set(ms);
    }
    let rows = filmscan_config::load_script_csv(file)?;
    let steps = session::compile_script(&rows)?;
    let mut rig = session::assemble(cfg, None)?;
    let opts = session::run_options(max_run_ms, shutdown);
    let report = {
        let pump = session::spawn_printer(json);
        session::play_script(&mut rig, steps, &opts, Some(&pump))?
    };
    tracing::info!(events = report.events, ticks = report.ticks, "script done");
    Ok(())
}

fn self_check(cfg: &Config, json: bool, shutdown: Arc<AtomicBool>) -> eyre::Result<()> {
    let mut rig = session::assemble(cfg, None)?;
    let opts = session::run_options(Some(60_000), shutdown);
    let check = session::self_check(&mut rig, &opts)?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": "ok",
                "film_in_gate": check.film_in_gate,
                "single_step_steps": check.single_step_steps,
            })
        );
    } else {
        println!(
            "self-check ok: film_in_gate={} single_step_steps={}",
            check.film_in_gate, check.single_step_steps
        );
    }
    Ok(())
}
