//! Human-readable error descriptions and structured JSON error formatting.

use filmscan_core::error::{AbortReason, BuildError, ScannerError};

use crate::cli::LAST_MAX_RUN_MS;

/// Stable name for an abort reason in JSON output.
pub fn abort_reason_name(reason: &AbortReason) -> &'static str {
    match reason {
        AbortReason::MaxRuntime => "MaxRuntime",
        AbortReason::Shutdown => "Shutdown",
        AbortReason::ScanErrors(_) => "ScanErrors",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor => {
                "What happened: No phototransistor input was provided to the scanner.\nLikely causes: The ADC failed to initialize or was not wired into the builder.\nHow to fix: Check [pins] pt_i2c_address and pt_channel, and that I2C is enabled.".to_string()
            }
            BuildError::MissingTransport => {
                "What happened: The film transport is incomplete.\nLikely causes: A stepper driver or the tension switch failed to initialize.\nHow to fix: Check the stepper and traction pins in [pins].".to_string()
            }
            BuildError::MissingLeds => {
                "What happened: The UV backlight or status LED is missing.\nLikely causes: LED pins not configured.\nHow to fix: Set uv_led and green_led in [pins].".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/filmscan.toml for a sample."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<ScannerError>() {
        return match se {
            ScannerError::Timeout => "What happened: Phototransistor read timed out.\nLikely causes: ADC not wired, wrong I2C address, or timeout too low.\nHow to fix: Verify the ADS1115 wiring and raise scan.sensor_timeout_ms.".to_string(),
            ScannerError::Abort(AbortReason::MaxRuntime) => "What happened: Maximum run time was exceeded.\nLikely causes: Too many frames for the time allowed, or the film stalled.\nHow to fix: Raise --max-run-ms or check the transport.".to_string(),
            ScannerError::Abort(AbortReason::Shutdown) => "What happened: Stopped on request.\nLikely causes: Ctrl-C or a termination signal.\nHow to fix: Nothing to fix; start a new run.".to_string(),
            ScannerError::Abort(AbortReason::ScanErrors(n)) => format!(
                "What happened: No perforation found in {n} frames in a row.\nLikely causes: Wrong gauge selected, PT level too high, or film not threaded.\nHow to fix: Check the gauge, let the level auto-calibrate (pt_level = 0), and re-thread the film."
            ),
            ScannerError::Hardware(msg) | ScannerError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Wiring, power, or GPIO permissions.\nHow to fix: Check connections and that the process may access GPIO and I2C."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<toml::de::Error>() {
        return format!(
            "What happened: The config file is not valid TOML.\nDetails: {}\nHow to fix: Correct the file; see etc/filmscan.toml for a sample.",
            te.message()
        );
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open ads1115") || lower.contains("open transport gpio") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO/I2C permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("script csv must have headers") {
        return "Invalid headers in script CSV. Expected 'delay_ms,command,param'.".to_string();
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for aborts; everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ScannerError::Abort(reason)) = err.downcast_ref::<ScannerError>() {
        return match reason {
            AbortReason::Shutdown => 2,
            AbortReason::ScanErrors(_) => 3,
            AbortReason::MaxRuntime => 4,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(ScannerError::Abort(reason)) = err.downcast_ref::<ScannerError>() {
        let msg = humanize(err);
        let reason_name = abort_reason_name(reason);
        let detail_obj = match reason {
            AbortReason::MaxRuntime => LAST_MAX_RUN_MS.get().map(|ms| json!({ "max_run_ms": ms })),
            AbortReason::ScanErrors(n) => Some(json!({ "consecutive": n })),
            AbortReason::Shutdown => None,
        };
        let obj = if let Some(d) = detail_obj {
            json!({ "reason": reason_name, "details": d, "message": msg })
        } else {
            json!({ "reason": reason_name, "message": msg })
        };
        return obj.to_string();
    }

    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
