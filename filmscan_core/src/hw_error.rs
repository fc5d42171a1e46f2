//! Maps `Box<dyn Error>` from trait boundaries to typed `ScannerError`.
//!
//! The traits in `filmscan_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `filmscan_hardware::HwError` downcasting.

use crate::error::ScannerError;

/// Map a trait-boundary error to a typed `ScannerError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ScannerError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<filmscan_hardware::error::HwError>() {
            return match hw {
                filmscan_hardware::error::HwError::Timeout => ScannerError::Timeout,
                filmscan_hardware::error::HwError::DataReadyTimeout => ScannerError::Timeout,
                other => ScannerError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ScannerError::Timeout
    } else {
        ScannerError::Hardware(s)
    }
}

/// Wrap a trait-boundary error into an `eyre::Report` carrying a typed `ScannerError`.
pub(crate) fn hw_report(e: Box<dyn std::error::Error + Send + Sync>) -> eyre::Report {
    eyre::Report::new(map_hw_error(e.as_ref()))
}
