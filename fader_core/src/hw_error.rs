//! Maps `Box<dyn Error>` from trait boundaries to typed `FaderError`.
//!
//! The traits in `fader_traits` use `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed error enum,
//! with an optional feature-gated path for `fader_hardware::HwError`
//! downcasting.

use crate::error::FaderError;

/// Map a trait-boundary error to a typed `FaderError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> FaderError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<fader_hardware::error::HwError>() {
            return match hw {
                fader_hardware::error::HwError::Timeout => FaderError::Timeout,
                other => FaderError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        FaderError::Timeout
    } else {
        FaderError::Hardware(s)
    }
}
