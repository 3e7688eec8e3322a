//! Raw sample → normalized position mapping.

/// Raw-sample band at each end of the calibrated range that latches hard to
/// the extreme. Absorbs ADC jitter at the mechanical stops so 0 and 100 read
/// cleanly instead of flickering to 1 or 99.
pub const EDGE_MARGIN: i32 = 4;

/// Map a raw wiper sample into [0, 100] against a calibrated range.
///
/// Samples within `EDGE_MARGIN` of either bound clamp to the extreme;
/// everything else interpolates linearly with truncating integer division
/// and is clamped once more as a final safety net. Pure function, total for
/// all inputs including degenerate ranges.
#[must_use]
pub fn to_normalized(raw: i32, calib_min: i32, calib_max: i32) -> u8 {
    if raw <= calib_min.saturating_add(EDGE_MARGIN) {
        return 0;
    }
    if raw >= calib_max.saturating_sub(EDGE_MARGIN) {
        return 100;
    }
    // Reaching here implies calib_min + EDGE_MARGIN < raw < calib_max - EDGE_MARGIN,
    // so the span is strictly positive and the division is safe.
    let span = i64::from(calib_max) - i64::from(calib_min);
    let scaled = (i64::from(raw) - i64::from(calib_min)) * 100 / span;
    scaled.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{DEFAULT_CALIB_MAX, DEFAULT_CALIB_MIN};

    #[test]
    fn interpolates_with_truncation() {
        // (200 - 10) * 100 / 235 = 80.85.. -> 80
        assert_eq!(to_normalized(200, 10, 245), 80);
    }

    #[test]
    fn bounds_map_to_extremes() {
        assert_eq!(to_normalized(DEFAULT_CALIB_MIN, DEFAULT_CALIB_MIN, DEFAULT_CALIB_MAX), 0);
        assert_eq!(to_normalized(DEFAULT_CALIB_MAX, DEFAULT_CALIB_MIN, DEFAULT_CALIB_MAX), 100);
    }

    #[test]
    fn edge_margin_latches_the_extremes() {
        assert_eq!(to_normalized(14, 10, 245), 0); // min + 4
        assert_eq!(to_normalized(15, 10, 245), 2); // first unlatched sample
        assert_eq!(to_normalized(241, 10, 245), 100); // max - 4
        assert_eq!(to_normalized(240, 10, 245), 97);
    }

    #[test]
    fn out_of_range_samples_clamp() {
        assert_eq!(to_normalized(-500, 10, 245), 0);
        assert_eq!(to_normalized(500, 10, 245), 100);
    }

    #[test]
    fn degenerate_range_latches_an_extreme_instead_of_dividing() {
        // Inverted/collapsed bounds can only appear mid-calibration; every
        // sample then lands in one of the clamp bands.
        assert_eq!(to_normalized(50, 100, 100), 0);
        assert_eq!(to_normalized(150, 120, 100), 100);
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        let _ = to_normalized(i32::MAX, i32::MIN, i32::MAX);
        let _ = to_normalized(i32::MIN, i32::MIN, i32::MAX);
        let _ = to_normalized(0, i32::MIN, i32::MAX);
    }
}
