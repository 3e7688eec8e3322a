#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and persisted calibration for the fader wing.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The per-channel calibration table can also live in a CSV file with
//!   enforced headers, the format handed to/from the persistence layer.
//!
//! Validation here is the loud, load-time kind. The control core additionally
//! re-validates zone ordering on every use and silently falls back to built-in
//! defaults there; a corrupted file must never stall the control loop.

use fader_traits::NUM_CHANNELS;
use serde::{Deserialize, Serialize};

/// Motor tuning shared by every channel. Duty values are hardware PWM units
/// (0-255); everything else is normalized position units (0-100).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TuningCfg {
    /// Smallest duty that still overcomes static friction.
    pub min_duty: u8,
    /// Duty applied when the error is at or beyond `fast_zone`.
    pub max_duty: u8,
    /// Reduced duty used while hunting mechanical stops during calibration.
    pub calibration_duty: u8,
    /// |error| at or under this counts as "at target".
    pub target_tolerance: u8,
    /// Manual-motion change needed before an operator report is emitted.
    pub report_tolerance: u8,
    /// Error at or under this drives at `min_duty`.
    pub slow_zone: u8,
    /// Error at or beyond this drives at `max_duty`. Must exceed `slow_zone`.
    pub fast_zone: u8,
}

impl Default for TuningCfg {
    fn default() -> Self {
        Self {
            min_duty: 45,
            max_duty: 100,
            calibration_duty: 80,
            target_tolerance: 1,
            report_tolerance: 2,
            slow_zone: 25,
            fast_zone: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutsCfg {
    /// Hard cap on one convergence pass (ms).
    pub move_timeout_ms: u64,
    /// Delay before the single automatic retry after a timed-out pass (ms).
    pub retry_interval_ms: u64,
}

impl Default for TimeoutsCfg {
    fn default() -> Self {
        Self {
            move_timeout_ms: 2000,
            retry_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Raw delta under which a sample counts toward the plateau.
    pub plateau_threshold: i32,
    /// Consecutive stable samples needed to lock an endpoint.
    pub plateau_count: u32,
    /// Deadline per endpoint drive before falling back to defaults (ms).
    pub timeout_ms: u64,
    /// Pause between the max and min drives of one channel (ms).
    pub settle_ms: u64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            plateau_threshold: 2,
            plateau_count: 10,
            timeout_ms: 2000,
            settle_ms: 500,
        }
    }
}

/// Parameters for the external touch driver and the scanner thread.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TouchCfg {
    /// Touch snapshot polling rate.
    pub scan_rate_hz: u32,
    /// Passed through to the touch IC; higher = less sensitive.
    pub touch_threshold: u8,
    /// Passed through to the touch IC; lower = harder to release.
    pub release_threshold: u8,
}

impl Default for TouchCfg {
    fn default() -> Self {
        Self {
            scan_rate_hz: 50,
            touch_threshold: 12,
            release_threshold: 6,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    /// Path to a log file (JSON lines); stderr only when absent.
    pub file: Option<String>,
    /// "info", "debug", ...
    pub level: Option<String>,
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// One channel's persisted calibration range.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCalibration {
    pub channel: usize,
    pub raw_min: i32,
    pub raw_max: i32,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub tuning: TuningCfg,
    pub timeouts: TimeoutsCfg,
    pub calibration: CalibrationCfg,
    pub touch: TouchCfg,
    pub logging: Logging,
    /// Persisted per-channel ranges; absent channels keep built-in defaults.
    pub channels: Vec<ChannelCalibration>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Tuning
        if self.tuning.min_duty == 0 {
            eyre::bail!("tuning.min_duty must be > 0");
        }
        if self.tuning.max_duty < self.tuning.min_duty {
            eyre::bail!("tuning.max_duty must be >= tuning.min_duty");
        }
        if self.tuning.calibration_duty == 0 {
            eyre::bail!("tuning.calibration_duty must be > 0");
        }
        if self.tuning.target_tolerance > 100 {
            eyre::bail!("tuning.target_tolerance must be in [0, 100]");
        }
        if self.tuning.report_tolerance == 0 || self.tuning.report_tolerance > 100 {
            eyre::bail!("tuning.report_tolerance must be in [1, 100]");
        }
        if self.tuning.slow_zone > 100 || self.tuning.fast_zone > 100 {
            eyre::bail!("tuning zones must be in [0, 100]");
        }
        if self.tuning.fast_zone <= self.tuning.slow_zone {
            eyre::bail!("tuning.fast_zone must be greater than tuning.slow_zone");
        }

        // Timeouts
        if self.timeouts.move_timeout_ms == 0 {
            eyre::bail!("timeouts.move_timeout_ms must be >= 1");
        }
        if self.timeouts.retry_interval_ms == 0 {
            eyre::bail!("timeouts.retry_interval_ms must be >= 1");
        }

        // Calibration
        if self.calibration.plateau_threshold < 1 {
            eyre::bail!("calibration.plateau_threshold must be >= 1");
        }
        if self.calibration.plateau_count == 0 {
            eyre::bail!("calibration.plateau_count must be >= 1");
        }
        if self.calibration.timeout_ms == 0 {
            eyre::bail!("calibration.timeout_ms must be >= 1");
        }

        // Touch
        if self.touch.scan_rate_hz == 0 || self.touch.scan_rate_hz > 1000 {
            eyre::bail!("touch.scan_rate_hz must be in [1, 1000]");
        }

        // Persisted channel table
        validate_channels(&self.channels)?;

        Ok(())
    }
}

fn validate_channels(channels: &[ChannelCalibration]) -> eyre::Result<()> {
    let mut seen = [false; NUM_CHANNELS];
    for entry in channels {
        if entry.channel >= NUM_CHANNELS {
            eyre::bail!(
                "calibration entry for channel {} out of range (0..{})",
                entry.channel,
                NUM_CHANNELS
            );
        }
        if seen[entry.channel] {
            eyre::bail!("duplicate calibration entry for channel {}", entry.channel);
        }
        seen[entry.channel] = true;
        if entry.raw_min >= entry.raw_max {
            eyre::bail!(
                "channel {} calibration has raw_min {} >= raw_max {}",
                entry.channel,
                entry.raw_min,
                entry.raw_max
            );
        }
    }
    Ok(())
}

/// Calibration CSV schema.
///
/// Expected headers:
/// channel,raw_min,raw_max
///
/// Example:
/// channel,raw_min,raw_max
/// 0,12,243
/// 1,9,246
pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Vec<ChannelCalibration>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["channel", "raw_min", "raw_max"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'channel,raw_min,raw_max', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<ChannelCalibration>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    validate_channels(&rows)?;
    Ok(rows)
}

/// Write the persisted calibration table in the CSV format accepted by
/// [`load_calibration_csv`].
pub fn save_calibration_csv(
    path: &std::path::Path,
    rows: &[ChannelCalibration],
) -> eyre::Result<()> {
    validate_channels(rows)?;
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| eyre::eyre!("create calibration CSV {:?}: {}", path, e))?;
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| eyre::eyre!("write calibration row: {}", e))?;
    }
    wtr.flush()
        .map_err(|e| eyre::eyre!("flush calibration CSV: {}", e))?;
    Ok(())
}
