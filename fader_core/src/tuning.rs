//! Shared motor tuning and timing parameters.
//!
//! These mirror the serde schemas in `fader_config`; the core keeps its own
//! plain structs so the control loop never depends on serde types, and so
//! compiled-in defaults exist even with no config file at all.

/// Built-in tuning defaults, from the reference hardware bring-up.
pub const DEFAULT_MIN_DUTY: u8 = 45;
pub const DEFAULT_MAX_DUTY: u8 = 100;
pub const DEFAULT_CALIBRATION_DUTY: u8 = 80;
pub const DEFAULT_SLOW_ZONE: u8 = 25;
pub const DEFAULT_FAST_ZONE: u8 = 60;

/// Motor tuning shared by all channels. Duty values are hardware PWM units
/// (0-255); tolerances and zones are normalized position units (0-100).
#[derive(Debug, Clone)]
pub struct Tuning {
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
    pub slow_zone: u8,
    pub fast_zone: u8,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            min_duty: DEFAULT_MIN_DUTY,
            max_duty: DEFAULT_MAX_DUTY,
            calibration_duty: DEFAULT_CALIBRATION_DUTY,
            target_tolerance: 1,
            report_tolerance: 2,
            slow_zone: DEFAULT_SLOW_ZONE,
            fast_zone: DEFAULT_FAST_ZONE,
        }
    }
}

impl Tuning {
    /// Zone pair actually used for duty computation.
    ///
    /// Persisted config is re-validated on every use rather than trusted at
    /// write time: out-of-range or inverted zones are replaced wholesale by
    /// the built-in pair, never "repaired" piecemeal.
    pub fn effective_zones(&self) -> (i32, i32) {
        let slow = i32::from(self.slow_zone);
        let fast = i32::from(self.fast_zone);
        if slow > 100 || fast > 100 || fast <= slow {
            (i32::from(DEFAULT_SLOW_ZONE), i32::from(DEFAULT_FAST_ZONE))
        } else {
            (slow, fast)
        }
    }
}

impl From<&fader_config::TuningCfg> for Tuning {
    fn from(cfg: &fader_config::TuningCfg) -> Self {
        Self {
            min_duty: cfg.min_duty,
            max_duty: cfg.max_duty,
            calibration_duty: cfg.calibration_duty,
            target_tolerance: cfg.target_tolerance,
            report_tolerance: cfg.report_tolerance,
            slow_zone: cfg.slow_zone,
            fast_zone: cfg.fast_zone,
        }
    }
}

/// Move pass timing.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Hard cap on one convergence pass (ms).
    pub move_timeout_ms: u64,
    /// Delay before the single automatic retry after a timed-out pass (ms).
    pub retry_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            move_timeout_ms: 2000,
            retry_interval_ms: 1000,
        }
    }
}

impl From<&fader_config::TimeoutsCfg> for Timeouts {
    fn from(cfg: &fader_config::TimeoutsCfg) -> Self {
        Self {
            move_timeout_ms: cfg.move_timeout_ms,
            retry_interval_ms: cfg.retry_interval_ms,
        }
    }
}

/// Endpoint-calibration parameters.
#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    /// Raw delta under which a sample counts toward the plateau.
    pub plateau_threshold: i32,
    /// Consecutive stable samples needed to lock an endpoint.
    pub plateau_count: u32,
    /// Deadline per endpoint drive before falling back to defaults (ms).
    pub timeout_ms: u64,
    /// Pause between the max and min drives of one channel (ms).
    pub settle_ms: u64,
    /// Dead-zone margin subtracted from the locked top plateau so 100 stays
    /// reachable without re-stalling against the stop.
    pub max_margin: i32,
    /// Dead-zone margin added to the locked bottom plateau.
    pub min_margin: i32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            plateau_threshold: 2,
            plateau_count: 10,
            timeout_ms: 2000,
            settle_ms: 500,
            max_margin: 2,
            min_margin: 3,
        }
    }
}

impl From<&fader_config::CalibrationCfg> for CalibrationCfg {
    fn from(cfg: &fader_config::CalibrationCfg) -> Self {
        Self {
            plateau_threshold: cfg.plateau_threshold,
            plateau_count: cfg.plateau_count,
            timeout_ms: cfg.timeout_ms,
            settle_ms: cfg.settle_ms,
            ..Self::default()
        }
    }
}
