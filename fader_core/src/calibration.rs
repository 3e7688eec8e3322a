//! Endpoint calibration: learn each channel's physical travel range.
//!
//! One channel at a time (bounds peak current draw), each channel in two
//! drives: toward the top stop, then toward the bottom stop. An endpoint is
//! "found" by plateau detection, a debounced stall detector that tolerates
//! unit-to-unit differences in friction and travel length, with a hard
//! deadline falling back to the compiled-in boundary. A final plausibility
//! check rejects ranges from faders that never actually moved.
//!
//! The session is step-driven like the move coordinator: one sample per
//! scheduler tick, nothing blocks.

use crate::channel::{ChannelBank, DEFAULT_CALIB_MAX, DEFAULT_CALIB_MIN};
use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::tuning::{CalibrationCfg, Tuning};
use eyre::WrapErr;
use fader_traits::{ChannelStatus, Direction, MotorDriver, NUM_CHANNELS, PositionSensor, StatusSink};

/// How one channel's calibration went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelOutcome {
    /// Top endpoint fell back to the default boundary.
    pub max_degraded: bool,
    /// Bottom endpoint fell back to the default boundary.
    pub min_degraded: bool,
    /// Both endpoints locked but the resulting range was implausible.
    pub range_rejected: bool,
}

impl ChannelOutcome {
    #[must_use]
    pub fn failed(&self) -> bool {
        self.max_degraded || self.min_degraded || self.range_rejected
    }
}

/// Per-channel results of a finished session, for the persistence and
/// visual-feedback collaborators.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub outcomes: [ChannelOutcome; NUM_CHANNELS],
}

impl CalibrationReport {
    #[must_use]
    pub fn any_failed(&self) -> bool {
        self.outcomes.iter().any(ChannelOutcome::failed)
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failed()).count()
    }
}

/// Status of one session step.
#[derive(Debug, Clone)]
pub enum CalibrationStatus {
    InProgress,
    Complete(CalibrationReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    DriveToMax,
    /// Motor stopped, waiting out the mechanical settle pause.
    Settle {
        until_ms: u64,
    },
    DriveToMin,
}

/// One-shot calibration session over the whole bank.
#[derive(Debug)]
pub struct CalibrationSession {
    cfg: CalibrationCfg,
    channel: usize,
    phase: Phase,
    /// False until the current drive phase announced itself (status hint,
    /// counters reset, deadline start).
    announced: bool,
    phase_started_ms: u64,
    plateau: u32,
    last_sample: Option<i32>,
    outcomes: [ChannelOutcome; NUM_CHANNELS],
    /// Setpoints to restore once every channel is processed.
    saved_setpoints: [u8; NUM_CHANNELS],
}

impl CalibrationSession {
    /// Snapshot the bank's setpoints and start at channel 0.
    pub fn begin(cfg: CalibrationCfg, bank: &ChannelBank, now_ms: u64) -> Self {
        let mut saved_setpoints = [0u8; NUM_CHANNELS];
        for (i, ch) in bank.iter().enumerate() {
            saved_setpoints[i] = ch.setpoint;
        }
        tracing::info!("calibration session started");
        Self {
            cfg,
            channel: 0,
            phase: Phase::DriveToMax,
            announced: false,
            phase_started_ms: now_ms,
            plateau: 0,
            last_sample: None,
            outcomes: [ChannelOutcome::default(); NUM_CHANNELS],
            saved_setpoints,
        }
    }

    /// Channel currently being calibrated.
    pub fn current_channel(&self) -> usize {
        self.channel
    }

    /// Run one step: at most one drive command and one sample.
    pub fn step<H, S>(
        &mut self,
        bank: &mut ChannelBank,
        tuning: &Tuning,
        hw: &mut H,
        status: &mut S,
        now_ms: u64,
    ) -> Result<CalibrationStatus>
    where
        H: PositionSensor + MotorDriver,
        S: StatusSink,
    {
        match self.phase {
            Phase::Settle { until_ms } => {
                if now_ms >= until_ms {
                    self.phase = Phase::DriveToMin;
                    self.announced = false;
                }
                Ok(CalibrationStatus::InProgress)
            }
            Phase::DriveToMax => self.drive_step(true, bank, tuning, hw, status, now_ms),
            Phase::DriveToMin => self.drive_step(false, bank, tuning, hw, status, now_ms),
        }
    }

    fn drive_step<H, S>(
        &mut self,
        toward_max: bool,
        bank: &mut ChannelBank,
        tuning: &Tuning,
        hw: &mut H,
        status: &mut S,
        now_ms: u64,
    ) -> Result<CalibrationStatus>
    where
        H: PositionSensor + MotorDriver,
        S: StatusSink,
    {
        let idx = self.channel;
        if !self.announced {
            let hint = if toward_max {
                ChannelStatus::CalibratingMax
            } else {
                ChannelStatus::CalibratingMin
            };
            status.status(idx, hint);
            self.announced = true;
            self.phase_started_ms = now_ms;
            self.plateau = 0;
            self.last_sample = None;
            tracing::debug!(channel = idx, toward_max, "calibration drive started");
        }

        // Deadline check first, so a dead sensor cannot pin the session.
        if now_ms.saturating_sub(self.phase_started_ms) > self.cfg.timeout_ms {
            self.stop_motor(hw, idx);
            let Some(ch) = bank.get_mut(idx) else {
                return Ok(CalibrationStatus::InProgress);
            };
            if toward_max {
                ch.calib_max = DEFAULT_CALIB_MAX;
                self.outcomes[idx].max_degraded = true;
            } else {
                ch.calib_min = DEFAULT_CALIB_MIN;
                self.outcomes[idx].min_degraded = true;
            }
            tracing::warn!(
                channel = idx,
                toward_max,
                "no plateau before deadline; using default boundary"
            );
            return Ok(self.after_endpoint(toward_max, bank, status, now_ms));
        }

        let dir = if toward_max {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        hw.drive(idx, dir, tuning.calibration_duty)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("calibration drive")?;

        let raw = hw
            .read_raw(idx)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("calibration sample")?;
        match self.last_sample {
            Some(prev)
                if (i64::from(raw) - i64::from(prev)).abs()
                    < i64::from(self.cfg.plateau_threshold) =>
            {
                self.plateau += 1;
            }
            _ => self.plateau = 0,
        }
        self.last_sample = Some(raw);

        if self.plateau >= self.cfg.plateau_count {
            self.stop_motor(hw, idx);
            let Some(ch) = bank.get_mut(idx) else {
                return Ok(CalibrationStatus::InProgress);
            };
            if toward_max {
                // Back the stored bound off the stop so 100 stays reachable
                // without re-stalling the motor on every normal move.
                ch.calib_max = raw.saturating_sub(self.cfg.max_margin);
            } else {
                ch.calib_min = raw.saturating_add(self.cfg.min_margin);
            }
            tracing::debug!(channel = idx, raw, toward_max, "endpoint locked");
            return Ok(self.after_endpoint(toward_max, bank, status, now_ms));
        }

        Ok(CalibrationStatus::InProgress)
    }

    fn stop_motor<H: MotorDriver>(&self, hw: &mut H, idx: usize) {
        if let Err(e) = hw.drive(idx, Direction::Stopped, 0) {
            tracing::warn!(channel = idx, error = %e, "motor stop failed during calibration");
        }
    }

    /// Advance past a finished endpoint: settle pause after the top drive,
    /// channel wrap-up after the bottom drive.
    fn after_endpoint<S: StatusSink>(
        &mut self,
        toward_max: bool,
        bank: &mut ChannelBank,
        status: &mut S,
        now_ms: u64,
    ) -> CalibrationStatus {
        if toward_max {
            self.phase = Phase::Settle {
                until_ms: now_ms.saturating_add(self.cfg.settle_ms),
            };
            self.announced = false;
            return CalibrationStatus::InProgress;
        }

        self.finish_channel(bank, status);
        self.channel += 1;
        self.phase = Phase::DriveToMax;
        self.announced = false;

        if self.channel < NUM_CHANNELS {
            return CalibrationStatus::InProgress;
        }

        // Session done: put the bank back the way the operator had it.
        for (i, ch) in bank.iter_mut().enumerate() {
            ch.setpoint = self.saved_setpoints[i];
        }
        let report = CalibrationReport {
            outcomes: self.outcomes,
        };
        tracing::info!(failed = report.failed_count(), "calibration session finished");
        CalibrationStatus::Complete(report)
    }

    /// Range plausibility check and the per-channel verdict.
    fn finish_channel<S: StatusSink>(&mut self, bank: &mut ChannelBank, status: &mut S) {
        let idx = self.channel;
        let outcome = &mut self.outcomes[idx];
        if let Some(ch) = bank.get_mut(idx) {
            // Only a fully plateau-locked pair is worth sanity-checking;
            // timeout fallbacks already sit at the defaults.
            if !outcome.max_degraded && !outcome.min_degraded && !ch.has_plausible_range() {
                tracing::warn!(
                    channel = idx,
                    calib_min = ch.calib_min,
                    calib_max = ch.calib_max,
                    "implausible learned range; reverting to defaults"
                );
                ch.calib_min = DEFAULT_CALIB_MIN;
                ch.calib_max = DEFAULT_CALIB_MAX;
                outcome.range_rejected = true;
            }
        }
        let verdict = if outcome.failed() {
            ChannelStatus::Failed
        } else {
            ChannelStatus::Done
        };
        status.status(idx, verdict);
    }
}
