//! Top-level engine: owns the bank and composes the subsystems into the
//! per-tick control flow the firmware scheduler drives.

use std::sync::Arc;
use std::time::Instant;

use crate::calibration::{CalibrationReport, CalibrationSession, CalibrationStatus};
use crate::channel::{ChannelBank, ChannelState};
use crate::coordinator::{MoveCoordinator, MoveStatus};
use crate::error::{BuildError, Result};
use crate::manual;
use crate::touch::TouchSnapshot;
use crate::tuning::{CalibrationCfg, Timeouts, Tuning};
use eyre::Report;
use fader_traits::clock::{Clock, MonotonicClock};
use fader_traits::{
    ChannelStatus, Direction, MotorDriver, PositionReporter, PositionSensor, StatusSink,
};

/// What one engine tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Nothing to do: no pass armed, no calibration running.
    Idle,
    /// A convergence pass ran this tick.
    Moving(MoveStatus),
    /// A calibration session ran this tick.
    Calibrating,
    /// The calibration session finished this tick; a convergence pass back
    /// to the restored setpoints has been armed.
    CalibrationComplete(CalibrationReport),
}

/// Position control and calibration engine for the whole bank.
///
/// `H` is the hardware seam (one object providing both position samples and
/// motor actuation), `R` the operator-facing report sink, `S` the visual
/// feedback sink.
pub struct FaderEngine<H, R, S> {
    bank: ChannelBank,
    tuning: Tuning,
    calibration_cfg: CalibrationCfg,
    coordinator: MoveCoordinator,
    session: Option<CalibrationSession>,
    hw: H,
    reporter: R,
    status: S,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

/// Validate configs and build an engine.
///
/// Pass `None` for `clock` to use real monotonic time; tests inject a
/// deterministic clock.
pub fn build_engine<H, R, S>(
    hw: H,
    reporter: R,
    status: S,
    tuning: Tuning,
    timeouts: Timeouts,
    calibration_cfg: CalibrationCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<FaderEngine<H, R, S>>
where
    H: PositionSensor + MotorDriver,
    R: PositionReporter,
    S: StatusSink,
{
    if tuning.min_duty == 0 {
        return Err(Report::new(BuildError::InvalidConfig("min_duty must be > 0")));
    }
    if tuning.max_duty < tuning.min_duty {
        return Err(Report::new(BuildError::InvalidConfig(
            "max_duty must be >= min_duty",
        )));
    }
    if tuning.calibration_duty == 0 {
        return Err(Report::new(BuildError::InvalidConfig(
            "calibration_duty must be > 0",
        )));
    }
    if tuning.target_tolerance > 100 {
        return Err(Report::new(BuildError::InvalidConfig(
            "target_tolerance must be <= 100",
        )));
    }
    if tuning.report_tolerance == 0 {
        return Err(Report::new(BuildError::InvalidConfig(
            "report_tolerance must be > 0",
        )));
    }
    if timeouts.move_timeout_ms == 0 || timeouts.retry_interval_ms == 0 {
        return Err(Report::new(BuildError::InvalidConfig(
            "move timeouts must be >= 1 ms",
        )));
    }
    if calibration_cfg.plateau_threshold < 1 {
        return Err(Report::new(BuildError::InvalidConfig(
            "plateau_threshold must be >= 1",
        )));
    }
    if calibration_cfg.plateau_count == 0 {
        return Err(Report::new(BuildError::InvalidConfig(
            "plateau_count must be >= 1",
        )));
    }
    if calibration_cfg.timeout_ms == 0 {
        return Err(Report::new(BuildError::InvalidConfig(
            "calibration timeout must be >= 1 ms",
        )));
    }

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();

    Ok(FaderEngine {
        bank: ChannelBank::new(),
        tuning,
        calibration_cfg,
        coordinator: MoveCoordinator::new(timeouts),
        session: None,
        hw,
        reporter,
        status,
        clock,
        epoch,
    })
}

impl<H, R, S> FaderEngine<H, R, S>
where
    H: PositionSensor + MotorDriver,
    R: PositionReporter,
    S: StatusSink,
{
    /// Milliseconds since the engine was built (the time base for retry due
    /// times and failure timestamps).
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Run one control tick against the given touch snapshot.
    ///
    /// Exactly one snapshot per tick: the flags are latched into the bank
    /// here and nothing downstream re-reads live touch state mid-pass.
    pub fn tick(&mut self, touch: TouchSnapshot) -> Result<TickOutcome> {
        let now = self.now_ms();
        for (idx, ch) in self.bank.iter_mut().enumerate() {
            ch.touched = touch.is_touched(idx);
        }

        // Calibration suspends normal tracking entirely.
        if let Some(session) = self.session.as_mut() {
            return match session.step(
                &mut self.bank,
                &self.tuning,
                &mut self.hw,
                &mut self.status,
                now,
            )? {
                CalibrationStatus::InProgress => Ok(TickOutcome::Calibrating),
                CalibrationStatus::Complete(report) => {
                    self.session = None;
                    // Put the hardware back where the operator left it.
                    self.coordinator.request_pass(now);
                    Ok(TickOutcome::CalibrationComplete(report))
                }
            };
        }

        manual::on_tick(&mut self.bank, &self.tuning, &mut self.hw, &mut self.reporter)?;

        self.coordinator.poll_retry(now);
        let status = self.coordinator.step(
            &mut self.bank,
            &self.tuning,
            &mut self.hw,
            &mut self.status,
            now,
        )?;
        Ok(match status {
            MoveStatus::Idle => TickOutcome::Idle,
            other => TickOutcome::Moving(other),
        })
    }

    /// Store a remote setpoint. Clamped to [0, 100]; out-of-range channels
    /// are ignored. No immediate drive — motion happens on the next armed
    /// pass.
    pub fn set_setpoint(&mut self, channel: usize, value: i32) {
        let Some(ch) = self.bank.get_mut(channel) else {
            tracing::debug!(channel, "setpoint for unknown channel ignored");
            return;
        };
        ch.setpoint = value.clamp(0, 100) as u8;
        tracing::trace!(channel, setpoint = ch.setpoint, "setpoint stored");
    }

    /// Arm a convergence pass; no-op while one is running.
    pub fn request_move_pass(&mut self) -> bool {
        let now = self.now_ms();
        self.coordinator.request_pass(now)
    }

    /// Start a calibration session; no-op (false) if one is running.
    pub fn begin_calibration(&mut self) -> bool {
        if self.session.is_some() {
            return false;
        }
        let now = self.now_ms();
        self.session = Some(CalibrationSession::begin(
            self.calibration_cfg.clone(),
            &self.bank,
            now,
        ));
        true
    }

    pub fn calibrating(&self) -> bool {
        self.session.is_some()
    }

    pub fn move_in_progress(&self) -> bool {
        self.coordinator.in_progress()
    }

    pub fn retry_pending(&self) -> bool {
        self.coordinator.retry_pending()
    }

    pub fn retry_due_ms(&self) -> Option<u64> {
        self.coordinator.retry_due_ms()
    }

    pub fn channel(&self, channel: usize) -> Option<&ChannelState> {
        self.bank.get(channel)
    }

    pub fn bank(&self) -> &ChannelBank {
        &self.bank
    }

    /// Load a persisted calibration table. Implausible entries are skipped
    /// with a warning and the channel keeps its defaults; bad stored data
    /// must never poison the mapper.
    pub fn apply_calibration(&mut self, table: &[fader_config::ChannelCalibration]) {
        for entry in table {
            let Some(ch) = self.bank.get_mut(entry.channel) else {
                tracing::warn!(channel = entry.channel, "calibration entry for unknown channel");
                continue;
            };
            let candidate = ChannelState {
                calib_min: entry.raw_min,
                calib_max: entry.raw_max,
                ..ch.clone()
            };
            if candidate.has_plausible_range() {
                ch.calib_min = entry.raw_min;
                ch.calib_max = entry.raw_max;
            } else {
                tracing::warn!(
                    channel = entry.channel,
                    raw_min = entry.raw_min,
                    raw_max = entry.raw_max,
                    "implausible persisted range ignored"
                );
            }
        }
    }

    /// Current per-channel ranges, in the shape the persistence collaborator
    /// stores.
    pub fn calibration_table(&self) -> Vec<fader_config::ChannelCalibration> {
        self.bank
            .iter()
            .enumerate()
            .map(|(i, ch)| fader_config::ChannelCalibration {
                channel: i,
                raw_min: ch.calib_min,
                raw_max: ch.calib_max,
            })
            .collect()
    }

    /// Administrative escalation: disable motors on channels whose
    /// consecutive-failure count reached `max_failures`. Deliberately never
    /// called from the tick path — a single stuck move must not silently
    /// disable a fader mid-show. Returns how many channels were disabled.
    pub fn apply_failure_policy(&mut self, max_failures: u32) -> usize {
        let mut disabled = 0;
        for (idx, ch) in self.bank.iter_mut().enumerate() {
            if ch.motor_enabled && max_failures > 0 && ch.consecutive_failures >= max_failures {
                ch.motor_enabled = false;
                disabled += 1;
                self.status.status(idx, ChannelStatus::Failed);
                tracing::warn!(
                    channel = idx,
                    failures = ch.consecutive_failures,
                    "channel motor disabled by failure policy"
                );
            }
        }
        disabled
    }

    /// Re-enable a channel disabled by the failure policy.
    pub fn enable_channel(&mut self, channel: usize) {
        if let Some(ch) = self.bank.get_mut(channel) {
            ch.motor_enabled = true;
            ch.clear_failures();
        }
    }

    /// Best-effort stop of every motor; for shutdown paths.
    pub fn stop_all(&mut self) {
        for idx in 0..self.bank.len() {
            if let Err(e) = self.hw.drive(idx, Direction::Stopped, 0) {
                tracing::warn!(channel = idx, error = %e, "motor stop failed in stop_all");
            }
        }
    }

    /// Access the hardware seam (simulation scripting in tests and the CLI).
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}
