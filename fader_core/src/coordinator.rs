//! Convergence passes: drive every untouched channel toward its setpoint.
//!
//! A pass is not a blocking loop. `request_pass` arms it and `step` runs one
//! iteration per scheduler tick until every participating channel is inside
//! tolerance or the pass times out, so cooperative peers (network polling,
//! config server) keep running during a move. Timeout and retry semantics
//! match the reference behavior: stop everything, flag the stragglers, arm
//! exactly one automatic retry.

use crate::channel::ChannelBank;
use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::position::to_normalized;
use crate::tuning::{Timeouts, Tuning};
use crate::velocity::drive_command;
use eyre::WrapErr;
use fader_traits::{ChannelStatus, Direction, MotorDriver, PositionSensor, StatusSink};

/// Outcome of one coordinator step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStatus {
    /// No pass armed.
    Idle,
    /// Pass running; at least one channel still outside tolerance.
    InProgress,
    /// Every participating channel reached its setpoint this step.
    Converged,
    /// Pass hit the move timeout; stragglers flagged, motors stopped.
    TimedOut,
}

/// Drives all channels toward their setpoints and owns the timeout / retry
/// state machine. One instance per bank; state is per-pass, not per-channel.
#[derive(Debug)]
pub struct MoveCoordinator {
    timeouts: Timeouts,
    /// Reentrancy guard: a running pass owns all channel outputs.
    active: bool,
    pass_started_ms: u64,
    /// Set while the running pass is the automatic retry; a timed-out retry
    /// does not re-arm itself.
    pass_is_retry: bool,
    retry_pending: bool,
    retry_due_ms: u64,
}

impl MoveCoordinator {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            timeouts,
            active: false,
            pass_started_ms: 0,
            pass_is_retry: false,
            retry_pending: false,
            retry_due_ms: 0,
        }
    }

    /// Arm a convergence pass. No-op while one is already running: the
    /// running pass picks up any setpoints written in the meantime, values
    /// are overwritten in place and nothing queues.
    pub fn request_pass(&mut self, now_ms: u64) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.pass_started_ms = now_ms;
        self.pass_is_retry = false;
        tracing::debug!("move pass armed");
        true
    }

    /// Fire the pending retry once its due time has elapsed.
    pub fn poll_retry(&mut self, now_ms: u64) -> bool {
        if !self.retry_pending || self.active || now_ms < self.retry_due_ms {
            return false;
        }
        self.retry_pending = false;
        self.active = true;
        self.pass_started_ms = now_ms;
        self.pass_is_retry = true;
        tracing::debug!("retrying move pass");
        true
    }

    pub fn in_progress(&self) -> bool {
        self.active
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Due time of the armed retry, if any (engine-epoch ms).
    pub fn retry_due_ms(&self) -> Option<u64> {
        self.retry_pending.then_some(self.retry_due_ms)
    }

    /// Run one iteration of the active pass.
    ///
    /// Channel order is deterministic (index order); channels are independent
    /// control loops sharing only the tuning constants. Touched channels and
    /// administratively disabled channels are never driven and never block
    /// convergence.
    pub fn step<H, S>(
        &mut self,
        bank: &mut ChannelBank,
        tuning: &Tuning,
        hw: &mut H,
        status: &mut S,
        now_ms: u64,
    ) -> Result<MoveStatus>
    where
        H: PositionSensor + MotorDriver,
        S: StatusSink,
    {
        if !self.active {
            return Ok(MoveStatus::Idle);
        }

        let mut all_at_target = true;
        for (idx, ch) in bank.iter_mut().enumerate() {
            if ch.touched || !ch.motor_enabled {
                // A hand may have landed mid-pass while the motor was still
                // energized; the stop is unconditional.
                if let Err(e) = hw.drive(idx, Direction::Stopped, 0) {
                    tracing::warn!(channel = idx, error = %e, "stop failed for skipped channel");
                }
                continue;
            }
            let raw = hw
                .read_raw(idx)
                .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                .wrap_err("position sample")?;
            let current = to_normalized(raw, ch.calib_min, ch.calib_max);
            let error = i32::from(ch.setpoint) - i32::from(current);
            let cmd = drive_command(error, tuning);
            if !cmd.is_stop() {
                all_at_target = false;
            }
            hw.drive(idx, cmd.direction, cmd.duty)
                .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                .wrap_err("motor drive")?;
            tracing::trace!(
                channel = idx,
                current,
                setpoint = ch.setpoint,
                error,
                duty = cmd.duty,
                "pass step"
            );
        }

        if all_at_target {
            self.active = false;
            self.retry_pending = false;
            for ch in bank.iter_mut() {
                if !ch.touched && ch.motor_enabled {
                    ch.clear_failures();
                }
            }
            tracing::debug!("all channels at setpoint");
            return Ok(MoveStatus::Converged);
        }

        if now_ms.saturating_sub(self.pass_started_ms) >= self.timeouts.move_timeout_ms {
            self.finish_timed_out(bank, tuning, hw, status, now_ms);
            return Ok(MoveStatus::TimedOut);
        }

        Ok(MoveStatus::InProgress)
    }

    /// Timeout cleanup: stop every motor first, account failures second.
    /// All hardware calls here are best-effort; a cleanup path must not
    /// abort halfway and leave motors energized.
    fn finish_timed_out<H, S>(
        &mut self,
        bank: &mut ChannelBank,
        tuning: &Tuning,
        hw: &mut H,
        status: &mut S,
        now_ms: u64,
    ) where
        H: PositionSensor + MotorDriver,
        S: StatusSink,
    {
        for idx in 0..bank.len() {
            if let Err(e) = hw.drive(idx, Direction::Stopped, 0) {
                tracing::warn!(channel = idx, error = %e, "motor stop failed on move timeout");
            }
        }

        for (idx, ch) in bank.iter_mut().enumerate() {
            if ch.touched || !ch.motor_enabled {
                continue;
            }
            let outside = match hw.read_raw(idx) {
                Ok(raw) => {
                    let current = to_normalized(raw, ch.calib_min, ch.calib_max);
                    let error = i32::from(ch.setpoint) - i32::from(current);
                    error.unsigned_abs() > u32::from(tuning.target_tolerance)
                }
                Err(e) => {
                    tracing::warn!(channel = idx, error = %e, "position read failed at timeout");
                    true
                }
            };
            if outside {
                ch.record_failure(now_ms);
                status.status(idx, ChannelStatus::MoveTimeout);
                tracing::debug!(
                    channel = idx,
                    failures = ch.consecutive_failures,
                    "channel missed setpoint"
                );
            }
        }

        if self.pass_is_retry {
            tracing::debug!("retry pass timed out; not re-arming");
        } else {
            self.retry_pending = true;
            self.retry_due_ms = now_ms.saturating_add(self.timeouts.retry_interval_ms);
            tracing::debug!(due_ms = self.retry_due_ms, "armed move retry");
        }
        self.active = false;
    }
}
