//! Manual tracking: touched channels follow the hand, not the motor.
//!
//! While a channel is touched its setpoint is continuously resynced to the
//! live reading, so when the hand lets go there is no discontinuity left for
//! the coordinator to chase. Reports cross the operator-facing sink with a
//! `force` flag when the fader lands exactly on 0 or 100, which tells the
//! collaborator to bypass its rate limiter for the final value.

use crate::channel::{ChannelBank, ChannelState};
use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::position::to_normalized;
use crate::tuning::Tuning;
use eyre::WrapErr;
use fader_traits::{PositionReporter, PositionSensor};

/// Process every touched channel for this tick.
pub fn on_tick<H, R>(
    bank: &mut ChannelBank,
    tuning: &Tuning,
    hw: &mut H,
    reporter: &mut R,
) -> Result<()>
where
    H: PositionSensor,
    R: PositionReporter,
{
    for (idx, ch) in bank.iter_mut().enumerate() {
        if !ch.touched {
            continue;
        }
        let raw = hw
            .read_raw(idx)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("position sample")?;
        let current = to_normalized(raw, ch.calib_min, ch.calib_max);

        // A slam to either extreme always goes out, tolerance or not.
        let force = (current == 0 || current == 100) && ch.last_reported != Some(current);
        let moved = match ch.last_reported {
            None => true,
            Some(prev) => {
                u32::from(current.abs_diff(prev)) >= u32::from(tuning.report_tolerance)
            }
        };
        if !moved && !force {
            continue;
        }

        ch.last_reported = Some(current);
        ch.setpoint = current;
        emit(reporter, idx, ch, current, force, tuning);
    }
    Ok(())
}

/// Change-threshold suppression against the last value actually sent.
/// Time-based rate limiting is the reporter's own concern.
fn emit<R: PositionReporter>(
    reporter: &mut R,
    channel: usize,
    ch: &mut ChannelState,
    value: u8,
    force: bool,
    tuning: &Tuning,
) {
    let changed = match ch.last_sent {
        None => true,
        Some(prev) => u32::from(value.abs_diff(prev)) >= u32::from(tuning.report_tolerance),
    };
    if force || changed {
        reporter.report(channel, value, force);
        ch.last_sent = Some(value);
        tracing::trace!(channel, value, force, "manual position report");
    }
}
