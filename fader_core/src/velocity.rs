//! Position error → motor command velocity profile.

use crate::tuning::Tuning;
use fader_traits::Direction;

/// One motor command: direction plus PWM duty magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DriveCommand {
    pub direction: Direction,
    pub duty: u8,
}

impl DriveCommand {
    pub const STOP: Self = Self {
        direction: Direction::Stopped,
        duty: 0,
    };

    #[must_use]
    pub fn is_stop(&self) -> bool {
        self.direction == Direction::Stopped
    }
}

/// Compute the drive command for `error = setpoint - current`.
///
/// Three-zone profile: full duty beyond `fast_zone`, minimum duty inside
/// `slow_zone`, linear interpolation between. The floor at `min_duty` keeps
/// the motor from stalling on static friction near the target; the taper
/// above it keeps a long move from slamming into the target at full speed.
/// Two zones would force choosing one failure mode or the other.
///
/// The zone pair is re-validated on every call (`Tuning::effective_zones`);
/// a corrupted persisted config degrades to built-in zones instead of
/// misbehaving.
#[must_use]
pub fn drive_command(error: i32, tuning: &Tuning) -> DriveCommand {
    let magnitude = i64::from(error).abs();
    if magnitude <= i64::from(tuning.target_tolerance) {
        return DriveCommand::STOP;
    }
    let direction = if error > 0 {
        Direction::Forward
    } else {
        Direction::Reverse
    };

    let (slow_zone, fast_zone) = tuning.effective_zones();
    let (slow_zone, fast_zone) = (i64::from(slow_zone), i64::from(fast_zone));
    let lo = i64::from(tuning.min_duty.min(tuning.max_duty));
    let hi = i64::from(tuning.min_duty.max(tuning.max_duty));

    let duty = if magnitude >= fast_zone {
        i64::from(tuning.max_duty)
    } else if magnitude <= slow_zone {
        i64::from(tuning.min_duty)
    } else {
        let rise = i64::from(tuning.max_duty) - i64::from(tuning.min_duty);
        // fast_zone > slow_zone is guaranteed by effective_zones()
        let extra = (magnitude - slow_zone) * rise / (fast_zone - slow_zone);
        (i64::from(tuning.min_duty) + extra).clamp(lo, hi)
    };

    DriveCommand {
        direction,
        duty: duty as u8,
    }
}
