//! Per-channel state for the fader bank.

use fader_traits::NUM_CHANNELS;

/// Full scale of the raw position samples (8-bit ADC, hardware-averaged).
pub const FULL_SCALE: i32 = 255;

/// Provisional calibration bounds used until a calibration session or a
/// persisted table overwrites them. Deliberately narrow so 0 and 100 stay
/// reachable on an uncalibrated unit, at the cost of a little resolution.
pub const DEFAULT_CALIB_MIN: i32 = 10;
pub const DEFAULT_CALIB_MAX: i32 = 245;

/// Minimum usable calibrated span: 60% of full scale. Anything narrower
/// means the fader never actually traveled (disconnected motor, jammed
/// rail) and the learned range is garbage.
pub const MIN_SPAN: i32 = FULL_SCALE * 60 / 100;

/// Learned-range plausibility limits: the bottom stop cannot sit above 20%
/// of full scale, the top stop cannot sit below 80%.
pub const MAX_PLAUSIBLE_MIN: i32 = FULL_SCALE * 20 / 100;
pub const MIN_PLAUSIBLE_MAX: i32 = FULL_SCALE - MAX_PLAUSIBLE_MIN;

/// Control state for one motorized fader.
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// Calibrated raw sample at 0% travel.
    pub calib_min: i32,
    /// Calibrated raw sample at 100% travel.
    pub calib_max: i32,
    /// Target position in normalized units.
    pub setpoint: u8,
    /// Last value handed to the manual-tracking reporter.
    pub last_reported: Option<u8>,
    /// Last value that passed change-threshold suppression.
    pub last_sent: Option<u8>,
    /// Touch flag snapshot for the current tick; while set, the motor is
    /// never driven for this channel.
    pub touched: bool,
    /// Cleared only by the administrative failure policy.
    pub motor_enabled: bool,
    /// Move timeouts since the last successful convergence.
    pub consecutive_failures: u32,
    /// Engine-epoch milliseconds of the most recent move failure.
    pub last_failure_time: Option<u64>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            calib_min: DEFAULT_CALIB_MIN,
            calib_max: DEFAULT_CALIB_MAX,
            setpoint: 0,
            last_reported: None,
            last_sent: None,
            touched: false,
            motor_enabled: true,
            consecutive_failures: 0,
            last_failure_time: None,
        }
    }
}

impl ChannelState {
    pub fn span(&self) -> i32 {
        self.calib_max.saturating_sub(self.calib_min)
    }

    /// True when the calibrated range passes the plausibility checks used
    /// after calibration and on persisted-table load.
    pub fn has_plausible_range(&self) -> bool {
        self.calib_min <= MAX_PLAUSIBLE_MIN
            && self.calib_max >= MIN_PLAUSIBLE_MAX
            && self.span() >= MIN_SPAN
    }

    pub(crate) fn record_failure(&mut self, now_ms: u64) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_time = Some(now_ms);
    }

    pub(crate) fn clear_failures(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// Fixed-size bank of channels, identity = index. No dynamic allocation;
/// channels live for the whole process image.
#[derive(Debug, Clone)]
pub struct ChannelBank {
    channels: [ChannelState; NUM_CHANNELS],
}

impl Default for ChannelBank {
    fn default() -> Self {
        Self {
            channels: std::array::from_fn(|_| ChannelState::default()),
        }
    }
}

impl ChannelBank {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::unused_self)]
    pub fn len(&self) -> usize {
        NUM_CHANNELS
    }

    #[allow(clippy::unused_self)]
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, channel: usize) -> Option<&ChannelState> {
        self.channels.get(channel)
    }

    pub fn get_mut(&mut self, channel: usize) -> Option<&mut ChannelState> {
        self.channels.get_mut(channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelState> {
        self.channels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ChannelState> {
        self.channels.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_a_plausible_range() {
        let ch = ChannelState::default();
        assert_eq!(ch.span(), 235);
        assert!(ch.has_plausible_range());
        assert!(ch.motor_enabled);
        assert_eq!(ch.setpoint, 0);
    }

    #[test]
    fn narrow_span_is_implausible() {
        let ch = ChannelState {
            calib_min: 40,
            calib_max: 180,
            ..ChannelState::default()
        };
        assert!(!ch.has_plausible_range());
    }

    #[test]
    fn failure_bookkeeping_saturates_and_clears() {
        let mut ch = ChannelState {
            consecutive_failures: u32::MAX,
            ..ChannelState::default()
        };
        ch.record_failure(42);
        assert_eq!(ch.consecutive_failures, u32::MAX);
        assert_eq!(ch.last_failure_time, Some(42));
        ch.clear_failures();
        assert_eq!(ch.consecutive_failures, 0);
        // Failure timestamp is history, not state; it survives the clear.
        assert_eq!(ch.last_failure_time, Some(42));
    }
}
