//! Hardware backends for the fader wing.
//!
//! The default build ships a simulated ten-channel bank used by the CLI and
//! for development without hardware. The `hardware` feature adds a
//! Raspberry Pi backend (`rpi` module) driving H-bridges through `rppal`
//! GPIO and reading wiper positions through MCP3008 ADCs on SPI.

pub mod error;
#[cfg(feature = "hardware")]
pub mod rpi;

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use error::HwError;
use fader_traits::{Direction, MotorDriver, NUM_CHANNELS, PositionSensor, TouchSensor};

/// Raw units of travel per position read at full (255) duty.
const FULL_DUTY_STEP: f32 = 6.0;
/// Simulated mechanical stops, in raw units. Slightly outside the default
/// calibration range so endpoint discovery has something to find.
const STOP_MIN: f32 = 7.0;
const STOP_MAX: f32 = 247.0;

#[derive(Debug, Clone, Copy)]
struct SimChannel {
    position: f32,
    direction: Direction,
    duty: u8,
    stuck: bool,
}

impl Default for SimChannel {
    fn default() -> Self {
        Self {
            // Park mid-travel so both calibration directions have distance to cover.
            position: 128.0,
            direction: Direction::Stopped,
            duty: 0,
            stuck: false,
        }
    }
}

/// Simulated fader bank: duty-proportional velocity with hard mechanical
/// stops. Motion advances on every position read, mirroring the one
/// sample-per-tick cadence of the control loop.
#[derive(Debug, Default)]
pub struct SimulatedBank {
    channels: [SimChannel; NUM_CHANNELS],
}

impl SimulatedBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a channel in place; drives are accepted but produce no motion.
    pub fn set_stuck(&mut self, channel: usize, stuck: bool) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.stuck = stuck;
        }
    }

    /// Teleport a channel to a raw position (clamped to the stops).
    pub fn set_position(&mut self, channel: usize, raw: i32) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.position = (raw as f32).clamp(STOP_MIN, STOP_MAX);
        }
    }

    pub fn position(&self, channel: usize) -> Option<i32> {
        self.channels.get(channel).map(|ch| ch.position.round() as i32)
    }

    fn advance(&mut self, channel: usize) {
        let ch = &mut self.channels[channel];
        if ch.stuck || ch.duty == 0 {
            return;
        }
        let step = FULL_DUTY_STEP * f32::from(ch.duty) / 255.0;
        match ch.direction {
            Direction::Forward => ch.position = (ch.position + step).min(STOP_MAX),
            Direction::Reverse => ch.position = (ch.position - step).max(STOP_MIN),
            Direction::Stopped => {}
        }
    }
}

impl PositionSensor for SimulatedBank {
    fn read_raw(
        &mut self,
        channel: usize,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        if channel >= NUM_CHANNELS {
            return Err(Box::new(HwError::BadChannel(channel)));
        }
        self.advance(channel);
        Ok(self.channels[channel].position.round() as i32)
    }
}

impl MotorDriver for SimulatedBank {
    fn drive(
        &mut self,
        channel: usize,
        direction: Direction,
        duty: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Some(ch) = self.channels.get_mut(channel) else {
            return Err(Box::new(HwError::BadChannel(channel)));
        };
        ch.direction = direction;
        ch.duty = if direction == Direction::Stopped { 0 } else { duty };
        tracing::trace!(channel, ?direction, duty, "sim drive");
        Ok(())
    }
}

/// Shared touch-flag source backed by an atomic bitmask.
///
/// Clone one handle into the touch scanner thread and keep another to flip
/// flags from tests or the CLI; single writer, single reader.
#[derive(Debug, Clone, Default)]
pub struct SharedTouch {
    mask: Arc<AtomicU16>,
}

impl SharedTouch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_touched(&self, channel: usize, touched: bool) {
        if channel >= NUM_CHANNELS {
            return;
        }
        let bit = 1u16 << channel;
        if touched {
            self.mask.fetch_or(bit, Ordering::Relaxed);
        } else {
            self.mask.fetch_and(!bit, Ordering::Relaxed);
        }
    }
}

impl TouchSensor for SharedTouch {
    fn is_touched(&mut self, channel: usize) -> bool {
        channel < NUM_CHANNELS && self.mask.load(Ordering::Relaxed) & (1u16 << channel) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Direction::Forward, STOP_MAX as i32)]
    #[case(Direction::Reverse, STOP_MIN as i32)]
    fn drive_reaches_mechanical_stop(#[case] dir: Direction, #[case] stop: i32) {
        let mut bank = SimulatedBank::new();
        bank.drive(0, dir, 255).unwrap();
        let mut last = 0;
        for _ in 0..100 {
            last = bank.read_raw(0).unwrap();
        }
        assert_eq!(last, stop);
    }

    #[test]
    fn stuck_channel_never_moves() {
        let mut bank = SimulatedBank::new();
        bank.set_stuck(3, true);
        let before = bank.read_raw(3).unwrap();
        bank.drive(3, Direction::Forward, 255).unwrap();
        for _ in 0..50 {
            bank.read_raw(3).unwrap();
        }
        assert_eq!(bank.read_raw(3).unwrap(), before);
    }

    #[test]
    fn stop_zeroes_duty() {
        let mut bank = SimulatedBank::new();
        bank.drive(1, Direction::Forward, 200).unwrap();
        bank.drive(1, Direction::Stopped, 200).unwrap();
        let before = bank.read_raw(1).unwrap();
        assert_eq!(bank.read_raw(1).unwrap(), before);
    }

    #[test]
    fn bad_channel_is_rejected() {
        let mut bank = SimulatedBank::new();
        assert!(bank.read_raw(NUM_CHANNELS).is_err());
        assert!(bank.drive(NUM_CHANNELS, Direction::Forward, 10).is_err());
    }

    #[test]
    fn shared_touch_round_trip() {
        let touch = SharedTouch::new();
        let mut reader = touch.clone();
        assert!(!reader.is_touched(4));
        touch.set_touched(4, true);
        assert!(reader.is_touched(4));
        touch.set_touched(4, false);
        assert!(!reader.is_touched(4));
    }
}
