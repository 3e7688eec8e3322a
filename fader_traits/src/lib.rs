pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Number of motorized fader channels on the wing.
pub const NUM_CHANNELS: usize = 10;

/// Motor drive direction for one fader channel.
///
/// Defaults to `Stopped`: an H-bridge with both direction pins low and zero
/// duty leaves the motor free and the fader movable by hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    /// Toward the top mechanical stop (100%).
    Forward,
    /// Toward the bottom mechanical stop (0%).
    Reverse,
    #[default]
    Stopped,
}

/// Per-channel status hints handed to the visual feedback collaborator.
///
/// The control core decides *when* these fire; rendering (colors, flashing,
/// pixel layout) belongs entirely to the receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Calibration is driving this channel toward its top stop.
    CalibratingMax,
    /// Calibration is driving this channel toward its bottom stop.
    CalibratingMin,
    /// Calibration finished for this channel with a usable range.
    Done,
    /// Calibration finished degraded (timeout fallback or rejected range).
    Failed,
    /// This channel did not converge within the move timeout.
    MoveTimeout,
}

/// Source of raw wiper position samples.
pub trait PositionSensor {
    fn read_raw(
        &mut self,
        channel: usize,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Motor actuation sink: one H-bridge + PWM pair per channel.
pub trait MotorDriver {
    fn drive(
        &mut self,
        channel: usize,
        direction: Direction,
        duty: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Source of per-channel touch flags.
///
/// Implementations are expected to be cheap to poll; the control core reads
/// a full snapshot once per tick and never mid-pass.
pub trait TouchSensor {
    fn is_touched(&mut self, channel: usize) -> bool;
}

/// Operator-facing position report sink.
///
/// `force` marks reports that must bypass the receiver's rate limiter
/// (a fader slammed to exactly 0 or 100). Emission failures are the
/// receiver's problem; the control loop must never stall on reporting.
pub trait PositionReporter {
    fn report(&mut self, channel: usize, value: u8, force: bool);
}

/// Visual feedback sink for per-channel status hints.
pub trait StatusSink {
    fn status(&mut self, channel: usize, status: ChannelStatus);
}
