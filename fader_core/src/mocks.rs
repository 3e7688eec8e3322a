//! Test and development doubles for the hardware seams.

use std::sync::{Arc, Mutex};

use fader_traits::{
    ChannelStatus, Direction, MotorDriver, NUM_CHANNELS, PositionReporter, PositionSensor,
    StatusSink,
};

/// Scripted position feed plus a motor-command recorder.
///
/// Each channel plays its scripted samples one per read, then holds the last
/// value forever — a stalled fader is simply a script that stops changing.
pub struct ScriptedBank {
    scripts: [Vec<i32>; NUM_CHANNELS],
    cursor: [usize; NUM_CHANNELS],
    hold: [i32; NUM_CHANNELS],
    /// Every drive command issued, in order.
    pub commands: Vec<(usize, Direction, u8)>,
}

impl ScriptedBank {
    /// All channels hold `raw` until scripted otherwise.
    pub fn holding(raw: i32) -> Self {
        Self {
            scripts: std::array::from_fn(|_| Vec::new()),
            cursor: [0; NUM_CHANNELS],
            hold: [raw; NUM_CHANNELS],
            commands: Vec::new(),
        }
    }

    /// Replace one channel's sample sequence.
    #[must_use]
    pub fn script(mut self, channel: usize, seq: &[i32]) -> Self {
        self.scripts[channel] = seq.to_vec();
        self
    }

    pub fn last_command(&self, channel: usize) -> Option<(Direction, u8)> {
        self.commands
            .iter()
            .rev()
            .find(|(c, _, _)| *c == channel)
            .map(|(_, d, duty)| (*d, *duty))
    }

    /// True if the channel ever received a non-stop drive command.
    pub fn drove_motor(&self, channel: usize) -> bool {
        self.commands
            .iter()
            .any(|(c, d, _)| *c == channel && *d != Direction::Stopped)
    }
}

impl PositionSensor for ScriptedBank {
    fn read_raw(
        &mut self,
        channel: usize,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let script = &self.scripts[channel];
        let v = if self.cursor[channel] < script.len() {
            let v = script[self.cursor[channel]];
            self.cursor[channel] += 1;
            self.hold[channel] = v;
            v
        } else {
            self.hold[channel]
        };
        Ok(v)
    }
}

impl MotorDriver for ScriptedBank {
    fn drive(
        &mut self,
        channel: usize,
        direction: Direction,
        duty: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.commands.push((channel, direction, duty));
        Ok(())
    }
}

/// Reporter that records every emission.
///
/// Clones share the same log, so a handle kept outside an engine still sees
/// what the engine-owned copy recorded.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<(usize, u8, bool)>>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<(usize, u8, bool)> {
        self.reports.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl PositionReporter for RecordingReporter {
    fn report(&mut self, channel: usize, value: u8, force: bool) {
        if let Ok(mut g) = self.reports.lock() {
            g.push((channel, value, force));
        }
    }
}

/// Reporter that discards everything.
#[derive(Debug, Default)]
pub struct NullReporter;

impl PositionReporter for NullReporter {
    fn report(&mut self, _channel: usize, _value: u8, _force: bool) {}
}

/// Status sink that records every hint; clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingStatus {
    events: Arc<Mutex<Vec<(usize, ChannelStatus)>>>,
}

impl RecordingStatus {
    pub fn events(&self) -> Vec<(usize, ChannelStatus)> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn events_for(&self, channel: usize) -> Vec<ChannelStatus> {
        self.events()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, s)| s)
            .collect()
    }
}

impl StatusSink for RecordingStatus {
    fn status(&mut self, channel: usize, status: ChannelStatus) {
        if let Ok(mut g) = self.events.lock() {
            g.push((channel, status));
        }
    }
}
