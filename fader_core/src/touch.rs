//! Touch-flag snapshots and the background scanner thread.
//!
//! Touch state is written by a driver context and read by the control loop;
//! to keep that race explicit and harmless, the loop only ever sees a
//! `TouchSnapshot` — one immutable bitmask per tick, never a live flag read
//! mid-pass. The scanner owns the `TouchSensor`, polls it at a fixed rate,
//! and publishes latest-wins snapshots over a bounded channel.
//!
//! Each `TouchScanner` spawns exactly one thread, shut down and joined when
//! the scanner is dropped.

use crossbeam_channel as xch;
use fader_traits::clock::Clock;
use fader_traits::{NUM_CHANNELS, TouchSensor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Immutable per-tick snapshot of every channel's touch flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TouchSnapshot {
    bits: u16,
}

impl TouchSnapshot {
    /// Build a snapshot by polling a flag source once per channel.
    pub fn capture(mut probe: impl FnMut(usize) -> bool) -> Self {
        let mut bits = 0u16;
        for channel in 0..NUM_CHANNELS {
            if probe(channel) {
                bits |= 1 << channel;
            }
        }
        Self { bits }
    }

    #[must_use]
    pub fn is_touched(&self, channel: usize) -> bool {
        channel < NUM_CHANNELS && self.bits & (1 << channel) != 0
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.bits != 0
    }

    /// Flip a single flag; handy for tests and simulated input.
    pub fn set(&mut self, channel: usize, touched: bool) {
        if channel >= NUM_CHANNELS {
            return;
        }
        let bit = 1 << channel;
        if touched {
            self.bits |= bit;
        } else {
            self.bits &= !bit;
        }
    }
}

/// Background touch polling thread.
pub struct TouchScanner {
    rx: xch::Receiver<TouchSnapshot>,
    last_scan_ms: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TouchScanner {
    /// Spawn the scanner, polling `sensor` at `hz`.
    pub fn spawn<T, C>(mut sensor: T, hz: u32, clock: C) -> Self
    where
        T: TouchSensor + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (tx, rx) = xch::bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let last_scan_ms = Arc::new(AtomicU64::new(0));
        let last_scan_thread = last_scan_ms.clone();
        let period =
            Duration::from_micros((1_000_000 / u64::from(hz.max(1))).max(1));
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_thread.load(Ordering::Relaxed) {
                    break;
                }

                let snapshot = TouchSnapshot::capture(|ch| sensor.is_touched(ch));
                match tx.try_send(snapshot) {
                    Ok(()) => {}
                    // Consumer hasn't drained the previous snapshot; keep
                    // the scan cadence and publish a fresher one next round.
                    Err(xch::TrySendError::Full(_)) => {}
                    Err(xch::TrySendError::Disconnected(_)) => {
                        tracing::debug!("touch consumer disconnected, exiting scanner");
                        break;
                    }
                }
                last_scan_thread.store(clock.ms_since(epoch), Ordering::Relaxed);

                if shutdown_thread.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("touch scanner exiting");
        });

        Self {
            rx,
            last_scan_ms,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Freshest published snapshot, if any arrived since the last call.
    pub fn latest(&self) -> Option<TouchSnapshot> {
        self.rx.try_iter().last()
    }

    /// Milliseconds since the scanner last completed a poll round, given the
    /// caller's idea of "now" on the scanner's epoch.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_scan_ms.load(Ordering::Relaxed))
    }
}

impl Drop for TouchScanner {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "touch scanner panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_bit_round_trip() {
        let mut snap = TouchSnapshot::default();
        assert!(!snap.any());
        snap.set(0, true);
        snap.set(9, true);
        assert!(snap.is_touched(0));
        assert!(snap.is_touched(9));
        assert!(!snap.is_touched(5));
        snap.set(9, false);
        assert!(!snap.is_touched(9));
        assert!(snap.any());
    }

    #[test]
    fn capture_polls_every_channel() {
        let snap = TouchSnapshot::capture(|ch| ch % 2 == 0);
        for ch in 0..NUM_CHANNELS {
            assert_eq!(snap.is_touched(ch), ch % 2 == 0);
        }
    }

    #[test]
    fn out_of_range_channels_read_untouched() {
        let snap = TouchSnapshot::capture(|_| true);
        assert!(!snap.is_touched(NUM_CHANNELS));
        assert!(!snap.is_touched(usize::MAX));
    }
}
