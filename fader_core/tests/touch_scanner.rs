//! Touch scanner thread: snapshot publication and clean shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use fader_core::TouchScanner;
use fader_traits::TouchSensor;
use fader_traits::clock::MonotonicClock;

/// Flag source shared between the test thread and the scanner thread.
#[derive(Clone, Default)]
struct AtomicTouch {
    mask: Arc<AtomicU16>,
}

impl AtomicTouch {
    fn set(&self, channel: usize, touched: bool) {
        let bit = 1u16 << channel;
        if touched {
            self.mask.fetch_or(bit, Ordering::Relaxed);
        } else {
            self.mask.fetch_and(!bit, Ordering::Relaxed);
        }
    }
}

impl TouchSensor for AtomicTouch {
    fn is_touched(&mut self, channel: usize) -> bool {
        channel < 16 && self.mask.load(Ordering::Relaxed) & (1u16 << channel) != 0
    }
}

/// Poll `latest` until a snapshot matches `pred` or the deadline passes.
fn wait_for(
    scanner: &TouchScanner,
    pred: impl Fn(fader_core::TouchSnapshot) -> bool,
    deadline: Duration,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if let Some(snap) = scanner.latest() {
            if pred(snap) {
                return true;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn publishes_flag_changes() {
    let touch = AtomicTouch::default();
    let scanner = TouchScanner::spawn(touch.clone(), 1000, MonotonicClock::new());

    assert!(
        wait_for(&scanner, |s| !s.any(), Duration::from_secs(1)),
        "initial all-clear snapshot"
    );

    touch.set(3, true);
    assert!(
        wait_for(&scanner, |s| s.is_touched(3), Duration::from_secs(1)),
        "touch appears in a snapshot"
    );

    touch.set(3, false);
    assert!(
        wait_for(&scanner, |s| !s.any(), Duration::from_secs(1)),
        "release appears in a snapshot"
    );
}

#[test]
fn latest_is_none_before_first_publish_and_drains() {
    let touch = AtomicTouch::default();
    let scanner = TouchScanner::spawn(touch, 1000, MonotonicClock::new());
    // Whatever arrives, a second immediate read returns nothing new or a
    // fresher snapshot; it never blocks.
    let _ = scanner.latest();
    let _ = scanner.latest();
}

#[test]
fn drop_joins_the_scanner_thread() {
    let touch = AtomicTouch::default();
    let scanner = TouchScanner::spawn(touch, 1000, MonotonicClock::new());
    assert!(
        wait_for(&scanner, |_| true, Duration::from_secs(1)),
        "scanner is alive"
    );
    // Dropping must not hang even though the thread may be mid-sleep.
    drop(scanner);
}

#[test]
fn stall_accessor_tracks_scan_liveness() {
    let touch = AtomicTouch::default();
    let scanner = TouchScanner::spawn(touch, 1000, MonotonicClock::new());
    assert!(
        wait_for(&scanner, |_| true, Duration::from_secs(1)),
        "scanner published"
    );
    // The scanner keeps scanning, so the stall window stays small relative
    // to a generous now value only when scans are actually happening.
    std::thread::sleep(Duration::from_millis(20));
    assert!(scanner.stalled_for(0) == 0, "saturating: now before last scan");
}
