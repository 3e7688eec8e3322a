//! Engine-level behavior: tick composition, touch arbitration, calibration
//! hand-back, failure policy, and build validation.

use std::time::Duration;

use fader_core::mocks::{RecordingReporter, RecordingStatus, ScriptedBank};
use fader_core::{
    CalibrationCfg, FaderEngine, MoveStatus, TickOutcome, Timeouts, TouchSnapshot, Tuning,
    build_engine,
};
use fader_traits::clock::test_clock::TestClock;
use fader_traits::{ChannelStatus, NUM_CHANNELS};
use rstest::rstest;

type TestEngine = FaderEngine<ScriptedBank, RecordingReporter, RecordingStatus>;

/// Engine plus live handles to its sinks (the recording mocks share state
/// with their clones).
fn engine_with(
    hw: ScriptedBank,
    clock: &TestClock,
) -> (TestEngine, RecordingReporter, RecordingStatus) {
    let reporter = RecordingReporter::default();
    let status = RecordingStatus::default();
    let engine = build_engine(
        hw,
        reporter.clone(),
        status.clone(),
        Tuning::default(),
        Timeouts::default(),
        CalibrationCfg {
            plateau_count: 2,
            timeout_ms: 50,
            settle_ms: 10,
            ..CalibrationCfg::default()
        },
        Some(Box::new(clock.clone())),
    )
    .expect("engine builds");
    (engine, reporter, status)
}

/// Tick with the clock advanced `ms` first.
fn tick_after(
    engine: &mut TestEngine,
    clock: &TestClock,
    ms: u64,
    touch: TouchSnapshot,
) -> TickOutcome {
    clock.advance(Duration::from_millis(ms));
    engine.tick(touch).expect("tick ok")
}

#[test]
fn setpoints_clamp_and_ignore_unknown_channels() {
    let clock = TestClock::new();
    let (mut engine, _, _) = engine_with(ScriptedBank::holding(10), &clock);
    engine.set_setpoint(0, 150);
    engine.set_setpoint(1, -20);
    engine.set_setpoint(2, 73);
    engine.set_setpoint(NUM_CHANNELS, 50); // silently ignored
    assert_eq!(engine.channel(0).unwrap().setpoint, 100);
    assert_eq!(engine.channel(1).unwrap().setpoint, 0);
    assert_eq!(engine.channel(2).unwrap().setpoint, 73);
}

#[test]
fn idle_tick_does_nothing() {
    let clock = TestClock::new();
    let (mut engine, reporter, status) = engine_with(ScriptedBank::holding(10), &clock);
    let out = tick_after(&mut engine, &clock, 10, TouchSnapshot::default());
    assert!(matches!(out, TickOutcome::Idle));
    assert!(engine.hardware_mut().commands.is_empty());
    assert!(reporter.reports().is_empty());
    assert!(status.events().is_empty());
}

#[test]
fn touched_channel_tracks_hand_and_release_has_nothing_to_chase() {
    let clock = TestClock::new();
    let (mut engine, reporter, _) = engine_with(ScriptedBank::holding(127), &clock);
    engine.set_setpoint(0, 90);

    let mut touch = TouchSnapshot::default();
    touch.set(0, true);
    let out = tick_after(&mut engine, &clock, 10, touch);
    assert!(matches!(out, TickOutcome::Idle));

    // The bridge reported the live position and resynced the setpoint...
    assert_eq!(engine.channel(0).unwrap().setpoint, 49);
    assert_eq!(reporter.reports(), vec![(0, 49, false)]);
    // ...and no motor was driven while touched.
    assert!(engine.hardware_mut().commands.is_empty());

    // Release and converge: position already equals setpoint, so the pass
    // completes without ever energizing the motor.
    engine.request_move_pass();
    let out = tick_after(&mut engine, &clock, 10, TouchSnapshot::default());
    assert!(matches!(out, TickOutcome::Moving(MoveStatus::Converged)));
    assert!(!engine.hardware_mut().drove_motor(0));
}

#[test]
fn move_pass_times_out_and_retries_through_the_tick_path() {
    let clock = TestClock::new();
    let (mut engine, _, status) = engine_with(ScriptedBank::holding(10), &clock);
    engine.set_setpoint(5, 80);
    engine.request_move_pass();

    // Stalled channel: tick until the pass times out.
    let mut saw_timeout = false;
    for _ in 0..30 {
        if let TickOutcome::Moving(MoveStatus::TimedOut) =
            tick_after(&mut engine, &clock, 100, TouchSnapshot::default())
        {
            saw_timeout = true;
            break;
        }
    }
    assert!(saw_timeout);
    assert!(engine.retry_pending());
    assert_eq!(engine.channel(5).unwrap().consecutive_failures, 1);
    assert_eq!(status.events(), vec![(5, ChannelStatus::MoveTimeout)]);

    // The retry fires on its own once the interval elapses.
    clock.advance(Duration::from_millis(1000));
    let out = engine.tick(TouchSnapshot::default()).expect("tick ok");
    assert!(matches!(out, TickOutcome::Moving(MoveStatus::InProgress)));
    assert!(!engine.retry_pending());
}

#[test]
fn calibration_suspends_manual_tracking_and_hands_back_a_pass() {
    let clock = TestClock::new();
    let (mut engine, reporter, status) = engine_with(ScriptedBank::holding(10), &clock);
    assert!(engine.begin_calibration());
    assert!(!engine.begin_calibration(), "second session is refused");
    assert!(engine.calibrating());

    // Keep a finger on channel 0 for the whole session.
    let mut touch = TouchSnapshot::default();
    touch.set(0, true);

    let mut report = None;
    for _ in 0..2000 {
        match tick_after(&mut engine, &clock, 10, touch) {
            TickOutcome::Calibrating => continue,
            TickOutcome::CalibrationComplete(r) => {
                report = Some(r);
                break;
            }
            other => panic!("unexpected outcome during calibration: {other:?}"),
        }
    }
    let report = report.expect("calibration completed");
    assert_eq!(report.outcomes.len(), NUM_CHANNELS);
    assert!(!engine.calibrating());

    // Manual tracking stayed suspended: the touched channel never reported.
    assert!(reporter.reports().is_empty());
    // Every channel announced both calibration phases.
    for idx in 0..NUM_CHANNELS {
        let events = status.events_for(idx);
        assert!(events.contains(&ChannelStatus::CalibratingMax));
        assert!(events.contains(&ChannelStatus::CalibratingMin));
    }
    // A convergence pass back to the restored setpoints is already armed.
    assert!(engine.move_in_progress());
    let out = tick_after(&mut engine, &clock, 10, TouchSnapshot::default());
    assert!(matches!(out, TickOutcome::Moving(_)));
}

#[test]
fn failure_policy_is_explicit_and_disables_only_over_threshold() {
    let clock = TestClock::new();
    let (mut engine, _, status) = engine_with(ScriptedBank::holding(10), &clock);
    engine.set_setpoint(3, 80);
    engine.request_move_pass();

    // First pass times out, automatic retry times out too: two failures.
    let mut timeouts_seen = 0;
    for _ in 0..100 {
        match tick_after(&mut engine, &clock, 100, TouchSnapshot::default()) {
            TickOutcome::Moving(MoveStatus::TimedOut) => {
                timeouts_seen += 1;
                if timeouts_seen == 2 {
                    break;
                }
            }
            _ => continue,
        }
    }
    assert_eq!(timeouts_seen, 2);
    assert_eq!(engine.channel(3).unwrap().consecutive_failures, 2);
    // Two timeouts alone never disabled anything.
    assert!(engine.channel(3).unwrap().motor_enabled);

    // The administrative escalation is what flips the switch.
    assert_eq!(engine.apply_failure_policy(3), 0, "below threshold");
    assert_eq!(engine.apply_failure_policy(2), 1);
    assert!(!engine.channel(3).unwrap().motor_enabled);
    assert!(status.events_for(3).contains(&ChannelStatus::Failed));

    // A disabled channel no longer blocks convergence.
    engine.request_move_pass();
    let out = tick_after(&mut engine, &clock, 10, TouchSnapshot::default());
    assert!(matches!(out, TickOutcome::Moving(MoveStatus::Converged)));

    engine.enable_channel(3);
    assert!(engine.channel(3).unwrap().motor_enabled);
    assert_eq!(engine.channel(3).unwrap().consecutive_failures, 0);
}

#[test]
fn apply_calibration_skips_implausible_rows() {
    let clock = TestClock::new();
    let (mut engine, _, _) = engine_with(ScriptedBank::holding(10), &clock);
    engine.apply_calibration(&[
        fader_config::ChannelCalibration {
            channel: 0,
            raw_min: 12,
            raw_max: 240,
        },
        // Narrow span: must be ignored.
        fader_config::ChannelCalibration {
            channel: 1,
            raw_min: 100,
            raw_max: 150,
        },
        // Unknown channel: must be ignored.
        fader_config::ChannelCalibration {
            channel: NUM_CHANNELS,
            raw_min: 10,
            raw_max: 245,
        },
    ]);
    assert_eq!(engine.channel(0).unwrap().calib_min, 12);
    assert_eq!(engine.channel(0).unwrap().calib_max, 240);
    assert_eq!(engine.channel(1).unwrap().calib_min, 10);
    assert_eq!(engine.channel(1).unwrap().calib_max, 245);

    let table = engine.calibration_table();
    assert_eq!(table.len(), NUM_CHANNELS);
    assert_eq!(table[0].raw_min, 12);
}

#[rstest]
#[case(Tuning { min_duty: 0, ..Tuning::default() })]
#[case(Tuning { min_duty: 120, max_duty: 60, ..Tuning::default() })]
#[case(Tuning { calibration_duty: 0, ..Tuning::default() })]
#[case(Tuning { target_tolerance: 101, ..Tuning::default() })]
#[case(Tuning { report_tolerance: 0, ..Tuning::default() })]
fn build_rejects_invalid_tuning(#[case] tuning: Tuning) {
    let result = build_engine(
        ScriptedBank::holding(10),
        RecordingReporter::default(),
        RecordingStatus::default(),
        tuning,
        Timeouts::default(),
        CalibrationCfg::default(),
        None,
    );
    assert!(result.is_err());
}

#[rstest]
#[case(Timeouts { move_timeout_ms: 0, retry_interval_ms: 1000 })]
#[case(Timeouts { move_timeout_ms: 2000, retry_interval_ms: 0 })]
fn build_rejects_invalid_timeouts(#[case] timeouts: Timeouts) {
    let result = build_engine(
        ScriptedBank::holding(10),
        RecordingReporter::default(),
        RecordingStatus::default(),
        Tuning::default(),
        timeouts,
        CalibrationCfg::default(),
        None,
    );
    assert!(result.is_err());
}

#[rstest]
#[case(CalibrationCfg { plateau_threshold: 0, ..CalibrationCfg::default() })]
#[case(CalibrationCfg { plateau_count: 0, ..CalibrationCfg::default() })]
#[case(CalibrationCfg { timeout_ms: 0, ..CalibrationCfg::default() })]
fn build_rejects_invalid_calibration(#[case] cfg: CalibrationCfg) {
    let result = build_engine(
        ScriptedBank::holding(10),
        RecordingReporter::default(),
        RecordingStatus::default(),
        Tuning::default(),
        Timeouts::default(),
        cfg,
        None,
    );
    assert!(result.is_err());
}

#[test]
fn stop_all_is_best_effort_and_total() {
    let clock = TestClock::new();
    let (mut engine, _, _) = engine_with(ScriptedBank::holding(10), &clock);
    engine.stop_all();
    let commands = engine.hardware_mut().commands.clone();
    assert_eq!(commands.len(), NUM_CHANNELS);
    assert!(commands.iter().all(|(_, d, duty)| {
        *d == fader_traits::Direction::Stopped && *duty == 0
    }));
}
