//! Command implementations against the simulated fader bank.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::{Result, WrapErr};
use fader_config::Config;
use fader_core::{
    CalibrationCfg, FaderEngine, MoveStatus, TickOutcome, Timeouts, TouchScanner, TouchSnapshot,
    Tuning, build_engine, to_normalized,
};
use fader_hardware::{SharedTouch, SimulatedBank};
use fader_traits::clock::MonotonicClock;
use fader_traits::{ChannelStatus, NUM_CHANNELS, PositionReporter, StatusSink};

/// Operator-facing reports go to the log here; the firmware proper hands
/// them to the network layer.
pub struct LogReporter;

impl PositionReporter for LogReporter {
    fn report(&mut self, channel: usize, value: u8, force: bool) {
        tracing::info!(channel, value, force, "position report");
    }
}

/// Visual feedback hints go to the log here; the firmware proper hands them
/// to the LED renderer.
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn status(&mut self, channel: usize, status: ChannelStatus) {
        tracing::info!(channel, ?status, "channel status");
    }
}

type SimEngine = FaderEngine<SimulatedBank, LogReporter, LogStatus>;

/// Loop guard: no command should ever need this many ticks, but a logic bug
/// must not turn into a hung process.
const MAX_TICKS: usize = 200_000;

fn build(config: &Config) -> Result<SimEngine> {
    let mut engine = build_engine(
        SimulatedBank::new(),
        LogReporter,
        LogStatus,
        Tuning::from(&config.tuning),
        Timeouts::from(&config.timeouts),
        CalibrationCfg::from(&config.calibration),
        None,
    )
    .wrap_err("build engine")?;
    engine.apply_calibration(&config.channels);
    Ok(engine)
}

fn channel_rows(engine: &mut SimEngine) -> Vec<serde_json::Value> {
    let calib: Vec<(i32, i32, u8)> = engine
        .bank()
        .iter()
        .map(|ch| (ch.calib_min, ch.calib_max, ch.setpoint))
        .collect();
    calib
        .into_iter()
        .enumerate()
        .map(|(i, (calib_min, calib_max, setpoint))| {
            let raw = engine.hardware_mut().position(i).unwrap_or(0);
            serde_json::json!({
                "channel": i,
                "raw": raw,
                "position": to_normalized(raw, calib_min, calib_max),
                "setpoint": setpoint,
            })
        })
        .collect()
}

pub fn cmd_move(config: &Config, channel: Option<usize>, value: i32, json: bool) -> Result<()> {
    let mut engine = build(config)?;
    match channel {
        Some(ch) => {
            eyre::ensure!(ch < NUM_CHANNELS, "channel {ch} out of range (0..{NUM_CHANNELS})");
            engine.set_setpoint(ch, value);
        }
        None => {
            for ch in 0..NUM_CHANNELS {
                engine.set_setpoint(ch, value);
            }
        }
    }
    engine.request_move_pass();
    tracing::info!(?channel, value, "move pass started");

    let mut outcome = None;
    for _ in 0..MAX_TICKS {
        match engine.tick(TouchSnapshot::default())? {
            TickOutcome::Moving(MoveStatus::Converged) => {
                outcome = Some("converged");
                break;
            }
            TickOutcome::Moving(MoveStatus::TimedOut) => {
                outcome = Some("timed-out");
                break;
            }
            _ => std::thread::sleep(Duration::from_millis(1)),
        }
    }
    let outcome = outcome.ok_or_else(|| eyre::eyre!("move pass never finished"))?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": outcome,
                "channels": channel_rows(&mut engine),
            })
        );
    } else {
        println!("move {outcome}");
    }
    engine.stop_all();
    if outcome == "timed-out" {
        eyre::bail!("move pass timed out");
    }
    Ok(())
}

pub fn cmd_calibrate(config: &Config, save: Option<&Path>, json: bool) -> Result<()> {
    let mut engine = build(config)?;
    engine.begin_calibration();

    let mut report = None;
    for _ in 0..MAX_TICKS {
        match engine.tick(TouchSnapshot::default())? {
            TickOutcome::CalibrationComplete(r) => {
                report = Some(r);
                break;
            }
            _ => std::thread::sleep(Duration::from_millis(1)),
        }
    }
    let report = report.ok_or_else(|| eyre::eyre!("calibration never finished"))?;

    // The session armed a pass back to the pre-calibration setpoints; run it
    // out so the hardware is left where the operator had it.
    for _ in 0..MAX_TICKS {
        match engine.tick(TouchSnapshot::default())? {
            TickOutcome::Moving(MoveStatus::Converged) | TickOutcome::Moving(MoveStatus::TimedOut) => {
                break;
            }
            _ => std::thread::sleep(Duration::from_millis(1)),
        }
    }

    let table = engine.calibration_table();
    if let Some(path) = save {
        fader_config::save_calibration_csv(path, &table)
            .wrap_err_with(|| format!("save calibration to {}", path.display()))?;
        tracing::info!(path = %path.display(), "calibration table saved");
    }

    if json {
        let rows: Vec<serde_json::Value> = table
            .iter()
            .zip(report.outcomes.iter())
            .map(|(entry, out)| {
                serde_json::json!({
                    "channel": entry.channel,
                    "raw_min": entry.raw_min,
                    "raw_max": entry.raw_max,
                    "failed": out.failed(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "failed": report.failed_count(),
                "channels": rows,
            })
        );
    } else {
        for (entry, out) in table.iter().zip(report.outcomes.iter()) {
            let verdict = if out.failed() { "FAILED" } else { "ok" };
            println!(
                "channel {}: min={} max={} [{}]",
                entry.channel, entry.raw_min, entry.raw_max, verdict
            );
        }
    }
    engine.stop_all();
    Ok(())
}

pub fn cmd_run(config: &Config, tick_hz: u32, duration_ms: Option<u64>) -> Result<()> {
    let mut engine = build(config)?;

    let touch = SharedTouch::new();
    let scanner = TouchScanner::spawn(
        touch.clone(),
        config.touch.scan_rate_hz,
        MonotonicClock::new(),
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::Relaxed);
    })
    .wrap_err("install signal handler")?;

    let period = Duration::from_micros((1_000_000 / u64::from(tick_hz.max(1))).max(1));
    let start = Instant::now();
    let mut snapshot = TouchSnapshot::default();
    tracing::info!(tick_hz, "engine loop started");

    while running.load(Ordering::Relaxed) {
        if let Some(limit) = duration_ms {
            if start.elapsed() >= Duration::from_millis(limit) {
                break;
            }
        }
        // One snapshot per tick; hold the previous one when the scanner has
        // nothing fresher.
        if let Some(next) = scanner.latest() {
            snapshot = next;
        }
        engine.tick(snapshot)?;
        std::thread::sleep(period);
    }

    engine.stop_all();
    tracing::info!("engine loop stopped, motors released");
    Ok(())
}
