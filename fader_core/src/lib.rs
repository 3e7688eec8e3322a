#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Fader position control and calibration engine (hardware-agnostic).
//!
//! Ten motorized faders track remotely commanded setpoints, report their
//! position when a hand moves them, and learn their own mechanical travel
//! range. All hardware access goes through the `fader_traits` seams.
//!
//! ## Architecture
//!
//! - **Mapping**: raw wiper sample → normalized 0-100 (`position`)
//! - **Profile**: error → direction + duty with a three-zone taper (`velocity`)
//! - **Moves**: tick-driven convergence passes with timeout and a single
//!   automatic retry (`coordinator`)
//! - **Manual**: touched channels resync their setpoint to the hand and
//!   report outward (`manual`)
//! - **Calibration**: plateau-detecting endpoint discovery with range
//!   sanity checks (`calibration`)
//! - **Touch**: snapshot scanner bridging the driver context into the
//!   cooperative tick (`touch`)
//! - **Engine**: composition and the public operations (`engine`)
//!
//! Everything is integer arithmetic on i32/i64; no floating point in the
//! control path.

pub mod calibration;
pub mod channel;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod hw_error;
pub mod manual;
pub mod mocks;
pub mod position;
pub mod touch;
pub mod tuning;
pub mod velocity;

pub use calibration::{CalibrationReport, CalibrationSession, CalibrationStatus, ChannelOutcome};
pub use channel::{
    ChannelBank, ChannelState, DEFAULT_CALIB_MAX, DEFAULT_CALIB_MIN, FULL_SCALE, MIN_SPAN,
};
pub use coordinator::{MoveCoordinator, MoveStatus};
pub use engine::{FaderEngine, TickOutcome, build_engine};
pub use error::{BuildError, FaderError, Result};
pub use fader_traits::NUM_CHANNELS;
pub use position::{EDGE_MARGIN, to_normalized};
pub use touch::{TouchScanner, TouchSnapshot};
pub use tuning::{CalibrationCfg, Timeouts, Tuning};
pub use velocity::{DriveCommand, drive_command};
