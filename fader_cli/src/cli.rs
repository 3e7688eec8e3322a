use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Control and calibration front-end for the motorized fader wing,
/// running against the simulated hardware bank.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON results on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive channels to a setpoint and wait for convergence
    Move {
        /// Target channel; all channels when omitted
        #[arg(short = 'n', long)]
        channel: Option<usize>,

        /// Normalized setpoint (0-100)
        value: i32,
    },
    /// Run the endpoint calibration session, then return to the prior setpoints
    Calibrate {
        /// Write the learned ranges to a calibration CSV
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Run the engine loop until interrupted
    Run {
        /// Control tick rate
        #[arg(long, default_value_t = 200)]
        tick_hz: u32,

        /// Stop after this many milliseconds (runs until Ctrl-C when omitted)
        #[arg(long)]
        duration_ms: Option<u64>,
    },
}
