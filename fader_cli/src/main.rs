mod cli;
mod run;

use clap::Parser;
use cli::{Args, Command};
use eyre::{Result, WrapErr};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    let _guard = init_tracing(&config.logging);

    match args.command {
        Command::Move { channel, value } => run::cmd_move(&config, channel, value, args.json),
        Command::Calibrate { save } => run::cmd_calibrate(&config, save.as_deref(), args.json),
        Command::Run {
            tick_hz,
            duration_ms,
        } => run::cmd_run(&config, tick_hz, duration_ms),
    }
}

fn load_config(path: Option<&Path>) -> Result<fader_config::Config> {
    let Some(path) = path else {
        return Ok(fader_config::Config::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let config = fader_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    config.validate().wrap_err("invalid config")?;
    Ok(config)
}

/// Stderr logging by default; JSON lines to a file when `[logging] file` is
/// set. The returned guard must stay alive so the worker flushes on exit.
fn init_tracing(logging: &fader_config::Logging) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_deref().unwrap_or("info")));

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| "faderwing.log".into());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .json()
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}
