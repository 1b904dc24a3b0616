use std::env;
use log::LevelFilter;
use crate::config::types::SessionConfig;
use crate::gui::application::run_application;
use crate::error::{AppRunError, LoggingError};

pub mod config;
pub mod device;
pub mod error;
pub mod gui;
pub mod protocol;
pub mod state;

/// Log level from the `AMPEL_LOG_LEVEL` environment variable, or `default`.
pub fn log_level_from_env(default: LevelFilter) -> LevelFilter {
    env::var("AMPEL_LOG_LEVEL")
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(default)
}

pub fn init_logging(level: LevelFilter) -> Result<(), LoggingError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        // btleplug is very chatty on debug
        .level_for("btleplug", level.min(LevelFilter::Info))
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(fern::log_file(log_file)?);
    }

    dispatch.apply()?;
    Ok(())
}

pub fn run(config: SessionConfig) -> Result<(), AppRunError> {
    run_application(config)?;
    Ok(())
}
