use std::time::Duration;
use clap::Args;

use crate::config::types::SessionConfig;

/// Command line options shared by the GUI and the CLI.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Only connect to a light whose advertised name contains this text
    #[arg(long)]
    pub name: Option<String>,

    /// Give up scanning for the light after this long (e.g. "10s")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub scan_timeout: Duration,

    /// How often to read the device state when it does not send notifications
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub poll_interval: Duration,
}

impl SessionArgs {
    pub fn into_config(self) -> SessionConfig {
        SessionConfig {
            name_filter: self.name.filter(|name| !name.is_empty()),
            scan_timeout: self.scan_timeout,
            poll_interval: self.poll_interval.max(Duration::from_millis(100)),
            ..SessionConfig::default()
        }
    }
}
