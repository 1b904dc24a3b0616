use std::time::Duration;

use crate::device::constants::{LINK_CHECK_DELAY, POLL_DELAY, SCAN_TIMEOUT};

/// Runtime settings of a session. Nothing here is persisted, the defaults can be overridden on
/// the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Only connect to peripherals whose advertised name contains this text
    pub name_filter: Option<String>,
    pub scan_timeout: Duration,
    pub poll_interval: Duration,
    pub link_check_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            name_filter: None,
            scan_timeout: Duration::from_millis(SCAN_TIMEOUT),
            poll_interval: Duration::from_millis(POLL_DELAY),
            link_check_interval: Duration::from_millis(LINK_CHECK_DELAY),
        }
    }
}
