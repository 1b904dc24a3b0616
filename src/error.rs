use std::io;
use thiserror::Error;
use uuid::Uuid;
use btleplug;
use iced;

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (iced): {source}")]
    Iced { #[from] source: iced::Error },

    #[error("Failed to start application (logging): {source}")]
    Logging { #[from] source: LoggingError },
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to open log file: {source}")]
    LogFile { #[from] source: io::Error },

    #[error("Failed to install logger: {source}")]
    SetLogger { #[from] source: log::SetLoggerError },
}

/// Which stage of talking to the light an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Choosing or connecting to a peripheral failed
    Connection,
    /// The light service or one of its mandatory characteristics is missing
    Discovery,
    /// A read, write or subscribe was rejected
    Io,
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No bluetooth adapter available")]
    NoAdapter,

    #[error("No device advertising the light service was found")]
    NoDeviceSelected,

    #[error("Failed to connect to the device: {source}")]
    Connect { source: btleplug::Error },

    #[error("The device does not offer the light service {uuid}")]
    MissingService { uuid: Uuid },

    #[error("A required bluetooth characteristic is not available: {name}")]
    MissingCharacteristic { name: &'static str },

    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::NoAdapter | DeviceError::NoDeviceSelected | DeviceError::Connect { .. } => ErrorKind::Connection,
            DeviceError::MissingService { .. } | DeviceError::MissingCharacteristic { .. } => ErrorKind::Discovery,
            DeviceError::Btle { .. } => ErrorKind::Io,
        }
    }

    pub fn is_permission_error(&self) -> bool {
        match self {
            DeviceError::Btle { source } | DeviceError::Connect { source } => matches!(source, btleplug::Error::PermissionDenied),
            _ => false,
        }
    }
}
