use futures::channel::mpsc::Sender;
use futures::SinkExt;

use crate::protocol::command::{CharacteristicKind, Command};
use crate::protocol::status::DeviceStatus;
use crate::state::DeviceSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Disconnected,
    Connecting,
    Discovering,
    Ready { name: String },
    Polling { name: String },
    Subscribed { name: String },
}

impl DeviceState {
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceState::Ready { .. } | DeviceState::Polling { .. } | DeviceState::Subscribed { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, DeviceState::Connecting | DeviceState::Discovering)
    }

    /// Text for the connection status line, never empty.
    pub fn label(&self) -> String {
        match self {
            DeviceState::Disconnected => "Not connected".to_string(),
            DeviceState::Connecting => "Connecting…".to_string(),
            DeviceState::Discovering => "Discovering services…".to_string(),
            DeviceState::Ready { name } => format!("Connected: {}", name),
            DeviceState::Polling { name } => format!("Connected: {} (polling)", name),
            DeviceState::Subscribed { name } => format!("Connected: {} (notifications)", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// Pushed by the peripheral through the status characteristic
    Notification,
    /// Read by the poll timer or a manual refresh
    Read,
}

/// A decoded status, regardless of whether it was pushed or pulled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub origin: UpdateOrigin,
    pub status: DeviceStatus,
}

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Connect,
    Disconnect,
    Send(Command),
    ToggleLamp(usize),
    Refresh,
}

/// Used to send commands to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(sender: Sender<SessionCommand>) -> Self {
        SessionHandle { sender }
    }

    /// Returns false if the session has stopped.
    pub async fn send(&mut self, command: SessionCommand) -> bool {
        self.sender.send(command).await.is_ok()
    }
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    SessionStarted(SessionHandle),
    StateChange(DeviceState),
    Snapshot(DeviceSnapshot),
    /// A line for the diagnostic console
    Console(String),
    /// The last status object received as JSON, pretty printed
    RawStatus(String),
    /// A write was rejected by the peripheral; the session keeps running
    WriteFailed(CharacteristicKind),
}
