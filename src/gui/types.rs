use iced::Event;

use crate::device::types::DeviceEvent;

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    DeviceEvent(DeviceEvent),
    CommandSent(bool), // false if the session is gone
    Connect,
    Disconnect,
    Refresh,
    SelectMode(String),
    SpeedChange(u32),
    SpeedRelease,
    DirectInput(String),
    SendDirect,
    ToggleLamp(usize),
    TogglePreview,
    PreviewTick,
}
