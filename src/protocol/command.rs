use uuid::Uuid;

use crate::device::constants::{make_led_uuid, make_mode_uuid, make_speed_uuid};
use crate::state::LedState;

/// The writable characteristics of the light service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicKind {
    Mode,
    Speed,
    Led,
}

impl CharacteristicKind {
    pub fn uuid(&self) -> Uuid {
        match self {
            CharacteristicKind::Mode => make_mode_uuid(),
            CharacteristicKind::Speed => make_speed_uuid(),
            CharacteristicKind::Led => make_led_uuid(),
        }
    }
}

impl std::fmt::Display for CharacteristicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            CharacteristicKind::Mode => "MODE",
            CharacteristicKind::Speed => "SPEED",
            CharacteristicKind::Led => "DIRECT",
        };

        write!(f, "{}", result)
    }
}

/// Something the user wants the light to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Mode(String),
    Speed(u32),
    Direct(String),
}

impl Command {
    /// Direct command that flips lamp `index` of `current` between off and full intensity.
    pub fn toggle(current: LedState, index: usize) -> Option<Command> {
        let value = current.toggled(index).get(index)?;
        Some(Command::Direct(format!("{}:{}", index, value)))
    }

    pub fn characteristic(&self) -> CharacteristicKind {
        match self {
            Command::Mode(_) => CharacteristicKind::Mode,
            Command::Speed(_) => CharacteristicKind::Speed,
            Command::Direct(_) => CharacteristicKind::Led,
        }
    }

    /// The text that is written to the characteristic.
    pub fn text(&self) -> String {
        match self {
            Command::Mode(mode) => mode.clone(),
            Command::Speed(speed) => speed.to_string(),
            Command::Direct(command) => command.clone(),
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        self.text().into_bytes()
    }
}
