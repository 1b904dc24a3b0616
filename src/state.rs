use serde::{Deserialize, Serialize};

use crate::device::constants::LED_MAX;
use crate::protocol::status::DeviceStatus;

/// Intensities of the three lamps, index 0/1/2 = red/yellow/green.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedState(pub [u16; 3]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LampColor {
    Red,
    Yellow,
    Green,
}

impl LampColor {
    pub const ALL: [LampColor; 3] = [LampColor::Red, LampColor::Yellow, LampColor::Green];

    pub fn class(&self) -> &'static str {
        match self {
            LampColor::Red => "red",
            LampColor::Yellow => "yellow",
            LampColor::Green => "green",
        }
    }
}

impl std::fmt::Display for LampColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            LampColor::Red => "Red",
            LampColor::Yellow => "Yellow",
            LampColor::Green => "Green",
        };

        write!(f, "{}", result)
    }
}

/// What the user interface shows for a single lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LampView {
    pub index: usize,
    pub color: LampColor,
    pub on: bool,
    pub value: u16,
}

impl LampView {
    /// e.g. "lamp red on"
    pub fn class(&self) -> String {
        format!("lamp {} {}", self.color.class(), if self.on { "on" } else { "off" })
    }
}

impl LedState {
    pub const OFF: LedState = LedState([0, 0, 0]);

    pub fn get(&self, index: usize) -> Option<u16> {
        self.0.get(index).copied()
    }

    /// Replace the value at `index`; out of range indices leave the state as is.
    pub fn with(mut self, index: usize, value: u16) -> LedState {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = value;
        }
        self
    }

    /// The state after flipping lamp `index` between off and full intensity.
    pub fn toggled(self, index: usize) -> LedState {
        match self.get(index) {
            Some(0) => self.with(index, LED_MAX),
            Some(_) => self.with(index, 0),
            None => self,
        }
    }

    pub fn render(&self) -> [LampView; 3] {
        let mut views = [LampView { index: 0, color: LampColor::Red, on: false, value: 0 }; 3];
        for (index, view) in views.iter_mut().enumerate() {
            let value = self.0[index];
            *view = LampView {
                index,
                color: LampColor::ALL[index],
                on: value > 0,
                value,
            };
        }
        views
    }
}

impl std::fmt::Display for LedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.0[0], self.0[1], self.0[2])
    }
}

/// Last known state of the peripheral. Fields the device never reported stay `None`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub mode: Option<String>,
    pub speed: Option<u32>,
    pub leds: LedState,
}

impl DeviceSnapshot {
    /// Merge a (partial) status into the snapshot. Returns true if anything changed.
    pub fn apply(&mut self, status: &DeviceStatus) -> bool {
        let before = self.clone();

        if let Some(mode) = &status.mode {
            self.mode = Some(mode.clone());
        }
        if let Some(speed) = status.speed {
            self.speed = Some(speed);
        }
        if let Some(led) = status.led {
            self.leds = led;
        }

        before != *self
    }
}
