//! Local animation preview of the device programs.
//!
//! Only used for display; the frames are never written into the device snapshot.

use std::time::Duration;

use crate::device::constants::{LED_MAX, SPEED_MAX};
use crate::protocol::direct::DirectCommand;
use crate::state::LedState;

const FADE_STEPS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub mode: String,
    pub tick: u64,
}

impl Preview {
    pub fn new(mode: &str) -> Preview {
        Preview { mode: mode.to_string(), tick: 0 }
    }

    pub fn advance(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    pub fn frame(&self) -> LedState {
        preview_frame(&self.mode, self.tick)
    }
}

pub fn preview_frame(mode: &str, tick: u64) -> LedState {
    match mode {
        "lauflicht" => LedState::OFF.with((tick % 3) as usize, LED_MAX),
        "blinken" => if tick % 2 == 0 { LedState([LED_MAX; 3]) } else { LedState::OFF },
        "fading" => {
            let step = tick % (FADE_STEPS * 2);
            let step = if step <= FADE_STEPS { step } else { FADE_STEPS * 2 - step };
            let level = (u64::from(LED_MAX) * step / FADE_STEPS) as u16;
            LedState([level; 3])
        },
        // named programs like "rot" show their color
        other => DirectCommand::parse(other).apply(LedState::OFF).unwrap_or(LedState::OFF),
    }
}

/// Faster programs animate faster.
pub fn preview_interval(speed: u32) -> Duration {
    let speed = u64::from(speed.min(SPEED_MAX));
    Duration::from_millis(1000 - speed * 900 / u64::from(SPEED_MAX))
}
