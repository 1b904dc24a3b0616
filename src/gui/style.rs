use iced::{Background, Border, Color, Shadow, Theme};
use iced::widget::button::{StyleSheet, Appearance};

use crate::state::{LampColor, LampView};

fn lamp_color(color: LampColor) -> Color {
    match color {
        LampColor::Red => Color::from_rgb8(0xe5, 0x39, 0x35),
        LampColor::Yellow => Color::from_rgb8(0xfd, 0xd8, 0x35),
        LampColor::Green => Color::from_rgb8(0x43, 0xa0, 0x47),
    }
}

/// A round lamp; lit lamps are filled with their color, dark lamps only show the outline.
pub struct LampStyleSheet {
    pub lamp: LampView,
}

impl StyleSheet for LampStyleSheet {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> Appearance {
        let color = lamp_color(self.lamp.color);

        Appearance {
            shadow_offset: Default::default(),
            background: Some(Background::Color(if self.lamp.on { color } else { Color::from_rgb8(0x30, 0x30, 0x30) })),
            text_color: if self.lamp.on { Color::BLACK } else { Color::WHITE },
            border: Border {
                color,
                width: 3.0,
                radius: 32.0.into(),
            },
            shadow: Shadow::default(),
        }
    }
}
