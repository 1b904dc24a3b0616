//! Parser for the textual direct LED command grammar.
//!
//! Three forms are understood, tried in this order:
//!
//! 1. a named color: `rot`, `gelb`, `gruen` (or `grün`), `aus`
//! 2. indexed assignments: `0:1023,2:0`
//! 3. a bare triple: `1023 0 0`, `1023,0,0` or `1023;0;0`
//!
//! Anything else is [`DirectCommand::Unrecognized`] and leaves the LED state alone.

use crate::device::constants::LED_MAX;
use crate::state::LedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedColor {
    Rot,
    Gelb,
    Gruen,
    Aus,
}

impl NamedColor {
    fn parse(token: &str) -> Option<NamedColor> {
        match token.to_lowercase().as_str() {
            "rot" => Some(NamedColor::Rot),
            "gelb" => Some(NamedColor::Gelb),
            "gruen" | "grün" => Some(NamedColor::Gruen),
            "aus" => Some(NamedColor::Aus),
            _ => None,
        }
    }

    pub fn leds(&self) -> LedState {
        match self {
            NamedColor::Rot => LedState([LED_MAX, 0, 0]),
            NamedColor::Gelb => LedState([0, LED_MAX, 0]),
            NamedColor::Gruen => LedState([0, 0, LED_MAX]),
            NamedColor::Aus => LedState([0, 0, 0]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectCommand {
    NamedColor(NamedColor),
    IndexedPairs(Vec<(usize, u16)>),
    Triple([u16; 3]),
    Unrecognized,
}

impl DirectCommand {
    pub fn parse(input: &str) -> DirectCommand {
        let input = input.trim();
        if input.is_empty() {
            return DirectCommand::Unrecognized;
        }

        if let Some(color) = NamedColor::parse(input) {
            return DirectCommand::NamedColor(color);
        }

        if let Some(pairs) = parse_indexed_pairs(input) {
            return DirectCommand::IndexedPairs(pairs);
        }

        if let Some(triple) = parse_triple(input) {
            return DirectCommand::Triple(triple);
        }

        DirectCommand::Unrecognized
    }

    /// The LED state after applying this command on top of `current`, or `None` if the command
    /// was not understood.
    pub fn apply(&self, current: LedState) -> Option<LedState> {
        match self {
            DirectCommand::NamedColor(color) => Some(color.leds()),
            DirectCommand::IndexedPairs(pairs) => Some(
                pairs.iter().fold(current, |leds, (index, value)| leds.with(*index, *value))
            ),
            DirectCommand::Triple(values) => Some(LedState(*values)),
            DirectCommand::Unrecognized => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, DirectCommand::Unrecognized)
    }
}

// "0:1023, 2:0"; every pair must be valid, otherwise the whole command is rejected
fn parse_indexed_pairs(input: &str) -> Option<Vec<(usize, u16)>> {
    if !input.contains(':') {
        return None;
    }

    input
        .split(',')
        .map(|pair| {
            let (index, value) = pair.split_once(':')?;
            let index = index.trim().parse::<usize>().ok().filter(|index| *index < 3)?;
            let value = value.trim().parse::<u16>().ok()?;
            Some((index, value))
        })
        .collect()
}

fn parse_triple(input: &str) -> Option<[u16; 3]> {
    let values = input
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u16>().ok())
        .collect::<Option<Vec<u16>>>()?;

    match values.as_slice() {
        [a, b, c] => Some([*a, *b, *c]),
        _ => None,
    }
}
