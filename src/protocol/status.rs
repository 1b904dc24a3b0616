use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::direct::DirectCommand;
use crate::state::LedState;

/// A (partial) report of the device state. Absent fields mean "unchanged".
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub led: Option<LedState>,
}

impl DeviceStatus {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none() && self.speed.is_none() && self.led.is_none()
    }
}

/// A status payload after decoding, before it is merged with the current LED state.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusPayload {
    Json {
        status: DeviceStatus,
        raw: Value,
    },
    Direct(DirectCommand),
}

impl StatusPayload {
    /// Resolve the payload against the current LED state. Indexed direct commands only replace
    /// some lamps, so the current state is needed to produce a full triple.
    pub fn resolve(&self, current: LedState) -> DeviceStatus {
        match self {
            StatusPayload::Json { status, .. } => status.clone(),
            StatusPayload::Direct(command) => DeviceStatus {
                led: command.apply(current),
                ..DeviceStatus::default()
            },
        }
    }

    pub fn raw_json(&self) -> Option<&Value> {
        match self {
            StatusPayload::Json { raw, .. } => Some(raw),
            StatusPayload::Direct(_) => None,
        }
    }
}

/// Decode a payload received from the status characteristic (or read from the led
/// characteristic). This never fails, unknown payloads decode to an unrecognized direct command.
pub fn decode_status(payload: &[u8]) -> StatusPayload {
    let text = String::from_utf8_lossy(payload);

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(object)) => {
            let status = status_from_object(&object);
            debug!("Status JSON {}", Value::Object(object.clone()));
            StatusPayload::Json { status, raw: Value::Object(object) }
        },
        _ => StatusPayload::Direct(DirectCommand::parse(&text)),
    }
}

fn status_from_object(object: &Map<String, Value>) -> DeviceStatus {
    let mode = object.get("mode")
        .and_then(Value::as_str)
        .map(str::to_string);

    let speed = object.get("speed")
        .and_then(coerce_number)
        .and_then(|speed| u32::try_from(speed).ok());

    let led = object.get("led")
        .and_then(Value::as_array)
        .filter(|values| values.len() == 3)
        .and_then(|values| {
            let mut leds = [0u16; 3];
            for (slot, value) in leds.iter_mut().zip(values) {
                *slot = coerce_number(value).and_then(|value| u16::try_from(value).ok())?;
            }
            Some(LedState(leds))
        });

    DeviceStatus { mode, speed, led }
}

// numbers and numeric strings, as long as they are non-negative whole numbers
fn coerce_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number.as_f64()
                .filter(|float| float.is_finite() && *float >= 0.0 && float.fract() == 0.0)
                .map(|float| float as u64)
        }),
        Value::String(string) => string.trim().parse::<u64>().ok(),
        _ => None,
    }
}
