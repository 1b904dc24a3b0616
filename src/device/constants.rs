use uuid::Uuid;

/**
 * How often (milliseconds) to re-read the mode/speed/led characteristics when the peripheral
 * does not offer status notifications.
 */
pub const POLL_DELAY: u64 = 1000;

/**
 * How often (milliseconds) to check if the peripheral is still connected.
 */
pub const LINK_CHECK_DELAY: u64 = 1000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) to scan for a peripheral advertising the light service before giving up.
 */
pub const SCAN_TIMEOUT: u64 = 10000;

/**
 * How often (milliseconds) to look at the list of discovered peripherals while scanning.
 */
pub const SCAN_POLL_DELAY: u64 = 250;

/**
 * The UUID of the Bluetooth BLE service of the light
 */
pub const LIGHT_SERVICE: &str = "12345678-1234-5678-1234-56789abcdef0";

/**
 * Write the name of a program (e.g. "lauflicht") to this characteristic to select it.
 */
pub const MODE_CHARACTERISTIC: &str = "12345678-1234-5678-1234-56789abcdef1";

/**
 * Decimal speed value of the running program.
 */
pub const SPEED_CHARACTERISTIC: &str = "12345678-1234-5678-1234-56789abcdef2";

/**
 * Direct LED commands ("rot", "0:1023,2:0", "1023 0 0").
 */
pub const LED_CHARACTERISTIC: &str = "12345678-1234-5678-1234-56789abcdef3";

/**
 * Status reports (JSON or direct command text). Missing on older firmware.
 */
pub const STATUS_CHARACTERISTIC: &str = "12345678-1234-5678-1234-56789abcdef4";

/**
 * The highest intensity of a single lamp. Toggling a lamp switches between 0 and this value.
 */
pub const LED_MAX: u16 = 1023;

/**
 * Program names known to the firmware. The mode characteristic accepts any text, this list only
 * feeds the buttons of the user interface.
 */
pub const KNOWN_MODES: [&str; 5] = ["stop", "lauflicht", "blinken", "fading", "mode3"];

/**
 * Upper bound of the speed control in the user interface.
 */
pub const SPEED_MAX: u32 = 255;

pub fn make_light_service_uuid() -> Uuid {
    Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef0)
}

pub fn make_mode_uuid() -> Uuid {
    Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef1)
}

pub fn make_speed_uuid() -> Uuid {
    Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef2)
}

pub fn make_led_uuid() -> Uuid {
    Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef3)
}

pub fn make_status_uuid() -> Uuid {
    Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef4)
}
