//! Firmata protocol constants, including the rover vendor extensions.

// Pin modes
pub const INPUT: u8 = 0x00;
pub const OUTPUT: u8 = 0x01;
pub const ANALOG: u8 = 0x02;
pub const PWM: u8 = 0x03;
pub const SERVO: u8 = 0x04;

/// Analog-mapping sentinel for a pin with no analog channel.
pub const ANALOG_CHANNEL_NONE: u8 = 0x7F;

// Message command bytes (128-255/0x80-0xFF)

/// Send data for a digital port (collection of 8 pins)
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Digital message input range upper bound
pub const DIGITAL_MESSAGE_BOUND: u8 = 0x9F;
/// Send data for an analog pin (or PWM)
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Analog message input range upper bound
pub const ANALOG_MESSAGE_BOUND: u8 = 0xEF;
/// Enable analog input by pin #
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable digital input by port pair
pub const REPORT_DIGITAL: u8 = 0xD0;
/// Set a pin to INPUT/OUTPUT/ANALOG/etc
pub const SET_PIN_MODE: u8 = 0xF4;
/// Report protocol version
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset from MIDI
pub const SYSTEM_RESET: u8 = 0xFF;
/// Start a MIDI sysex message
pub const START_SYSEX: u8 = 0xF0;
/// End a MIDI sysex message
pub const END_SYSEX: u8 = 0xF7;

// Extended command set using sysex (0-127/0x00-0x7F)

/// Set max angle, minPulse, maxPulse, freq
pub const SERVO_CONFIG: u8 = 0x70;
/// String message
pub const STRING_DATA: u8 = 0x71;
/// Send an I2C read/write request
pub const I2C_REQUEST: u8 = 0x76;
/// Reply to an I2C read request
pub const I2C_REPLY: u8 = 0x77;
/// Config I2C settings such as delay times and power pins
pub const I2C_CONFIG: u8 = 0x78;
/// Report name and version of the firmware
pub const REPORT_FIRMWARE: u8 = 0x79;
/// Ask for the analog channel of every pin
pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;
/// Ask for the supported modes and resolution of every pin
pub const CAPABILITY_QUERY: u8 = 0x6B;
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
/// Ask for a pin's current mode and state
pub const PIN_STATE_QUERY: u8 = 0x6D;
pub const PIN_STATE_RESPONSE: u8 = 0x6E;

// I2C sub commands
pub const I2C_MODE_WRITE: u8 = 0x00;
pub const I2C_MODE_READ: u8 = 0x01;

// Vendor sysex commands for the rover peripherals
pub const ROVER_SONAR: u8 = 0x50;
pub const ROVER_MOVE: u8 = 0x51;
pub const ROVER_LED: u8 = 0x52;
pub const ROVER_BUZZER: u8 = 0x53;
pub const ROVER_HEART_BEAT: u8 = 0x54;
pub const ROVER_LINE: u8 = 0x55;

// Sonar sub commands
pub const SONAR_READ: u8 = 0x00;
pub const SONAR_RESP: u8 = 0x01;
pub const SONAR_TURN: u8 = 0x02;

pub const TURN_LEFT: u8 = 0x00;
pub const TURN_RIGHT: u8 = 0x01;
pub const TURN_RESP: u8 = 0x02;

// Move sub commands
pub const MOVE_RUN: u8 = 0x00;
pub const MOVE_STEP: u8 = 0x01;
pub const MOVE_STOP: u8 = 0x02;
pub const MOVE_TURN: u8 = 0x03;
pub const MOVE_TURN_RESP: u8 = 0x04;
pub const MOVE_STEP_RESP: u8 = 0x05;

pub const MOVE_DIR_FWD: u8 = 0x00;
pub const MOVE_DIR_REV: u8 = 0x01;

pub const MOVE_STEP_BOTH: u8 = 0x00;
pub const MOVE_STEP_LEFT: u8 = 0x01;
pub const MOVE_STEP_RIGHT: u8 = 0x02;

// Buzzer sub commands
pub const BUZZER_PLAY: u8 = 0x00;
pub const BUZZER_STOP: u8 = 0x01;
pub const BUZZER_PLAY_FOR: u8 = 0x02;
pub const BUZZER_DONE: u8 = 0x03;
pub const BUZZER_BEEP: u8 = 0x04;

// Line sensor sub commands
pub const LINE_REQ: u8 = 0x00;
pub const LINE_RESP: u8 = 0x01;

/// Fixed liveness-probe payload the firmware echoes back.
pub const HEART_BEAT_PAYLOAD: [u8; 21] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x10, 0x11, 0x12, 0x13, 0x14,
    0x15, 0x16, 0x17, 0x18, 0x19, 0x20,
];
