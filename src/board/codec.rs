//! Firmata wire framing: a byte-at-a-time decoder plus the encoding
//! helpers shared by every message the session emits.
//!
//! Firmata data bytes are 7-bit; the high bit marks a command byte. Every
//! 14-bit quantity travels LSB-first as two 7-bit bytes. This module knows
//! nothing about pins or peripherals.

use thiserror::Error;

use super::constants::{
    ANALOG_MESSAGE, ANALOG_MESSAGE_BOUND, DIGITAL_MESSAGE, DIGITAL_MESSAGE_BOUND, END_SYSEX,
    REPORT_VERSION, START_SYSEX,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("sysex terminator without a matching start byte")]
    UnmatchedSysexEnd,
    #[error("expected a command byte, got {0:#04x}")]
    NotACommand(u8),
}

/// One complete frame read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    ProtocolVersion { major: u8, minor: u8 },
    AnalogPinUpdate { channel: u8, value: u16 },
    DigitalPortUpdate { port: u8, mask: u16 },
    Sysex { command: u8, payload: Vec<u8> },
}

enum DecodeState {
    /// Waiting for a command byte.
    Command,
    /// Inside a fixed-length message; `needed` counts the data bytes.
    Fixed { command: u8, needed: usize },
    /// Inside a sysex envelope, accumulating until `END_SYSEX`.
    Sysex,
}

/// Streaming decoder. Partial-frame bytes are retained internally, so the
/// caller can feed reads of any granularity.
pub struct Decoder {
    state: DecodeState,
    buf: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Command,
            buf: Vec::new(),
        }
    }

    /// Consumes one byte, yielding at most one completed frame.
    ///
    /// After an error the decoder is back at frame boundary, so the caller
    /// may report the error and keep feeding.
    pub fn feed(&mut self, byte: u8) -> Result<Option<DecodedFrame>, FramingError> {
        match self.state {
            DecodeState::Command => match byte {
                START_SYSEX => {
                    self.buf.clear();
                    self.state = DecodeState::Sysex;
                    Ok(None)
                }
                END_SYSEX => Err(FramingError::UnmatchedSysexEnd),
                REPORT_VERSION => {
                    self.begin_fixed(byte, 2);
                    Ok(None)
                }
                DIGITAL_MESSAGE..=DIGITAL_MESSAGE_BOUND => {
                    self.begin_fixed(byte, 2);
                    Ok(None)
                }
                ANALOG_MESSAGE..=ANALOG_MESSAGE_BOUND => {
                    self.begin_fixed(byte, 2);
                    Ok(None)
                }
                b if b & 0x80 == 0 => Err(FramingError::NotACommand(b)),
                // A command byte this session never receives; skip it.
                _ => Ok(None),
            },
            DecodeState::Fixed { command, needed } => {
                self.buf.push(byte);
                if self.buf.len() < needed {
                    return Ok(None);
                }
                self.state = DecodeState::Command;
                Ok(Some(self.finish_fixed(command)))
            }
            DecodeState::Sysex => {
                if byte != END_SYSEX {
                    self.buf.push(byte);
                    return Ok(None);
                }
                self.state = DecodeState::Command;
                if self.buf.is_empty() {
                    // An empty envelope carries nothing.
                    return Ok(None);
                }
                Ok(Some(DecodedFrame::Sysex {
                    command: self.buf[0],
                    payload: self.buf[1..].to_vec(),
                }))
            }
        }
    }

    fn begin_fixed(&mut self, command: u8, needed: usize) {
        self.buf.clear();
        self.state = DecodeState::Fixed { command, needed };
    }

    fn finish_fixed(&mut self, command: u8) -> DecodedFrame {
        let lsb = self.buf[0];
        let msb = self.buf[1];
        match command {
            REPORT_VERSION => DecodedFrame::ProtocolVersion {
                major: lsb,
                minor: msb,
            },
            DIGITAL_MESSAGE..=DIGITAL_MESSAGE_BOUND => DecodedFrame::DigitalPortUpdate {
                port: command & 0x0F,
                mask: merge_u14(lsb, msb),
            },
            _ => DecodedFrame::AnalogPinUpdate {
                channel: command & 0x0F,
                value: merge_u14(lsb, msb),
            },
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a sysex payload in `F0 .. F7`.
pub fn sysex(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push(START_SYSEX);
    frame.extend_from_slice(payload);
    frame.push(END_SYSEX);
    frame
}

/// Splits a 14-bit value into two 7-bit bytes, LSB first.
pub fn split_u14(value: u16) -> [u8; 2] {
    [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
}

/// Reassembles a 14-bit value from two 7-bit bytes.
pub fn merge_u14(lsb: u8, msb: u8) -> u16 {
    (lsb as u16) | ((msb as u16) << 7)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<DecodedFrame> {
        let mut decoder = Decoder::new();
        let mut frames = Vec::new();
        for &b in bytes {
            if let Some(frame) = decoder.feed(b).unwrap() {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn sysex_round_trip() {
        let payload = [0x50, 0x01, 0x2C, 0x01];
        let frames = decode_all(&sysex(&payload));
        assert_eq!(
            frames,
            vec![DecodedFrame::Sysex {
                command: 0x50,
                payload: vec![0x01, 0x2C, 0x01],
            }]
        );
    }

    #[test]
    fn split_merge_is_lossless() {
        for value in 0u16..=16383 {
            let [lsb, msb] = split_u14(value);
            assert!(lsb < 0x80 && msb < 0x80);
            assert_eq!(merge_u14(lsb, msb), value);
        }
    }

    #[test]
    fn protocol_version_frame() {
        let frames = decode_all(&[0xF9, 0x02, 0x05]);
        assert_eq!(
            frames,
            vec![DecodedFrame::ProtocolVersion { major: 2, minor: 5 }]
        );
    }

    #[test]
    fn digital_and_analog_frames() {
        let frames = decode_all(&[0x92, 0x24, 0x00, 0xE3, 0x7F, 0x03]);
        assert_eq!(
            frames,
            vec![
                DecodedFrame::DigitalPortUpdate {
                    port: 2,
                    mask: 0x24
                },
                DecodedFrame::AnalogPinUpdate {
                    channel: 3,
                    value: 0x1FF
                },
            ]
        );
    }

    #[test]
    fn partial_feeds_are_retained() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.feed(0xF0).unwrap(), None);
        assert_eq!(decoder.feed(0x55).unwrap(), None);
        assert_eq!(decoder.feed(0x01).unwrap(), None);
        let frame = decoder.feed(0xF7).unwrap();
        assert_eq!(
            frame,
            Some(DecodedFrame::Sysex {
                command: 0x55,
                payload: vec![0x01],
            })
        );
    }

    #[test]
    fn unmatched_end_sysex_is_an_error() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.feed(0xF7), Err(FramingError::UnmatchedSysexEnd));
        // The decoder recovers at the next frame boundary.
        assert_eq!(decoder.feed(0xF9).unwrap(), None);
    }

    #[test]
    fn data_byte_without_command_is_an_error() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.feed(0x10), Err(FramingError::NotACommand(0x10)));
    }

    #[test]
    fn empty_sysex_is_ignored() {
        assert!(decode_all(&[0xF0, 0xF7]).is_empty());
    }
}
