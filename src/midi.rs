//! MIDI utilities and message types
//!
//! Provides the 3-byte short message used on the surface wire, the
//! routing keys derived from it, SysEx helpers and value conversions.

use std::fmt;

/// A 3-byte MIDI short message as it travels between surface and router.
///
/// Two-byte messages (program change, channel pressure) carry `data2 == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MidiEvent {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiEvent {
    pub const fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1,
            data2,
        }
    }

    /// Build an event from raw bytes. Returns `None` for empty input, SysEx
    /// and running-status fragments (first byte below 0x80).
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;
        if status < 0x80 || status == 0xF0 {
            return None;
        }
        Some(Self {
            status,
            data1: data.get(1).copied().unwrap_or(0),
            data2: data.get(2).copied().unwrap_or(0),
        })
    }

    /// Parse three hex tokens such as `b0 10 7f`.
    pub fn from_hex_tokens(tokens: &[String]) -> Option<Self> {
        if tokens.len() < 3 {
            return None;
        }
        Some(Self {
            status: parse_hex_byte(&tokens[0])?,
            data1: parse_hex_byte(&tokens[1])?,
            data2: parse_hex_byte(&tokens[2])?,
        })
    }

    pub fn bytes(&self) -> [u8; 3] {
        [self.status, self.data1, self.data2]
    }

    /// Full-message routing key: status, data1 and data2.
    pub fn key3(&self) -> u32 {
        (self.status as u32) * 0x10000 + (self.data1 as u32) * 0x100 + self.data2 as u32
    }

    /// Status + data1 routing key (e.g. "this CC number, any value").
    pub fn key2(&self) -> u32 {
        (self.status as u32) * 0x10000 + (self.data1 as u32) * 0x100
    }

    /// Status-only routing key (e.g. "pitch bend on this channel").
    pub fn key1(&self) -> u32 {
        (self.status as u32) * 0x10000
    }

    /// Routing keys from most to least specific.
    pub fn keys(&self) -> [u32; 3] {
        [self.key3(), self.key2(), self.key1()]
    }

    /// Same status and data1, different data2.
    pub fn with_data2(self, data2: u8) -> Self {
        Self { data2, ..self }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X} {:02X}", self.status, self.data1, self.data2)
    }
}

/// Parse one hex byte token (`7f`, `0x7F`). Values above 0xFF are rejected.
pub fn parse_hex_byte(token: &str) -> Option<u8> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u8::from_str_radix(digits, 16).ok()
}

/// Mackie Control SysEx helpers
pub mod sysex {
    /// Mackie Control Universal device id
    pub const MCU_DEVICE: u8 = 0x14;
    /// Mackie Control Extender device id
    pub const MCU_XT_DEVICE: u8 = 0x15;

    /// Characters per LCD cell
    pub const CELL_WIDTH: usize = 7;

    /// Characters per LCD line (8 cells)
    pub const LINE_WIDTH: usize = 56;

    /// Mackie C4 device id
    pub const C4_DEVICE: u8 = 0x17;

    /// LCD write command of MCU-family displays
    pub const LCD_COMMAND: u8 = 0x12;

    /// C4 rows are addressed by command `0x30 + row`
    pub const C4_ROW_COMMAND: u8 = 0x30;

    /// Build an LCD text update for one 7-character cell.
    ///
    /// `line` 0 is the upper row, 1 the lower row. Non-ASCII characters are
    /// replaced with spaces; the text is padded or truncated to the cell.
    pub fn mcu_display(device: u8, line: u8, channel: u8, text: &str) -> Vec<u8> {
        let offset = line as usize * LINE_WIDTH + channel as usize * CELL_WIDTH;
        lcd_text(device, LCD_COMMAND, offset as u8, text)
    }

    /// Raw LCD write: header, command byte, character offset, one cell of
    /// text and the terminator.
    pub fn lcd_text(device: u8, command: u8, offset: u8, text: &str) -> Vec<u8> {
        let mut msg = vec![0xF0, 0x00, 0x00, 0x66, device, command, offset];
        msg.extend(
            text.chars()
                .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b' ' })
                .chain(std::iter::repeat(b' '))
                .take(CELL_WIDTH),
        );
        msg.push(0xF7);
        msg
    }
}

/// Number of bytes a short message with this status occupies on the wire
pub fn message_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 2,
        _ => 3,
    }
}

/// MIDI value conversion utilities
pub mod convert {
    /// 7-bit value (0-127) to normalized 0.0..=1.0
    pub fn from_7bit(value: u8) -> f64 {
        (value & 0x7F) as f64 / 127.0
    }

    /// Normalized value to 7-bit (clamped)
    pub fn to_7bit(value: f64) -> u8 {
        (value.clamp(0.0, 1.0) * 127.0).round() as u8
    }

    /// 14-bit pitch-bend data bytes (lsb, msb) to normalized 0.0..=1.0
    pub fn from_14bit(lsb: u8, msb: u8) -> f64 {
        let raw = ((msb as u16 & 0x7F) << 7) | (lsb as u16 & 0x7F);
        raw as f64 / 16383.0
    }

    /// Normalized value to 14-bit data bytes (lsb, msb)
    pub fn to_14bit(value: f64) -> (u8, u8) {
        let raw = (value.clamp(0.0, 1.0) * 16383.0).round() as u16;
        ((raw & 0x7F) as u8, ((raw >> 7) & 0x7F) as u8)
    }

    /// Convert 8-bit color component (0-255) to 7-bit (0-127)
    pub fn color_to_7bit(component: u8) -> u8 {
        component >> 1
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
