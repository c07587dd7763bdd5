//! Feedback processors: widget state back to the hardware
//!
//! Each widget owns zero or more [`FeedbackProcessor`]s. Actions push
//! values, text and colors into them; the processors encode those into
//! [`WireMessage`]s on the surface's [`Outbox`], suppressing repeats of
//! what they last sent unless forced or their refresh interval elapsed.

use crate::compiler::Rgb;
use crate::midi::{convert, sysex, MidiEvent};
use tracing::trace;

/// Argument of an outgoing OSC message
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Float(f32),
    Str(String),
}

/// Value of an outgoing vendor-bus message
#[derive(Debug, Clone, PartialEq)]
pub enum VendorValue {
    Double(f64),
    Text(String),
}

/// One message ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Midi([u8; 3]),
    SysEx(Vec<u8>),
    Osc { address: String, arg: OscArg },
    /// OSC message without arguments
    OscBare { address: String },
    Vendor { address: String, value: VendorValue },
}

/// Pending outgoing messages of a surface, flushed once per tick
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<WireMessage>,
}

impl Outbox {
    pub fn push(&mut self, message: WireMessage) {
        self.messages.push(message);
    }

    pub fn drain(&mut self) -> Vec<WireMessage> {
        std::mem::take(&mut self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Encoding a processor applies
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackKind {
    /// On/off message pair (button LEDs)
    TwoState { on: MidiEvent, off: MidiEvent },
    Fader7Bit { status: u8, data1: u8 },
    /// Pitch-bend style, 14-bit
    Fader14Bit { status: u8 },
    /// MCU encoder LED ring, sent on CC `data1 + 0x20`
    Encoder { status: u8, data1: u8 },
    VuMeter { status: u8, data1: u8 },
    /// Like a meter, but full scale means no reduction
    GainReductionMeter { status: u8, data1: u8 },
    /// Faderport RGB button: note on, then one message per color channel
    FaderportRgb { note: u8 },
    /// One LCD cell
    McuDisplay {
        device: u8,
        command: u8,
        line: u8,
        channel: u8,
    },
    /// MCU channel-pressure meter
    McuVuMeter { channel: u8 },
    Osc { address: String },
    Vendor { address: String, db: bool },
}

/// Stateful encoder of one widget output
#[derive(Debug, Clone)]
pub struct FeedbackProcessor {
    kind: FeedbackKind,
    refresh_interval_ms: Option<f64>,
    last_midi: Option<[u8; 3]>,
    last_text: Option<String>,
    last_number: Option<f64>,
    last_rgb: Option<Rgb>,
    last_sent_ms: f64,
}

/// Vendor dB meters rest at this level when cleared
const VENDOR_DB_FLOOR: f64 = -100.0;

/// Vendor displays whose labels the console owns; text is never sent to them
const VENDOR_FIXED_LABELS: [&str; 4] = ["Pan_Display", "Width_Display", "PanL_Display", "PanR_Display"];

/// MCU meter levels above this are clip indicators
const MCU_METER_TOP: f64 = 12.0;

impl FeedbackProcessor {
    pub fn new(kind: FeedbackKind) -> Self {
        Self {
            kind,
            refresh_interval_ms: None,
            last_midi: None,
            last_text: None,
            last_number: None,
            last_rgb: None,
            last_sent_ms: 0.0,
        }
    }

    /// Re-send unchanged values once this many milliseconds have passed.
    pub fn with_refresh_interval(mut self, interval_ms: f64) -> Self {
        self.refresh_interval_ms = Some(interval_ms);
        self
    }

    pub fn kind(&self) -> &FeedbackKind {
        &self.kind
    }

    fn refresh_due(&self, now_ms: f64) -> bool {
        self.refresh_interval_ms
            .is_some_and(|interval| now_ms - self.last_sent_ms >= interval)
    }

    fn send_midi(&mut self, bytes: [u8; 3], force: bool, now_ms: f64, out: &mut Outbox) {
        if !force && self.last_midi == Some(bytes) && !self.refresh_due(now_ms) {
            return;
        }
        trace!("→ {:02X?}", bytes);
        self.last_midi = Some(bytes);
        self.last_sent_ms = now_ms;
        out.push(WireMessage::Midi(bytes));
    }

    /// Push a normalized 0.0..=1.0 value. `style` selects the encoder
    /// ring mode where the hardware has one.
    pub fn set_value(&mut self, value: f64, style: Option<i32>, now_ms: f64, out: &mut Outbox) {
        self.send_value(value, style, false, now_ms, out);
    }

    fn send_value(&mut self, value: f64, style: Option<i32>, force: bool, now_ms: f64, out: &mut Outbox) {
        match self.kind.clone() {
            FeedbackKind::TwoState { on, off } => {
                let evt = if value != 0.0 { on } else { off };
                self.send_midi(evt.bytes(), force, now_ms, out);
            }
            FeedbackKind::Fader7Bit { status, data1 } | FeedbackKind::VuMeter { status, data1 } => {
                self.send_midi([status, data1, convert::to_7bit(value)], force, now_ms, out);
            }
            FeedbackKind::GainReductionMeter { status, data1 } => {
                self.send_midi([status, data1, convert::to_7bit(1.0 - value)], force, now_ms, out);
            }
            FeedbackKind::Fader14Bit { status } => {
                let (lsb, msb) = convert::to_14bit(value);
                self.send_midi([status, lsb, msb], force, now_ms, out);
            }
            FeedbackKind::Encoder { status, data1 } => {
                let mode = style.unwrap_or(0).clamp(0, 3) as u8;
                let position = 1 + (value.clamp(0.0, 1.0) * 10.0).round() as u8;
                self.send_midi([status, data1.wrapping_add(0x20), (mode << 4) | position], force, now_ms, out);
            }
            FeedbackKind::McuVuMeter { channel } => {
                let level = (value.clamp(0.0, 1.0) * MCU_METER_TOP).round() as u8;
                self.send_midi([0xD0, (channel << 4) | level, 0], force, now_ms, out);
            }
            FeedbackKind::Osc { address } => self.send_number(address, value, force, now_ms, out, false),
            FeedbackKind::Vendor { address, .. } => self.send_number(address, value, force, now_ms, out, true),
            FeedbackKind::FaderportRgb { .. } | FeedbackKind::McuDisplay { .. } => {}
        }
    }

    fn send_number(&mut self, address: String, value: f64, force: bool, now_ms: f64, out: &mut Outbox, vendor: bool) {
        if !force && self.last_number == Some(value) && !self.refresh_due(now_ms) {
            return;
        }
        self.last_number = Some(value);
        self.last_sent_ms = now_ms;
        out.push(if vendor {
            WireMessage::Vendor {
                address,
                value: VendorValue::Double(value),
            }
        } else {
            WireMessage::Osc {
                address,
                arg: OscArg::Float(value as f32),
            }
        });
    }

    /// Push display text. Processors without a display ignore it.
    pub fn set_text(&mut self, text: &str, now_ms: f64, out: &mut Outbox) {
        self.send_text(text, false, now_ms, out);
    }

    fn send_text(&mut self, text: &str, force: bool, now_ms: f64, out: &mut Outbox) {
        let message = match &self.kind {
            FeedbackKind::McuDisplay {
                device,
                command,
                line,
                channel,
            } => {
                let offset = *line as usize * sysex::LINE_WIDTH + *channel as usize * sysex::CELL_WIDTH;
                WireMessage::SysEx(sysex::lcd_text(*device, *command, offset as u8, text))
            }
            FeedbackKind::Osc { address } => WireMessage::Osc {
                address: address.clone(),
                arg: OscArg::Str(text.to_string()),
            },
            FeedbackKind::Vendor { address, .. }
                if VENDOR_FIXED_LABELS.iter().any(|label| address.contains(label)) =>
            {
                return
            }
            FeedbackKind::Vendor { address, .. } => WireMessage::Vendor {
                address: address.clone(),
                value: VendorValue::Text(text.to_string()),
            },
            _ => return,
        };
        if !force && self.last_text.as_deref() == Some(text) && !self.refresh_due(now_ms) {
            return;
        }
        self.last_text = Some(text.to_string());
        self.last_sent_ms = now_ms;
        out.push(message);
    }

    /// Push a color. Only RGB-capable processors use it.
    pub fn set_color(&mut self, rgb: Rgb, now_ms: f64, out: &mut Outbox) {
        self.send_color(rgb, false, now_ms, out);
    }

    fn send_color(&mut self, rgb: Rgb, force: bool, now_ms: f64, out: &mut Outbox) {
        let FeedbackKind::FaderportRgb { note } = self.kind else {
            return;
        };
        if !force && self.last_rgb == Some(rgb) && !self.refresh_due(now_ms) {
            return;
        }
        self.last_rgb = Some(rgb);
        self.last_sent_ms = now_ms;
        out.push(WireMessage::Midi([0x90, note, 0x7F]));
        for (status, component) in [(0x91, rgb.r), (0x92, rgb.g), (0x93, rgb.b)] {
            out.push(WireMessage::Midi([status, note, convert::color_to_7bit(component)]));
        }
    }

    fn clear_with(&mut self, force: bool, now_ms: f64, out: &mut Outbox) {
        match self.kind.clone() {
            FeedbackKind::McuDisplay { .. } => self.send_text("", force, now_ms, out),
            FeedbackKind::FaderportRgb { .. } => self.send_color(Rgb::default(), force, now_ms, out),
            FeedbackKind::Encoder { status, data1 } => {
                self.send_midi([status, data1.wrapping_add(0x20), 0], force, now_ms, out)
            }
            FeedbackKind::Vendor { address, db: true } => {
                self.send_number(address, VENDOR_DB_FLOOR, force, now_ms, out, true)
            }
            _ => self.send_value(0.0, None, force, now_ms, out),
        }
    }

    /// Reset to the blank state, suppressed if already blank.
    pub fn clear(&mut self, now_ms: f64, out: &mut Outbox) {
        self.clear_with(false, now_ms, out);
    }

    /// Reset to the blank state unconditionally.
    pub fn force_clear(&mut self, now_ms: f64, out: &mut Outbox) {
        self.clear_with(true, now_ms, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(out: &mut Outbox) -> Vec<WireMessage> {
        out.drain()
    }

    #[test]
    fn test_two_state_dedup() {
        let mut p = FeedbackProcessor::new(FeedbackKind::TwoState {
            on: MidiEvent::new(0x90, 0x10, 0x7F),
            off: MidiEvent::new(0x90, 0x10, 0x00),
        });
        let mut out = Outbox::default();
        p.set_value(1.0, None, 0.0, &mut out);
        p.set_value(1.0, None, 10.0, &mut out);
        p.set_value(0.0, None, 20.0, &mut out);
        assert_eq!(
            drain(&mut out),
            vec![
                WireMessage::Midi([0x90, 0x10, 0x7F]),
                WireMessage::Midi([0x90, 0x10, 0x00]),
            ]
        );
        p.force_clear(30.0, &mut out);
        assert_eq!(drain(&mut out), vec![WireMessage::Midi([0x90, 0x10, 0x00])]);
    }

    #[test]
    fn test_refresh_interval_resends() {
        let mut p = FeedbackProcessor::new(FeedbackKind::Fader14Bit { status: 0xE0 }).with_refresh_interval(100.0);
        let mut out = Outbox::default();
        p.set_value(1.0, None, 0.0, &mut out);
        p.set_value(1.0, None, 50.0, &mut out);
        assert_eq!(out.len(), 1);
        p.set_value(1.0, None, 150.0, &mut out);
        assert_eq!(drain(&mut out), vec![WireMessage::Midi([0xE0, 0x7F, 0x7F]); 2]);
    }

    #[test]
    fn test_encoder_ring() {
        let mut p = FeedbackProcessor::new(FeedbackKind::Encoder {
            status: 0xB0,
            data1: 0x10,
        });
        let mut out = Outbox::default();
        p.set_value(0.5, Some(1), 0.0, &mut out);
        p.clear(0.0, &mut out);
        assert_eq!(
            drain(&mut out),
            vec![WireMessage::Midi([0xB0, 0x30, 0x16]), WireMessage::Midi([0xB0, 0x30, 0x00])]
        );
    }

    #[test]
    fn test_display_text_dedup() {
        let mut p = FeedbackProcessor::new(FeedbackKind::McuDisplay {
            device: sysex::MCU_DEVICE,
            command: sysex::LCD_COMMAND,
            line: 0,
            channel: 3,
        });
        let mut out = Outbox::default();
        p.set_text("Kick", 0.0, &mut out);
        p.set_text("Kick", 1.0, &mut out);
        p.set_value(1.0, None, 2.0, &mut out);
        let sent = drain(&mut out);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            WireMessage::SysEx(sysex::mcu_display(sysex::MCU_DEVICE, 0, 3, "Kick"))
        );
    }

    #[test]
    fn test_faderport_rgb() {
        let mut p = FeedbackProcessor::new(FeedbackKind::FaderportRgb { note: 0x08 });
        let mut out = Outbox::default();
        p.set_value(1.0, None, 0.0, &mut out);
        assert!(out.is_empty());
        p.set_color(Rgb::new(255, 128, 0), 0.0, &mut out);
        assert_eq!(
            drain(&mut out),
            vec![
                WireMessage::Midi([0x90, 0x08, 0x7F]),
                WireMessage::Midi([0x91, 0x08, 127]),
                WireMessage::Midi([0x92, 0x08, 64]),
                WireMessage::Midi([0x93, 0x08, 0]),
            ]
        );
    }

    #[test]
    fn test_mcu_meter_and_gain_reduction() {
        let mut meter = FeedbackProcessor::new(FeedbackKind::McuVuMeter { channel: 2 });
        let mut gr = FeedbackProcessor::new(FeedbackKind::GainReductionMeter {
            status: 0xB0,
            data1: 0x40,
        });
        let mut out = Outbox::default();
        meter.set_value(1.0, None, 0.0, &mut out);
        gr.set_value(1.0, None, 0.0, &mut out);
        assert_eq!(
            drain(&mut out),
            vec![WireMessage::Midi([0xD0, 0x2C, 0]), WireMessage::Midi([0xB0, 0x40, 0])]
        );
    }

    #[test]
    fn test_osc_and_vendor() {
        let mut osc = FeedbackProcessor::new(FeedbackKind::Osc {
            address: "/Fader1".into(),
        });
        let mut vendor = FeedbackProcessor::new(FeedbackKind::Vendor {
            address: "Meter1".into(),
            db: true,
        });
        let mut out = Outbox::default();
        osc.set_value(0.25, None, 0.0, &mut out);
        osc.set_text("Vox", 0.0, &mut out);
        vendor.clear(0.0, &mut out);
        assert_eq!(
            drain(&mut out),
            vec![
                WireMessage::Osc {
                    address: "/Fader1".into(),
                    arg: OscArg::Float(0.25)
                },
                WireMessage::Osc {
                    address: "/Fader1".into(),
                    arg: OscArg::Str("Vox".into())
                },
                WireMessage::Vendor {
                    address: "Meter1".into(),
                    value: VendorValue::Double(-100.0)
                },
            ]
        );
    }

    #[test]
    fn test_vendor_label_displays_keep_their_text() {
        let mut pan = FeedbackProcessor::new(FeedbackKind::Vendor {
            address: "Channel1_Pan_Display".into(),
            db: false,
        });
        let mut out = Outbox::default();
        pan.set_text("50L", 0.0, &mut out);
        assert!(out.is_empty());
        pan.set_value(0.5, None, 0.0, &mut out);
        assert_eq!(out.len(), 1);
    }
}
