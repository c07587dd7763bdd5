//! Protocol message routing
//!
//! Inbound wire messages are matched against the message generators a
//! surface registered for its widgets and turned into [`InputAction`]s.
//! MIDI uses tiered keys (full message, then status + data1, then status
//! only); the first tier with any registration fires every generator in it.
//! OSC and vendor-bus messages match one generator by exact address.
//!
//! Outbound encoding lives in [`feedback`]; the cross-thread vendor-bus
//! queue lives in [`vendor`].

pub mod feedback;
pub mod vendor;

use crate::midi::{convert, MidiEvent};
use crate::widget::WidgetId;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Normalized step of one encoder detent
pub const ENCODER_STEP: f64 = 0.01;

/// Logical trigger delivered to a widget
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputAction {
    /// Absolute position or press, 0.0..=1.0
    Absolute(f64),
    /// Button let go
    Release,
    Relative(f64),
    AcceleratedRelative { index: usize, delta: f64 },
}

/// How a generator decodes the messages registered for it
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorKind {
    /// Exact press message, optional exact release message
    Press {
        press: MidiEvent,
        release: Option<MidiEvent>,
    },
    /// Any value on status + data1 is a press
    AnyPress,
    Fader7Bit,
    /// Pitch bend, 14-bit across data1 (lsb) and data2 (msb)
    Fader14Bit,
    /// Sign-magnitude relative encoder, bit 6 is the sign
    Encoder,
    /// Encoder whose data2 bytes map to acceleration levels by position
    AcceleratedEncoder {
        increments: Vec<u8>,
        decrements: Vec<u8>,
    },
    /// Two's complement relative encoder
    EncoderPlain,
    EncoderPlainReverse,
}

/// Inbound decoder bound to one widget
#[derive(Debug, Clone, PartialEq)]
pub struct MessageGenerator {
    pub widget: WidgetId,
    pub kind: GeneratorKind,
    /// Message from the widget description; its bytes select the keys
    pub message: MidiEvent,
}

fn two_complement_steps(data2: u8) -> f64 {
    let value = data2 & 0x7F;
    if value < 0x40 {
        value as f64
    } else {
        value as f64 - 128.0
    }
}

impl MessageGenerator {
    pub fn new(widget: WidgetId, kind: GeneratorKind, message: MidiEvent) -> Self {
        Self { widget, kind, message }
    }

    /// Routing keys this generator registers under.
    pub fn keys(&self) -> Vec<u32> {
        match &self.kind {
            GeneratorKind::Press { press, release } => {
                let mut keys = vec![press.key3()];
                keys.extend(release.map(|r| r.key3()));
                keys
            }
            GeneratorKind::Fader14Bit => vec![self.message.key1()],
            _ => vec![self.message.key2()],
        }
    }

    /// Decode `evt` into the widget's trigger.
    pub fn process(&self, evt: &MidiEvent) -> Option<InputAction> {
        match &self.kind {
            GeneratorKind::Press { press, release } => {
                if evt == press {
                    Some(InputAction::Absolute(1.0))
                } else if release.as_ref() == Some(evt) {
                    Some(InputAction::Release)
                } else {
                    None
                }
            }
            GeneratorKind::AnyPress => Some(InputAction::Absolute(1.0)),
            GeneratorKind::Fader7Bit => Some(InputAction::Absolute(convert::from_7bit(evt.data2))),
            GeneratorKind::Fader14Bit => {
                Some(InputAction::Absolute(convert::from_14bit(evt.data1, evt.data2)))
            }
            GeneratorKind::Encoder => {
                let magnitude = (evt.data2 & 0x3F) as f64 * ENCODER_STEP;
                let delta = if evt.data2 & 0x40 != 0 { -magnitude } else { magnitude };
                Some(InputAction::Relative(delta))
            }
            GeneratorKind::AcceleratedEncoder {
                increments,
                decrements,
            } => {
                if let Some(index) = increments.iter().position(|b| *b == evt.data2) {
                    Some(InputAction::AcceleratedRelative {
                        index,
                        delta: ENCODER_STEP,
                    })
                } else {
                    decrements
                        .iter()
                        .position(|b| *b == evt.data2)
                        .map(|index| InputAction::AcceleratedRelative {
                            index,
                            delta: -ENCODER_STEP,
                        })
                }
            }
            GeneratorKind::EncoderPlain => {
                Some(InputAction::Relative(two_complement_steps(evt.data2) * ENCODER_STEP))
            }
            GeneratorKind::EncoderPlainReverse => {
                Some(InputAction::Relative(-two_complement_steps(evt.data2) * ENCODER_STEP))
            }
        }
    }
}

/// Tiered-key MIDI router of one surface
#[derive(Debug, Default)]
pub struct MidiRouter {
    generators: HashMap<u32, Vec<MessageGenerator>>,
}

impl MidiRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, generator: MessageGenerator) {
        for key in generator.keys() {
            self.generators.entry(key).or_default().push(generator.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.generators.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Triggers for `evt`, from every generator under the most specific
    /// key that has any.
    pub fn route(&self, evt: &MidiEvent) -> Vec<(WidgetId, InputAction)> {
        let Some(generators) = evt.keys().iter().find_map(|key| self.generators.get(key)) else {
            debug!("Unmatched MIDI {}", evt);
            return Vec::new();
        };
        generators
            .iter()
            .filter_map(|g| g.process(evt).map(|action| (g.widget, action)))
            .inspect(|(widget, action)| trace!("MIDI {} -> widget {:?} {:?}", evt, widget, action))
            .collect()
    }
}

/// Exact-address router for OSC and vendor-bus input
#[derive(Debug, Default)]
pub struct AddressRouter {
    widgets: HashMap<String, WidgetId>,
}

impl AddressRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later registration of the same address replaces the earlier one.
    pub fn register(&mut self, address: impl Into<String>, widget: WidgetId) {
        self.widgets.insert(address.into(), widget);
    }

    pub fn route(&self, address: &str, value: f64) -> Option<(WidgetId, InputAction)> {
        match self.widgets.get(address) {
            Some(&widget) => Some((widget, InputAction::Absolute(value))),
            None => {
                debug!("Unmatched address {}", address);
                None
            }
        }
    }

    pub fn widget(&self, address: &str) -> Option<WidgetId> {
        self.widgets.get(address).copied()
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }
}
