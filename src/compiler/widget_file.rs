//! Widget description language (`.mst` for MIDI, `.ost` for OSC)
//!
//! ```text
//! Widget Mute1
//!     Press 90 10 7f 90 10 00
//!     FB_TwoState 90 10 7f 90 10 00
//! WidgetEnd
//!
//! Widget Fader1
//!     Control /track/1/volume
//!     FB_Processor /track/1/volume
//! WidgetEnd
//! ```
//!
//! Lines with an unknown class or the wrong arity are skipped.

use super::tokenize;
use crate::error::CompileError;
use crate::midi::{parse_hex_byte, sysex, MidiEvent};
use crate::router::feedback::{FeedbackKind, FeedbackProcessor};
use crate::router::GeneratorKind;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// One way a widget receives input
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
    Midi { kind: GeneratorKind, message: MidiEvent },
    /// OSC or vendor-bus address
    Address(String),
}

/// A compiled `Widget` block
#[derive(Debug, Clone)]
pub struct WidgetDefinition {
    pub name: String,
    pub inputs: Vec<InputSpec>,
    pub feedback: Vec<FeedbackProcessor>,
}

impl WidgetDefinition {
    fn new(name: String) -> Self {
        Self {
            name,
            inputs: Vec::new(),
            feedback: Vec::new(),
        }
    }
}

/// Outcome of compiling one widget file
#[derive(Debug, Default)]
pub struct WidgetCompilation {
    pub widgets: Vec<WidgetDefinition>,
    pub failure: Option<CompileError>,
}

fn event_at(tokens: &[String], start: usize) -> Option<MidiEvent> {
    MidiEvent::from_hex_tokens(tokens.get(start..start + 3)?)
}

fn interval_at(tokens: &[String], index: usize) -> Option<f64> {
    tokens.get(index).and_then(|t| t.parse().ok())
}

fn number_at(tokens: &[String], index: usize) -> Option<u8> {
    tokens.get(index).and_then(|t| t.parse().ok())
}

/// `< 01 02 > < 41 42 >` after the encoder message
fn acceleration_tables(tokens: &[String]) -> (Vec<u8>, Vec<u8>) {
    let mut groups: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    for token in tokens {
        match token.as_str() {
            "<" => current = Some(Vec::new()),
            ">" => groups.extend(current.take()),
            t => {
                if let (Some(group), Some(byte)) = (current.as_mut(), parse_hex_byte(t)) {
                    group.push(byte);
                }
            }
        }
    }
    let mut groups = groups.into_iter();
    (groups.next().unwrap_or_default(), groups.next().unwrap_or_default())
}

fn parse_input(tokens: &[String]) -> Option<InputSpec> {
    let size = tokens.len();
    let class = tokens[0].as_str();
    let midi = |kind: GeneratorKind| {
        event_at(tokens, 1).map(|message| InputSpec::Midi { kind, message })
    };

    match (class, size) {
        ("Control", n) if n > 1 => Some(InputSpec::Address(tokens[1].clone())),
        ("AnyPress", 4 | 7) => midi(GeneratorKind::AnyPress),
        ("Press", 4) => {
            let press = event_at(tokens, 1)?;
            midi(GeneratorKind::Press { press, release: None })
        }
        ("Press", 7) => {
            let press = event_at(tokens, 1)?;
            let release = event_at(tokens, 4)?;
            midi(GeneratorKind::Press {
                press,
                release: Some(release),
            })
        }
        ("Fader14Bit", 4) => midi(GeneratorKind::Fader14Bit),
        ("Fader7Bit", 4) => midi(GeneratorKind::Fader7Bit),
        ("Encoder", 4) => midi(GeneratorKind::Encoder),
        ("Encoder", n) if n > 4 => {
            let (increments, decrements) = acceleration_tables(&tokens[4..]);
            midi(GeneratorKind::AcceleratedEncoder {
                increments,
                decrements,
            })
        }
        ("EncoderPlain", 4) => midi(GeneratorKind::EncoderPlain),
        ("EncoderPlainReverse", 4) => midi(GeneratorKind::EncoderPlainReverse),
        _ => None,
    }
}

fn parse_feedback(tokens: &[String]) -> Option<FeedbackProcessor> {
    let size = tokens.len();
    let class = tokens[0].as_str();

    let (kind, interval) = match (class, size) {
        ("FB_Processor", n) if n > 1 => (
            FeedbackKind::Osc {
                address: tokens[1].clone(),
            },
            None,
        ),
        ("FB_TwoState", 7 | 8) => (
            FeedbackKind::TwoState {
                on: event_at(tokens, 1)?,
                off: event_at(tokens, 4)?,
            },
            interval_at(tokens, 7),
        ),
        ("FB_FaderportRGB7Bit", 4) => (
            FeedbackKind::FaderportRgb {
                note: event_at(tokens, 1)?.data1,
            },
            None,
        ),
        ("FB_Fader14Bit" | "FB_Fader7Bit" | "FB_Encoder" | "FB_VUMeter" | "FB_GainReductionMeter", 4 | 5) => {
            let evt = event_at(tokens, 1)?;
            let kind = match class {
                "FB_Fader14Bit" => FeedbackKind::Fader14Bit { status: evt.status },
                "FB_Fader7Bit" => FeedbackKind::Fader7Bit {
                    status: evt.status,
                    data1: evt.data1,
                },
                "FB_Encoder" => FeedbackKind::Encoder {
                    status: evt.status,
                    data1: evt.data1,
                },
                "FB_VUMeter" => FeedbackKind::VuMeter {
                    status: evt.status,
                    data1: evt.data1,
                },
                _ => FeedbackKind::GainReductionMeter {
                    status: evt.status,
                    data1: evt.data1,
                },
            };
            (kind, interval_at(tokens, 4))
        }
        ("FB_MCUVUMeter" | "FB_MCUXTVUMeter", 2 | 3) => (
            FeedbackKind::McuVuMeter {
                channel: number_at(tokens, 1)?,
            },
            interval_at(tokens, 2),
        ),
        ("FB_MCUDisplayUpper" | "FB_MCUDisplayLower" | "FB_MCUXTDisplayUpper" | "FB_MCUXTDisplayLower", 2 | 3) => {
            let device = if class.starts_with("FB_MCUXT") {
                sysex::MCU_XT_DEVICE
            } else {
                sysex::MCU_DEVICE
            };
            (
                FeedbackKind::McuDisplay {
                    device,
                    command: sysex::LCD_COMMAND,
                    line: u8::from(class.ends_with("Lower")),
                    channel: number_at(tokens, 1)?,
                },
                interval_at(tokens, 2),
            )
        }
        ("FB_C4DisplayUpper" | "FB_C4DisplayLower", 3 | 4) => (
            FeedbackKind::McuDisplay {
                device: sysex::C4_DEVICE,
                command: sysex::C4_ROW_COMMAND + number_at(tokens, 1)?,
                line: u8::from(class.ends_with("Lower")),
                channel: number_at(tokens, 2)?,
            },
            interval_at(tokens, 3),
        ),
        _ => return None,
    };

    let processor = FeedbackProcessor::new(kind);
    Some(match interval {
        Some(ms) => processor.with_refresh_interval(ms),
        None => processor,
    })
}

/// Compile widget definitions from any line source.
pub fn compile_widget_source(reader: impl BufRead, path: &Path) -> WidgetCompilation {
    let mut out = WidgetCompilation::default();
    let mut current: Option<WidgetDefinition> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(source) => {
                out.failure = Some(CompileError::Io {
                    path: path.to_path_buf(),
                    line: index + 1,
                    source,
                });
                return out;
            }
        };

        let tokens = tokenize(&line);
        let Some(first) = tokens.first() else {
            continue;
        };

        match first.as_str() {
            "Widget" => {
                out.widgets.extend(current.take());
                current = tokens.get(1).cloned().map(WidgetDefinition::new);
            }
            "WidgetEnd" => out.widgets.extend(current.take()),
            _ => {
                let Some(widget) = current.as_mut() else {
                    continue;
                };
                if let Some(input) = parse_input(&tokens) {
                    widget.inputs.push(input);
                } else if let Some(feedback) = parse_feedback(&tokens) {
                    widget.feedback.push(feedback);
                } else {
                    debug!(
                        "{}:{}: skipping '{}' in widget '{}'",
                        path.display(),
                        index + 1,
                        first,
                        widget.name
                    );
                }
            }
        }
    }

    out.widgets.extend(current.take());
    out
}

/// Compile one widget file from disk.
pub fn compile_widget_file(path: &Path) -> WidgetCompilation {
    let compilation = match File::open(path) {
        Ok(file) => compile_widget_source(BufReader::new(file), path),
        Err(source) => WidgetCompilation {
            widgets: Vec::new(),
            failure: Some(CompileError::Io {
                path: path.to_path_buf(),
                line: 0,
                source,
            }),
        },
    };
    if let Some(err) = &compilation.failure {
        warn!("{}", err);
    }
    compilation
}
