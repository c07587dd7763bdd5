//! Surface widgets
//!
//! A widget is a named physical control. Input reaches it through the
//! router's message generators; output leaves through its feedback
//! processors. The zone currently driving it is tracked by id so that
//! deactivating a zone can hand the widget back to the surface default.

use crate::compiler::Rgb;
use crate::router::feedback::{FeedbackProcessor, Outbox};
use crate::zone::ZoneId;

/// Arena index of a widget inside its surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(pub usize);

#[derive(Debug, Clone)]
pub struct Widget {
    pub name: String,
    pub feedback: Vec<FeedbackProcessor>,
    /// Zone whose broker handles this widget; `None` means the surface
    /// default bundle
    pub current_zone: Option<ZoneId>,
}

impl Widget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feedback: Vec::new(),
            current_zone: None,
        }
    }

    pub fn add_feedback(&mut self, processor: FeedbackProcessor) {
        self.feedback.push(processor);
    }

    pub fn update_value(&mut self, value: f64, style: Option<i32>, now_ms: f64, out: &mut Outbox) {
        for p in &mut self.feedback {
            p.set_value(value, style, now_ms, out);
        }
    }

    pub fn update_text(&mut self, text: &str, now_ms: f64, out: &mut Outbox) {
        for p in &mut self.feedback {
            p.set_text(text, now_ms, out);
        }
    }

    pub fn update_color(&mut self, rgb: Rgb, now_ms: f64, out: &mut Outbox) {
        for p in &mut self.feedback {
            p.set_color(rgb, now_ms, out);
        }
    }

    pub fn clear(&mut self, now_ms: f64, out: &mut Outbox) {
        for p in &mut self.feedback {
            p.clear(now_ms, out);
        }
    }

    pub fn force_clear(&mut self, now_ms: f64, out: &mut Outbox) {
        for p in &mut self.feedback {
            p.force_clear(now_ms, out);
        }
    }
}
