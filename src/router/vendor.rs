//! Vendor control-bus ingestion
//!
//! The vendor bus calls in on its own thread. Those calls only enqueue
//! immutable [`VendorCommand`]s through a cloneable [`VendorSender`]; the
//! surface drains the queue once per tick on the engine thread and
//! executes the batch in the order it was sent.

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{trace, warn};

/// Address that forwards its value to the host as a command id
pub const POST_MESSAGE: &str = "PostMessage";
/// Address that only marks the host project as modified
pub const LAYOUT_CHANGED: &str = "LayoutChanged";

/// Widgets fired when the vendor FX area gains or loses focus
pub const FX_AREA_GAINED_FOCUS: &str = "OnEuConFXAreaGainedFocus";
pub const FX_AREA_LOST_FOCUS: &str = "OnEuConFXAreaLostFocus";

/// Widget announced by the vendor bus at startup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VendorWidgetInfo {
    pub name: String,
    /// Inbound address, empty when the widget has no control
    pub control: String,
    /// Outbound address, empty when the widget has no feedback
    pub feedback: String,
    pub channel: i32,
    pub group: String,
}

/// One marshalled call from the vendor thread
#[derive(Debug, Clone, PartialEq)]
pub enum VendorCommand {
    Double { address: String, value: f64 },
    Text { address: String, value: String },
    VisibilityChange { group: String, channel: i32, visible: bool },
    RegisterWidgets(Vec<VendorWidgetInfo>),
}

/// Thread-safe producer handle
#[derive(Debug, Clone)]
pub struct VendorSender {
    tx: Sender<VendorCommand>,
}

impl VendorSender {
    fn send(&self, command: VendorCommand) {
        trace!("Vendor bus <- {:?}", command);
        if self.tx.send(command).is_err() {
            warn!("Vendor bus queue closed, message dropped");
        }
    }

    pub fn send_double(&self, address: impl Into<String>, value: f64) {
        self.send(VendorCommand::Double {
            address: address.into(),
            value,
        });
    }

    pub fn send_text(&self, address: impl Into<String>, value: impl Into<String>) {
        self.send(VendorCommand::Text {
            address: address.into(),
            value: value.into(),
        });
    }

    pub fn visibility_change(&self, group: impl Into<String>, channel: i32, visible: bool) {
        self.send(VendorCommand::VisibilityChange {
            group: group.into(),
            channel,
            visible,
        });
    }

    pub fn register_widgets(&self, widgets: Vec<VendorWidgetInfo>) {
        self.send(VendorCommand::RegisterWidgets(widgets));
    }
}

/// Multi-producer queue drained on the engine thread
#[derive(Debug)]
pub struct VendorBusQueue {
    tx: Sender<VendorCommand>,
    rx: Receiver<VendorCommand>,
}

impl Default for VendorBusQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorBusQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> VendorSender {
        VendorSender { tx: self.tx.clone() }
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<VendorCommand> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drain_is_fifo() {
        let queue = VendorBusQueue::new();
        let tx = queue.sender();
        tx.send_double("Fader1", 0.5);
        tx.send_text("Name1", "Kick");
        tx.visibility_change("FX", 0, true);

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(
            drained[0],
            VendorCommand::Double {
                address: "Fader1".into(),
                value: 0.5
            }
        );
        assert!(matches!(drained[2], VendorCommand::VisibilityChange { visible: true, .. }));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_foreign_thread_producers() {
        let queue = VendorBusQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tx = queue.sender();
                thread::spawn(move || {
                    for j in 0..25 {
                        tx.send_double(format!("W{i}"), j as f64);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let drained = queue.drain();
        assert_eq!(drained.len(), 100);
        // per-producer order survives
        let w0: Vec<f64> = drained
            .iter()
            .filter_map(|c| match c {
                VendorCommand::Double { address, value } if address == "W0" => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(w0, (0..25).map(|j| j as f64).collect::<Vec<_>>());
    }
}
