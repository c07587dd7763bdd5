//! Host application capability interface
//!
//! Everything the engine needs from the audio application goes through the
//! [`Host`] trait: target lookup, attribute get/set, commands, FX parameters,
//! transport and a monotonic clock. The engine never caches host objects,
//! only [`TargetId`]s, and re-resolves them on every use.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use memory::MemoryHost;

/// Stable identity of a track (the host's GUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Track attribute names understood by hosts
pub mod attr {
    /// Linear gain, 1.0 == 0 dB
    pub const VOLUME: &str = "D_VOL";
    /// Pan, -1.0..=1.0
    pub const PAN: &str = "D_PAN";
    /// Stereo width, -1.0..=1.0
    pub const WIDTH: &str = "D_WIDTH";
    /// Dual-pan left/right, -1.0..=1.0
    pub const DUAL_PAN_L: &str = "D_DUALPANL";
    pub const DUAL_PAN_R: &str = "D_DUALPANR";
    pub const MUTE: &str = "B_MUTE";
    pub const SOLO: &str = "I_SOLO";
    pub const SELECTED: &str = "I_SELECTED";
    pub const RECORD_ARM: &str = "I_RECARM";
    /// Packed 0x00BBGGRR custom color
    pub const CUSTOM_COLOR: &str = "I_CUSTOMCOLOR";
    pub const NAME: &str = "P_NAME";
}

/// Snapshot of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransportState {
    pub playing: bool,
    pub paused: bool,
    pub recording: bool,
}

/// Transport commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportCommand {
    Play,
    Stop,
    Record,
    Rewind,
    FastForward,
}

/// Capability interface implemented by the host application binding.
///
/// Track indices are 0-based over the visible, bankable tracks and never
/// include the master track.
pub trait Host {
    /// Monotonic milliseconds
    fn now_ms(&self) -> f64;

    fn track_count(&self) -> usize;
    fn track_at(&self, index: usize) -> Option<TargetId>;
    fn master_track(&self) -> Option<TargetId>;
    /// Whether the target still exists
    fn resolve(&self, target: &TargetId) -> bool;
    fn selected_tracks(&self) -> Vec<TargetId>;
    /// Select `target` and deselect every other track
    fn select_only(&mut self, target: &TargetId);

    fn get_number(&self, target: &TargetId, attr: &str) -> Option<f64>;
    fn set_number(&mut self, target: &TargetId, attr: &str, value: f64);
    fn get_string(&self, target: &TargetId, attr: &str) -> Option<String>;

    fn send_count(&self, target: &TargetId) -> usize;
    fn send_name(&self, target: &TargetId, send: usize) -> Option<String>;
    fn get_send_number(&self, target: &TargetId, send: usize, attr: &str) -> Option<f64>;
    fn set_send_number(&mut self, target: &TargetId, send: usize, attr: &str, value: f64);

    /// Look up a command id by numeric string or symbolic name
    fn lookup_command(&self, name: &str) -> Option<u32>;
    fn invoke_command(&mut self, id: u32);
    /// On/off state of a toggle command, `None` when the command has no state
    fn command_state(&self, id: u32) -> Option<bool>;

    fn fx_count(&self, target: &TargetId) -> usize;
    fn fx_name(&self, target: &TargetId, slot: usize) -> Option<String>;
    fn fx_param(&self, target: &TargetId, slot: usize, param: usize) -> Option<f64>;
    fn set_fx_param(&mut self, target: &TargetId, slot: usize, param: usize, value: f64);
    fn fx_param_name(&self, target: &TargetId, slot: usize, param: usize) -> Option<String>;
    /// Formatted value of an FX parameter as the plugin displays it
    fn fx_param_display(&self, target: &TargetId, slot: usize, param: usize) -> Option<String>;
    /// The FX whose editor currently has focus
    fn focused_fx(&self) -> Option<(TargetId, usize)>;
    fn open_fx_editor(&mut self, target: &TargetId, slot: usize);
    fn close_fx_editor(&mut self, target: &TargetId, slot: usize);

    fn transport(&self) -> TransportState;
    fn transport_command(&mut self, command: TransportCommand);
}

/// Volume and pan value mapping shared by actions and the memory host
pub mod volume {
    /// Gain at the top of the fader (+6 dB)
    const FADER_TOP_GAIN: f64 = 1.995_262_314_968_879_6;

    /// Linear gain to dB, with silence reported as -150 dB.
    pub fn gain_to_db(gain: f64) -> f64 {
        if gain < 0.000_000_029_802_322_387_695_3 {
            -150.0
        } else {
            gain.ln() * 8.685_889_638_065_037
        }
    }

    pub fn db_to_gain(db: f64) -> f64 {
        (db * 0.115_129_254_649_702_28).exp()
    }

    /// Fader position 0.0..=1.0 to linear gain. Square-law taper topping
    /// out at +6 dB, so 0.5 sits near -6 dB.
    pub fn normalized_to_gain(position: f64) -> f64 {
        let p = position.clamp(0.0, 1.0);
        p * p * FADER_TOP_GAIN
    }

    pub fn gain_to_normalized(gain: f64) -> f64 {
        if gain <= 0.0 {
            return 0.0;
        }
        (gain / FADER_TOP_GAIN).sqrt().clamp(0.0, 1.0)
    }

    /// Fader position 0.0..=1.0 to pan -1.0..=1.0
    pub fn normalized_to_pan(position: f64) -> f64 {
        position.clamp(0.0, 1.0) * 2.0 - 1.0
    }

    pub fn pan_to_normalized(pan: f64) -> f64 {
        ((pan + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}
