//! In-memory host model
//!
//! Behaves like a small mixer: tracks with attributes, sends and FX chains,
//! a master track, a command table and a transport. Every mutation is logged,
//! which makes it useful for exercising surfaces without a running DAW and
//! as the backing host in tests.

use super::{attr, Host, TargetId, TransportCommand, TransportState};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
enum Clock {
    /// Advanced explicitly (tests)
    Manual(f64),
    Monotonic(Instant),
}

/// One FX parameter
#[derive(Debug, Clone)]
pub struct MemoryParam {
    pub name: String,
    pub value: f64,
}

/// One FX instance in a track's chain
#[derive(Debug, Clone)]
pub struct MemoryFx {
    pub name: String,
    pub params: Vec<MemoryParam>,
}

impl MemoryFx {
    pub fn new(name: impl Into<String>, param_names: &[&str]) -> Self {
        Self {
            name: name.into(),
            params: param_names
                .iter()
                .map(|n| MemoryParam {
                    name: n.to_string(),
                    value: 0.0,
                })
                .collect(),
        }
    }
}

/// One send from a track
#[derive(Debug, Clone)]
pub struct MemorySend {
    pub name: String,
    pub numbers: HashMap<String, f64>,
}

/// One track
#[derive(Debug, Clone)]
pub struct MemoryTrack {
    pub id: TargetId,
    pub numbers: HashMap<String, f64>,
    pub strings: HashMap<String, String>,
    pub sends: Vec<MemorySend>,
    pub fx: Vec<MemoryFx>,
}

impl MemoryTrack {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut numbers = HashMap::new();
        numbers.insert(attr::VOLUME.to_string(), 1.0);
        numbers.insert(attr::PAN.to_string(), 0.0);
        numbers.insert(attr::WIDTH.to_string(), 1.0);
        let mut strings = HashMap::new();
        strings.insert(attr::NAME.to_string(), name.into());
        Self {
            id: TargetId::new(id),
            numbers,
            strings,
            sends: Vec::new(),
            fx: Vec::new(),
        }
    }

    pub fn with_send(mut self, name: impl Into<String>) -> Self {
        let mut numbers = HashMap::new();
        numbers.insert(attr::VOLUME.to_string(), 1.0);
        numbers.insert(attr::PAN.to_string(), 0.0);
        self.sends.push(MemorySend {
            name: name.into(),
            numbers,
        });
        self
    }

    pub fn with_fx(mut self, fx: MemoryFx) -> Self {
        self.fx.push(fx);
        self
    }
}

/// In-memory [`Host`] implementation
#[derive(Debug, Clone)]
pub struct MemoryHost {
    clock: Clock,
    tracks: Vec<MemoryTrack>,
    master: MemoryTrack,
    commands: HashMap<String, u32>,
    command_states: HashMap<u32, bool>,
    /// Every invoked command id, in order
    pub invoked: Vec<u32>,
    focused_fx: Option<(TargetId, usize)>,
    open_editors: HashSet<(TargetId, usize)>,
    transport: TransportState,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Empty project with a master track and a manual clock at 0 ms.
    pub fn new() -> Self {
        Self {
            clock: Clock::Manual(0.0),
            tracks: Vec::new(),
            master: MemoryTrack::new("{master}", "MASTER"),
            commands: HashMap::new(),
            command_states: HashMap::new(),
            invoked: Vec::new(),
            focused_fx: None,
            open_editors: HashSet::new(),
            transport: TransportState::default(),
        }
    }

    /// Project with `count` tracks named "Track 1".."Track N".
    pub fn with_tracks(count: usize) -> Self {
        let mut host = Self::new();
        for i in 1..=count {
            host.add_track(MemoryTrack::new(format!("{{track-{i}}}"), format!("Track {i}")));
        }
        host
    }

    /// Switch to the wall clock (used by the binary).
    pub fn with_monotonic_clock(mut self) -> Self {
        self.clock = Clock::Monotonic(Instant::now());
        self
    }

    pub fn add_track(&mut self, track: MemoryTrack) -> TargetId {
        let id = track.id.clone();
        self.tracks.push(track);
        id
    }

    pub fn remove_track(&mut self, target: &TargetId) {
        self.tracks.retain(|t| &t.id != target);
    }

    pub fn track_mut(&mut self, target: &TargetId) -> Option<&mut MemoryTrack> {
        if &self.master.id == target {
            return Some(&mut self.master);
        }
        self.tracks.iter_mut().find(|t| &t.id == target)
    }

    fn track(&self, target: &TargetId) -> Option<&MemoryTrack> {
        if &self.master.id == target {
            return Some(&self.master);
        }
        self.tracks.iter().find(|t| &t.id == target)
    }

    /// Advance the manual clock. No effect on a monotonic clock.
    pub fn advance_ms(&mut self, ms: f64) {
        if let Clock::Manual(now) = &mut self.clock {
            *now += ms;
        }
    }

    pub fn register_command(&mut self, name: impl Into<String>, id: u32) {
        self.commands.insert(name.into(), id);
    }

    pub fn set_command_state(&mut self, id: u32, on: bool) {
        self.command_states.insert(id, on);
    }

    pub fn set_focused_fx(&mut self, focus: Option<(TargetId, usize)>) {
        self.focused_fx = focus;
    }

    pub fn is_editor_open(&self, target: &TargetId, slot: usize) -> bool {
        self.open_editors.contains(&(target.clone(), slot))
    }

    /// Select exactly these tracks.
    pub fn set_selection(&mut self, selected: &[TargetId]) {
        for track in &mut self.tracks {
            let on = selected.contains(&track.id);
            track
                .numbers
                .insert(attr::SELECTED.to_string(), if on { 1.0 } else { 0.0 });
        }
    }
}

impl Host for MemoryHost {
    fn now_ms(&self) -> f64 {
        match &self.clock {
            Clock::Manual(now) => *now,
            Clock::Monotonic(start) => start.elapsed().as_secs_f64() * 1000.0,
        }
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_at(&self, index: usize) -> Option<TargetId> {
        self.tracks.get(index).map(|t| t.id.clone())
    }

    fn master_track(&self) -> Option<TargetId> {
        Some(self.master.id.clone())
    }

    fn resolve(&self, target: &TargetId) -> bool {
        self.track(target).is_some()
    }

    fn selected_tracks(&self) -> Vec<TargetId> {
        self.tracks
            .iter()
            .filter(|t| t.numbers.get(attr::SELECTED).copied().unwrap_or(0.0) != 0.0)
            .map(|t| t.id.clone())
            .collect()
    }

    fn select_only(&mut self, target: &TargetId) {
        info!("🎯 Select only {}", target);
        self.set_selection(std::slice::from_ref(target));
    }

    fn get_number(&self, target: &TargetId, attr: &str) -> Option<f64> {
        let track = self.track(target)?;
        Some(track.numbers.get(attr).copied().unwrap_or(0.0))
    }

    fn set_number(&mut self, target: &TargetId, attr: &str, value: f64) {
        if let Some(track) = self.track_mut(target) {
            debug!("🎛️  {} {} = {:.4}", target, attr, value);
            track.numbers.insert(attr.to_string(), value);
        }
    }

    fn get_string(&self, target: &TargetId, attr: &str) -> Option<String> {
        self.track(target)?.strings.get(attr).cloned()
    }

    fn send_count(&self, target: &TargetId) -> usize {
        self.track(target).map(|t| t.sends.len()).unwrap_or(0)
    }

    fn send_name(&self, target: &TargetId, send: usize) -> Option<String> {
        Some(self.track(target)?.sends.get(send)?.name.clone())
    }

    fn get_send_number(&self, target: &TargetId, send: usize, attr: &str) -> Option<f64> {
        let send = self.track(target)?.sends.get(send)?;
        Some(send.numbers.get(attr).copied().unwrap_or(0.0))
    }

    fn set_send_number(&mut self, target: &TargetId, send: usize, attr: &str, value: f64) {
        if let Some(s) = self.track_mut(target).and_then(|t| t.sends.get_mut(send)) {
            debug!("🎛️  {} send {} {} = {:.4}", target, send, attr, value);
            s.numbers.insert(attr.to_string(), value);
        }
    }

    fn lookup_command(&self, name: &str) -> Option<u32> {
        match name.parse::<u32>() {
            Ok(id) if id != 0 => Some(id),
            _ => self.commands.get(name).copied(),
        }
    }

    fn invoke_command(&mut self, id: u32) {
        info!("▶️  Command {}", id);
        if let Some(state) = self.command_states.get_mut(&id) {
            *state = !*state;
        }
        self.invoked.push(id);
    }

    fn command_state(&self, id: u32) -> Option<bool> {
        self.command_states.get(&id).copied()
    }

    fn fx_count(&self, target: &TargetId) -> usize {
        self.track(target).map(|t| t.fx.len()).unwrap_or(0)
    }

    fn fx_name(&self, target: &TargetId, slot: usize) -> Option<String> {
        Some(self.track(target)?.fx.get(slot)?.name.clone())
    }

    fn fx_param(&self, target: &TargetId, slot: usize, param: usize) -> Option<f64> {
        Some(self.track(target)?.fx.get(slot)?.params.get(param)?.value)
    }

    fn set_fx_param(&mut self, target: &TargetId, slot: usize, param: usize, value: f64) {
        let param = self
            .track_mut(target)
            .and_then(|t| t.fx.get_mut(slot))
            .and_then(|fx| fx.params.get_mut(param));
        if let Some(p) = param {
            debug!("🎚️  {} fx {} '{}' = {:.4}", target, slot, p.name, value);
            p.value = value;
        }
    }

    fn fx_param_name(&self, target: &TargetId, slot: usize, param: usize) -> Option<String> {
        Some(self.track(target)?.fx.get(slot)?.params.get(param)?.name.clone())
    }

    fn fx_param_display(&self, target: &TargetId, slot: usize, param: usize) -> Option<String> {
        self.fx_param(target, slot, param).map(|v| format!("{:.2}", v))
    }

    fn focused_fx(&self) -> Option<(TargetId, usize)> {
        self.focused_fx.clone()
    }

    fn open_fx_editor(&mut self, target: &TargetId, slot: usize) {
        info!("🪟 Open FX editor {} slot {}", target, slot);
        self.open_editors.insert((target.clone(), slot));
    }

    fn close_fx_editor(&mut self, target: &TargetId, slot: usize) {
        info!("🪟 Close FX editor {} slot {}", target, slot);
        self.open_editors.remove(&(target.clone(), slot));
    }

    fn transport(&self) -> TransportState {
        self.transport
    }

    fn transport_command(&mut self, command: TransportCommand) {
        info!("⏯️  Transport {:?}", command);
        match command {
            TransportCommand::Play => {
                self.transport.playing = true;
                self.transport.paused = false;
            }
            TransportCommand::Stop => {
                self.transport = TransportState::default();
            }
            TransportCommand::Record => {
                self.transport.recording = !self.transport.recording;
                if self.transport.recording {
                    self.transport.playing = true;
                }
            }
            TransportCommand::Rewind | TransportCommand::FastForward => {}
        }
    }
}
