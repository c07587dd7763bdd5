//! What each action kind does to the host, and what it reports back
//!
//! `perform` runs an action with a value already shaped by its context
//! (stepped, clamped, toggled). `poll` reads the current state for
//! feedback. Values cross this boundary in action units: dB for the dB
//! kinds, percent for the percent kinds, 0.0..=1.0 for everything else.

use super::context::ContextParam;
use super::{ActionEffect, ActionKind, PageCommand, SurfaceCommand};
use crate::broker::Modifiers;
use crate::host::{attr, volume, Host, TargetId, TransportCommand};
use crate::navigation::{NavigatorId, TrackNavigationManager};
use crate::router::feedback::Outbox;
use tracing::debug;

/// Per-surface mapping state some actions report as feedback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceFlags {
    pub map_sends: bool,
    pub map_fx: bool,
    pub map_fx_menu: bool,
    pub map_focused_fx: bool,
    pub show_fx_windows: bool,
}

/// Read-only view used to poll current values
#[derive(Clone, Copy)]
pub struct PollEnv<'a> {
    pub host: &'a dyn Host,
    pub nav: &'a TrackNavigationManager,
    pub modifiers: &'a Modifiers,
    pub flags: SurfaceFlags,
}

/// Mutable view used while dispatching an input
pub struct DispatchEnv<'a> {
    pub host: &'a mut dyn Host,
    pub nav: &'a mut TrackNavigationManager,
    pub modifiers: &'a mut Modifiers,
    pub flags: SurfaceFlags,
    /// Structural effects, applied by the page once dispatch returns
    pub effects: &'a mut Vec<ActionEffect>,
}

impl DispatchEnv<'_> {
    pub fn poll_env(&self) -> PollEnv<'_> {
        PollEnv {
            host: &*self.host,
            nav: &*self.nav,
            modifiers: &*self.modifiers,
            flags: self.flags,
        }
    }
}

/// Environment of a feedback pass
pub struct FeedbackEnv<'a> {
    pub poll: PollEnv<'a>,
    pub now_ms: f64,
    pub outbox: &'a mut Outbox,
}

/// Result of polling an action for feedback
#[derive(Debug, Clone, PartialEq)]
pub enum Polled {
    Value(f64),
    Text(String),
    Clear,
    /// Nothing to report; the widget keeps what it shows
    Unchanged,
}

/// Static inputs of one dispatch or poll
#[derive(Debug, Clone, Copy)]
pub(super) struct Binding<'a> {
    pub kind: ActionKind,
    pub param: &'a ContextParam,
    pub navigator: NavigatorId,
    pub slot_index: Option<usize>,
}

impl Binding<'_> {
    fn int(&self) -> i32 {
        match self.param {
            ContextParam::Int(n) => *n,
            _ => 0,
        }
    }

    fn text(&self) -> &str {
        match self.param {
            ContextParam::Text(s) => s,
            _ => "",
        }
    }

    fn fx_param_index(&self) -> usize {
        match self.param {
            ContextParam::FxParam { index, .. } => *index,
            _ => 0,
        }
    }

    fn slot(&self) -> usize {
        self.slot_index.unwrap_or(0)
    }

    /// Send slot from a send navigator, else from the integer parameter
    fn send(&self, nav: &TrackNavigationManager) -> usize {
        nav.navigator(self.navigator)
            .and_then(|n| n.send_index())
            .unwrap_or_else(|| self.int().max(0) as usize)
    }
}

fn set(host: &mut dyn Host, target: Option<&TargetId>, attr: &str, value: f64) {
    if let Some(t) = target {
        host.set_number(t, attr, value);
    }
}

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

/// Run `binding` with `value` in action units.
pub(super) fn perform(binding: Binding<'_>, target: Option<&TargetId>, value: f64, env: &mut DispatchEnv<'_>) {
    use ActionKind::*;
    let pressed = value != 0.0;

    match binding.kind {
        NoAction => {}
        HostCommand => {
            if let ContextParam::Command(id) = binding.param {
                env.host.invoke_command(*id);
            }
        }
        Play => env.host.transport_command(TransportCommand::Play),
        Stop => env.host.transport_command(TransportCommand::Stop),
        Record => env.host.transport_command(TransportCommand::Record),
        Rewind => env.host.transport_command(TransportCommand::Rewind),
        FastForward => env.host.transport_command(TransportCommand::FastForward),

        TrackVolume => set(env.host, target, attr::VOLUME, volume::normalized_to_gain(value)),
        TrackVolumeDb => set(env.host, target, attr::VOLUME, volume::db_to_gain(value)),
        TrackPan => set(env.host, target, attr::PAN, volume::normalized_to_pan(value)),
        TrackPanPercent => set(env.host, target, attr::PAN, value / 100.0),
        TrackPanWidth => set(env.host, target, attr::WIDTH, volume::normalized_to_pan(value)),
        TrackPanWidthPercent => set(env.host, target, attr::WIDTH, value / 100.0),
        TrackPanLPercent => set(env.host, target, attr::DUAL_PAN_L, value / 100.0),
        TrackPanRPercent => set(env.host, target, attr::DUAL_PAN_R, value / 100.0),
        TrackMute => set(env.host, target, attr::MUTE, flag(pressed)),
        TrackSolo => set(env.host, target, attr::SOLO, flag(pressed)),
        TrackSelect => set(env.host, target, attr::SELECTED, flag(pressed)),
        TrackRecordArm => set(env.host, target, attr::RECORD_ARM, flag(pressed)),
        TrackUniqueSelect => {
            if let (true, Some(t)) = (pressed, target) {
                env.host.select_only(t);
            }
        }
        ClearAllSolo => {
            if pressed {
                let tracks: Vec<TargetId> = env.nav.tracks().to_vec();
                for t in &tracks {
                    env.host.set_number(t, attr::SOLO, 0.0);
                }
            }
        }

        TrackSendVolume | TrackSendVolumeDb | TrackSendPan | TrackSendMute => {
            let Some(t) = target else { return };
            let send = binding.send(env.nav);
            let (attr, v) = match binding.kind {
                TrackSendVolume => (attr::VOLUME, volume::normalized_to_gain(value)),
                TrackSendVolumeDb => (attr::VOLUME, volume::db_to_gain(value)),
                TrackSendPan => (attr::PAN, volume::normalized_to_pan(value)),
                _ => (attr::MUTE, flag(pressed)),
            };
            env.host.set_send_number(t, send, attr, v);
        }

        FxParam | FxParamRelative => {
            if let Some(t) = target {
                env.host.set_fx_param(t, binding.slot(), binding.fx_param_index(), value);
            }
        }
        FocusedFxParam => {
            if let Some((t, slot)) = env.host.focused_fx() {
                env.host.set_fx_param(&t, slot, binding.fx_param_index(), value);
            }
        }

        TrackNameDisplay
        | TrackVolumeDisplay
        | TrackPanDisplay
        | TrackPanWidthDisplay
        | TrackSendNameDisplay
        | TrackSendVolumeDisplay
        | FxNameDisplay
        | FxParamNameDisplay
        | FxParamValueDisplay
        | FocusedFxParamNameDisplay
        | FocusedFxParamValueDisplay
        | FixedTextDisplay
        | FixedRgbColourDisplay => {}

        TrackBank => {
            if pressed {
                env.nav.adjust_bank(binding.int());
            }
        }
        SelectTrackRelative => {
            if pressed {
                select_relative(binding.int(), env);
            }
        }
        TogglePin => {
            if pressed {
                env.nav.toggle_pin(binding.navigator, &*env.host);
            }
        }
        ToggleScrollLink => {
            if pressed {
                env.nav.toggle_scroll_link();
            }
        }
        ForceScrollLink => {
            if pressed {
                env.nav.force_scroll_link(&*env.host);
            }
        }

        NextPage => {
            if pressed {
                env.effects.push(ActionEffect::Page(PageCommand::NextPage));
            }
        }
        GoPage => {
            if pressed {
                env.effects
                    .push(ActionEffect::Page(PageCommand::GoPage(binding.text().to_string())));
            }
        }
        Shift | Option | Control | Alt => env.modifiers.set(binding.kind.name(), pressed),
        FaderTouch => env.nav.set_fader_touch(binding.navigator, pressed),
        RotaryTouch => env.nav.set_rotary_touch(binding.navigator, pressed),

        GoZone | ToggleMapSelectedTrackSends | MapSelectedTrackSendsToWidgets
        | ToggleMapSelectedTrackFx | MapSelectedTrackFxToWidgets | ToggleMapSelectedTrackFxMenu
        | MapSelectedTrackFxToMenu | ToggleMapFocusedFx | MapFocusedFxToWidgets | GoFxSlot
        | SetShowFxWindows => {
            if pressed {
                let command = match binding.kind {
                    GoZone => SurfaceCommand::GoZone(binding.text().to_string()),
                    ToggleMapSelectedTrackSends => SurfaceCommand::ToggleMapSelectedTrackSends,
                    MapSelectedTrackSendsToWidgets => SurfaceCommand::MapSelectedTrackSends,
                    ToggleMapSelectedTrackFx => SurfaceCommand::ToggleMapSelectedTrackFx,
                    MapSelectedTrackFxToWidgets => SurfaceCommand::MapSelectedTrackFx,
                    ToggleMapSelectedTrackFxMenu => SurfaceCommand::ToggleMapSelectedTrackFxMenu,
                    MapSelectedTrackFxToMenu => SurfaceCommand::MapSelectedTrackFxToMenu,
                    ToggleMapFocusedFx => SurfaceCommand::ToggleMapFocusedFx,
                    MapFocusedFxToWidgets => SurfaceCommand::MapFocusedFx,
                    GoFxSlot => SurfaceCommand::GoFxSlot(
                        binding
                            .slot_index
                            .unwrap_or_else(|| binding.int().max(0) as usize),
                    ),
                    _ => SurfaceCommand::ToggleShowFxWindows,
                };
                env.effects.push(ActionEffect::Surface(command));
            }
        }
    }
}

fn select_relative(amount: i32, env: &mut DispatchEnv<'_>) {
    let tracks = env.nav.tracks();
    if tracks.is_empty() {
        return;
    }
    let current = env
        .nav
        .selected_track()
        .and_then(|sel| tracks.iter().position(|t| t == sel));
    let next = match current {
        Some(i) => (i as i64 + amount as i64).clamp(0, tracks.len() as i64 - 1) as usize,
        None => 0,
    };
    let target = tracks[next].clone();
    debug!("Select relative {:+} -> {}", amount, target);
    env.host.select_only(&target);
}

fn pan_text(pan: f64) -> String {
    let percent = (pan * 100.0).round() as i32;
    match percent {
        0 => "C".to_string(),
        p if p < 0 => format!("{}L", -p),
        p => format!("{}R", p),
    }
}

fn db_text(gain: f64) -> String {
    let db = volume::gain_to_db(gain);
    if db <= -144.0 {
        "-inf".to_string()
    } else {
        format!("{:.1}", db)
    }
}

fn number(value: Option<f64>, f: impl FnOnce(f64) -> f64) -> Polled {
    value.map(|v| Polled::Value(f(v))).unwrap_or(Polled::Clear)
}

fn text(value: Option<String>) -> Polled {
    value.map(Polled::Text).unwrap_or(Polled::Clear)
}

/// Current state of `binding` for feedback.
pub(super) fn poll(binding: Binding<'_>, target: Option<&TargetId>, env: &PollEnv<'_>) -> Polled {
    use ActionKind::*;
    let host = env.host;
    let attr_of = |a: &str| target.and_then(|t| host.get_number(t, a));
    let send = || target.map(|t| (t, binding.send(env.nav)));
    let send_number = |a: &str| send().and_then(|(t, s)| host.get_send_number(t, s, a));

    match binding.kind {
        NoAction => Polled::Clear,
        HostCommand => match binding.param {
            ContextParam::Command(id) => host
                .command_state(*id)
                .map(|on| Polled::Value(flag(on)))
                .unwrap_or(Polled::Unchanged),
            _ => Polled::Unchanged,
        },
        Play => Polled::Value(flag(host.transport().playing && !host.transport().paused)),
        Stop => {
            let t = host.transport();
            Polled::Value(flag(!t.playing && !t.recording))
        }
        Record => Polled::Value(flag(host.transport().recording)),
        Rewind | FastForward => Polled::Unchanged,

        TrackVolume => number(attr_of(attr::VOLUME), volume::gain_to_normalized),
        TrackVolumeDb => number(attr_of(attr::VOLUME), volume::gain_to_db),
        TrackPan => number(attr_of(attr::PAN), volume::pan_to_normalized),
        TrackPanPercent => number(attr_of(attr::PAN), |p| p * 100.0),
        TrackPanWidth => number(attr_of(attr::WIDTH), volume::pan_to_normalized),
        TrackPanWidthPercent => number(attr_of(attr::WIDTH), |w| w * 100.0),
        TrackPanLPercent => number(attr_of(attr::DUAL_PAN_L), |p| p * 100.0),
        TrackPanRPercent => number(attr_of(attr::DUAL_PAN_R), |p| p * 100.0),
        TrackMute => number(attr_of(attr::MUTE), |v| flag(v != 0.0)),
        TrackSolo => number(attr_of(attr::SOLO), |v| flag(v != 0.0)),
        TrackSelect | TrackUniqueSelect => number(attr_of(attr::SELECTED), |v| flag(v != 0.0)),
        TrackRecordArm => number(attr_of(attr::RECORD_ARM), |v| flag(v != 0.0)),
        ClearAllSolo => {
            let any = env
                .nav
                .tracks()
                .iter()
                .any(|t| host.get_number(t, attr::SOLO).unwrap_or(0.0) != 0.0);
            Polled::Value(flag(any))
        }
        TrackNameDisplay => text(target.and_then(|t| host.get_string(t, attr::NAME))),
        TrackVolumeDisplay => text(attr_of(attr::VOLUME).map(db_text)),
        TrackPanDisplay => text(attr_of(attr::PAN).map(pan_text)),
        TrackPanWidthDisplay => text(attr_of(attr::WIDTH).map(|w| format!("{}W", (w * 100.0).round() as i32))),

        TrackSendVolume => number(send_number(attr::VOLUME), volume::gain_to_normalized),
        TrackSendVolumeDb => number(send_number(attr::VOLUME), volume::gain_to_db),
        TrackSendPan => number(send_number(attr::PAN), volume::pan_to_normalized),
        TrackSendMute => number(send_number(attr::MUTE), |v| flag(v != 0.0)),
        TrackSendNameDisplay => text(send().and_then(|(t, s)| host.send_name(t, s))),
        TrackSendVolumeDisplay => text(send_number(attr::VOLUME).map(db_text)),

        FxParam | FxParamRelative => number(
            target.and_then(|t| host.fx_param(t, binding.slot(), binding.fx_param_index())),
            |v| v,
        ),
        FxNameDisplay => text(target.and_then(|t| host.fx_name(t, binding.slot()))),
        FxParamNameDisplay => match binding.param {
            ContextParam::FxParam {
                display_name: Some(name),
                ..
            } => Polled::Text(name.clone()),
            _ => text(target.and_then(|t| host.fx_param_name(t, binding.slot(), binding.fx_param_index()))),
        },
        FxParamValueDisplay => {
            text(target.and_then(|t| host.fx_param_display(t, binding.slot(), binding.fx_param_index())))
        }
        FocusedFxParam => number(
            host.focused_fx()
                .and_then(|(t, slot)| host.fx_param(&t, slot, binding.fx_param_index())),
            |v| v,
        ),
        FocusedFxParamNameDisplay => text(
            host.focused_fx()
                .and_then(|(t, slot)| host.fx_param_name(&t, slot, binding.fx_param_index())),
        ),
        FocusedFxParamValueDisplay => text(
            host.focused_fx()
                .and_then(|(t, slot)| host.fx_param_display(&t, slot, binding.fx_param_index())),
        ),

        FixedTextDisplay => Polled::Text(binding.text().to_string()),
        FixedRgbColourDisplay => Polled::Value(1.0),

        TogglePin => Polled::Value(flag(
            env.nav
                .navigator(binding.navigator)
                .is_some_and(|n| n.is_pinned()),
        )),
        ToggleScrollLink => Polled::Value(flag(env.nav.scroll_link())),
        Shift => Polled::Value(flag(env.modifiers.shift)),
        Option => Polled::Value(flag(env.modifiers.option)),
        Control => Polled::Value(flag(env.modifiers.control)),
        Alt => Polled::Value(flag(env.modifiers.alt)),
        ToggleMapSelectedTrackSends => Polled::Value(flag(env.flags.map_sends)),
        ToggleMapSelectedTrackFx => Polled::Value(flag(env.flags.map_fx)),
        ToggleMapSelectedTrackFxMenu => Polled::Value(flag(env.flags.map_fx_menu)),
        ToggleMapFocusedFx => Polled::Value(flag(env.flags.map_focused_fx)),
        SetShowFxWindows => Polled::Value(flag(env.flags.show_fx_windows)),

        TrackBank | SelectTrackRelative | ForceScrollLink | NextPage | GoPage | FaderTouch
        | RotaryTouch | GoZone | MapSelectedTrackSendsToWidgets | MapSelectedTrackFxToWidgets
        | MapSelectedTrackFxToMenu | MapFocusedFxToWidgets | GoFxSlot => Polled::Unchanged,
    }
}
