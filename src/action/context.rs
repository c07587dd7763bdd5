//! Per-binding action state
//!
//! One [`ActionContext`] exists per action in a live zone. It owns the
//! parameters parsed from the zone line (stepped values, deltas,
//! acceleration tables, color table, range) together with the mutable
//! state that makes relative controls and holds work: the last value, the
//! stepped index, acceleration tick counters and the hold timer.

use super::dispatch::{self, Binding, DispatchEnv, FeedbackEnv, Polled};
use super::ActionKind;
use crate::compiler::params::plain_params;
use crate::compiler::{parse_color_spec, parse_stepped_spec, ColorSpec, Rgb};
use crate::host::{attr, Host, TargetId};
use crate::navigation::NavigatorId;
use crate::widget::Widget;
use crate::zone::ActionFlags;
use tracing::{debug, trace};

/// Command id used when a host command name does not resolve
pub const UNKNOWN_COMMAND: u32 = 65535;

/// Stepped index lookup tolerance
const STEP_EPSILON: f64 = 0.001;

/// Tick threshold when an accelerated stepped action declares none
const DEFAULT_TICKS: u32 = 10;

/// Kind-specific constructor parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ContextParam {
    None,
    Int(i32),
    Text(String),
    Command(u32),
    FxParam {
        index: usize,
        display_name: Option<String>,
        display_style: Option<i32>,
    },
}

impl ContextParam {
    fn from_params(kind: ActionKind, params: &[String], host: &dyn Host) -> Self {
        use ActionKind::*;
        let plain = plain_params(params);
        let first = plain.first().copied();

        match kind {
            HostCommand => {
                let id = first
                    .and_then(|name| host.lookup_command(name))
                    .unwrap_or(UNKNOWN_COMMAND);
                if id == UNKNOWN_COMMAND {
                    debug!("Unknown host command '{}'", first.unwrap_or_default());
                }
                Self::Command(id)
            }
            FxParam | FxParamRelative | FxParamNameDisplay | FxParamValueDisplay | FocusedFxParam
            | FocusedFxParamNameDisplay | FocusedFxParamValueDisplay => Self::FxParam {
                index: first.and_then(|p| p.parse().ok()).unwrap_or(0),
                display_name: plain
                    .get(1)
                    .filter(|n| n.chars().next().is_some_and(|c| !c.is_ascii_digit()))
                    .map(|n| n.to_string()),
                display_style: plain.iter().skip(1).find_map(|p| p.parse().ok()),
            },
            FixedTextDisplay | GoZone | GoPage => Self::Text(first.unwrap_or_default().to_string()),
            TrackBank | SelectTrackRelative | GoFxSlot | TrackSendVolume | TrackSendVolumeDb
            | TrackSendPan | TrackSendMute | TrackSendNameDisplay | TrackSendVolumeDisplay => {
                first.and_then(|p| p.parse().ok()).map(Self::Int).unwrap_or(Self::None)
            }
            _ => Self::None,
        }
    }

    fn display_style(&self) -> Option<i32> {
        match self {
            Self::FxParam { display_style, .. } => *display_style,
            _ => None,
        }
    }
}

/// Hold-to-fire state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HoldState {
    Idle,
    /// A press is waiting for the hold delay to elapse
    Deferred { started_ms: f64, value: f64 },
}

/// A bound action plus its per-binding state
#[derive(Debug, Clone)]
pub struct ActionContext {
    kind: ActionKind,
    param: ContextParam,
    flags: ActionFlags,
    navigator: NavigatorId,
    slot_index: Option<usize>,
    range: (f64, f64),
    stepped_values: Vec<f64>,
    stepped_index: usize,
    delta_value: Option<f64>,
    accelerated_delta_values: Vec<f64>,
    accelerated_tick_values: Vec<u32>,
    accumulated_inc_ticks: u32,
    accumulated_dec_ticks: u32,
    colors: ColorSpec,
    last_value: f64,
    hold: HoldState,
}

impl ActionContext {
    /// Build a context from the action's full parameter list
    /// (`params[0]` is the action name).
    pub fn new(
        kind: ActionKind,
        params: &[String],
        flags: ActionFlags,
        navigator: NavigatorId,
        slot_index: Option<usize>,
        host: &dyn Host,
    ) -> Self {
        let stepped = parse_stepped_spec(params);
        let mut accelerated_tick_values = stepped.accelerated_tick_values;
        if accelerated_tick_values.is_empty() {
            accelerated_tick_values.push(DEFAULT_TICKS);
        }

        Self {
            kind,
            param: ContextParam::from_params(kind, params, host),
            flags,
            navigator,
            slot_index,
            range: stepped.range.unwrap_or_else(|| kind.default_range()),
            stepped_values: stepped.stepped_values,
            stepped_index: 0,
            delta_value: stepped.delta_value,
            accelerated_delta_values: stepped.accelerated_delta_values,
            accelerated_tick_values,
            accumulated_inc_ticks: 0,
            accumulated_dec_ticks: 0,
            colors: parse_color_spec(params),
            last_value: 0.0,
            hold: HoldState::Idle,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn param(&self) -> &ContextParam {
        &self.param
    }

    pub fn flags(&self) -> ActionFlags {
        self.flags
    }

    pub fn navigator(&self) -> NavigatorId {
        self.navigator
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn stepped_index(&self) -> usize {
        self.stepped_index
    }

    pub fn hold_state(&self) -> HoldState {
        self.hold
    }

    /// The action wants button releases delivered
    pub fn wants_release(&self) -> bool {
        self.flags.supports_release || self.flags.delay_amount > 0.0 || self.kind.handles_release()
    }

    fn binding(&self) -> Binding<'_> {
        Binding {
            kind: self.kind,
            param: &self.param,
            navigator: self.navigator,
            slot_index: self.slot_index,
        }
    }

    fn hold_delay_ms(&self) -> f64 {
        self.flags.delay_amount * 1000.0
    }

    /// Absolute input in action units. A press on a stepped binding
    /// advances the table, anything else is dispatched as is.
    pub fn do_action(&mut self, value: f64, env: &mut DispatchEnv<'_>) {
        if !self.stepped_values.is_empty() && value != 0.0 {
            self.advance_stepped_index();
            let stepped = self.stepped_values[self.stepped_index];
            self.do_range_bound_action(stepped, env);
        } else {
            self.do_range_bound_action(value, env);
        }
    }

    /// Button release.
    pub fn do_release(&mut self, env: &mut DispatchEnv<'_>) {
        if self.wants_release() {
            self.do_range_bound_action(0.0, env);
        }
    }

    /// Relative input from an encoder; `delta` is in action units.
    /// Stepped tables go through the tick accumulator at level 0.
    pub fn do_relative_action(&mut self, delta: f64, env: &mut DispatchEnv<'_>) {
        if !self.stepped_values.is_empty() {
            self.do_accelerated_stepped(0, delta, env);
            return;
        }
        self.do_delta_action(delta, env);
    }

    fn do_delta_action(&mut self, delta: f64, env: &mut DispatchEnv<'_>) {
        let step = match self.delta_value {
            Some(d) => d.copysign(delta),
            None => delta,
        };
        self.do_range_bound_action(self.last_value + step, env);
    }

    /// Relative input with an acceleration level from the encoder.
    pub fn do_accelerated_relative_action(&mut self, accel_index: usize, delta: f64, env: &mut DispatchEnv<'_>) {
        if !self.stepped_values.is_empty() {
            self.do_accelerated_stepped(accel_index, delta, env);
        } else if !self.accelerated_delta_values.is_empty() {
            let i = accel_index.min(self.accelerated_delta_values.len() - 1);
            let step = self.accelerated_delta_values[i].copysign(delta);
            self.do_range_bound_action(self.last_value + step, env);
        } else {
            self.do_delta_action(delta, env);
        }
    }

    fn do_accelerated_stepped(&mut self, accel_index: usize, delta: f64, env: &mut DispatchEnv<'_>) {
        let i = accel_index.min(self.accelerated_tick_values.len() - 1);
        let threshold = self.accelerated_tick_values[i];

        if delta > 0.0 {
            self.accumulated_inc_ticks += 1;
            self.accumulated_dec_ticks = self.accumulated_dec_ticks.saturating_sub(1);
            if self.accumulated_inc_ticks >= threshold {
                self.accumulated_inc_ticks = 0;
                self.accumulated_dec_ticks = 0;
                self.step_by_direction(delta, env);
            }
        } else if delta < 0.0 {
            self.accumulated_dec_ticks += 1;
            self.accumulated_inc_ticks = self.accumulated_inc_ticks.saturating_sub(1);
            if self.accumulated_dec_ticks >= threshold {
                self.accumulated_inc_ticks = 0;
                self.accumulated_dec_ticks = 0;
                self.step_by_direction(delta, env);
            }
        }
    }

    /// Press advances through the table. It wraps to the start on ascending
    /// tables and sticks at the end otherwise.
    fn advance_stepped_index(&mut self) {
        let last = self.stepped_values.len() - 1;
        if self.stepped_index < last {
            self.stepped_index += 1;
        } else if self.stepped_values[0] < self.stepped_values[last] {
            self.stepped_index = 0;
        }
    }

    fn step_by_direction(&mut self, delta: f64, env: &mut DispatchEnv<'_>) {
        let last = self.stepped_values.len() - 1;
        if delta > 0.0 {
            self.stepped_index = (self.stepped_index + 1).min(last);
        } else {
            self.stepped_index = self.stepped_index.saturating_sub(1);
        }
        let stepped = self.stepped_values[self.stepped_index];
        self.do_range_bound_action(stepped, env);
    }

    /// Hold gating, toggle, clamp, then dispatch.
    fn do_range_bound_action(&mut self, value: f64, env: &mut DispatchEnv<'_>) {
        if self.flags.delay_amount > 0.0 {
            self.hold = if value != 0.0 {
                trace!("{} held, waiting {} ms", self.kind.name(), self.hold_delay_ms());
                HoldState::Deferred {
                    started_ms: env.host.now_ms(),
                    value,
                }
            } else {
                HoldState::Idle
            };
            return;
        }
        self.dispatch(value, env);
    }

    fn dispatch(&mut self, value: f64, env: &mut DispatchEnv<'_>) {
        let target = if self.kind.needs_target() {
            match env.nav.resolve(self.navigator, &*env.host) {
                Some(t) => Some(t),
                None => {
                    trace!("{}: navigator resolves to nothing", self.kind.name());
                    return;
                }
            }
        } else {
            None
        };

        let mut value = value;
        if self.flags.should_toggle && value != 0.0 {
            let current = match dispatch::poll(self.binding(), target.as_ref(), &env.poll_env()) {
                Polled::Value(v) => v,
                _ => 0.0,
            };
            value = if current == 0.0 { 1.0 } else { 0.0 };
        }

        let (lo, hi) = self.range;
        let value = value.clamp(lo, hi);
        self.last_value = value;
        dispatch::perform(self.binding(), target.as_ref(), value, env);
    }

    /// Fire a deferred hold once its delay has elapsed.
    pub fn run_deferred(&mut self, env: &mut DispatchEnv<'_>) {
        if let HoldState::Deferred { started_ms, value } = self.hold {
            if env.host.now_ms() - started_ms > self.hold_delay_ms() {
                debug!("⏱️  {} hold elapsed", self.kind.name());
                self.hold = HoldState::Idle;
                self.dispatch(value, env);
            }
        }
    }

    /// Poll the action and push the result to `widget`.
    pub fn request_update(&mut self, widget: &mut Widget, env: &mut FeedbackEnv<'_>) {
        let target = if self.kind.needs_target() {
            match env.poll.nav.resolve(self.navigator, env.poll.host) {
                Some(t) => Some(t),
                None => {
                    widget.clear(env.now_ms, env.outbox);
                    return;
                }
            }
        } else {
            None
        };

        match dispatch::poll(self.binding(), target.as_ref(), &env.poll) {
            Polled::Value(v) => self.update_widget_value(v, target.as_ref(), widget, env),
            Polled::Text(text) => widget.update_text(&text, env.now_ms, env.outbox),
            Polled::Clear => widget.clear(env.now_ms, env.outbox),
            Polled::Unchanged => {}
        }
    }

    /// Push a value in action units to the widget's feedback processors.
    pub fn update_widget_value(
        &mut self,
        value: f64,
        target: Option<&TargetId>,
        widget: &mut Widget,
        env: &mut FeedbackEnv<'_>,
    ) {
        let (lo, hi) = self.kind.default_range();
        let value = if self.flags.inverted { lo + hi - value } else { value };

        if let Some(i) = self
            .stepped_values
            .iter()
            .position(|s| (s - value).abs() < STEP_EPSILON)
        {
            self.stepped_index = i;
        }
        self.last_value = value;

        if let Some(rgb) = self.feedback_color(value, target, env.poll.host) {
            widget.update_color(rgb, env.now_ms, env.outbox);
        }

        let normalized = if hi > lo { (value - lo) / (hi - lo) } else { value };
        widget.update_value(normalized, self.param.display_style(), env.now_ms, env.outbox);
    }

    fn feedback_color(&self, value: f64, target: Option<&TargetId>, host: &dyn Host) -> Option<Rgb> {
        if self.colors.track_color {
            let packed = target.and_then(|t| host.get_number(t, attr::CUSTOM_COLOR))?;
            return Some(Rgb::from_packed(packed as u32));
        }
        let index = if value == 0.0 { 0 } else { 1 };
        self.colors
            .colors
            .get(index)
            .or(self.colors.colors.last())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionEffect, PageCommand, SurfaceFlags};
    use crate::broker::Modifiers;
    use crate::compiler::tokenize;
    use crate::host::MemoryHost;
    use crate::navigation::TrackNavigationManager;
    use crate::router::feedback::{FeedbackKind, FeedbackProcessor, Outbox, WireMessage};

    struct Rig {
        host: MemoryHost,
        nav: TrackNavigationManager,
        modifiers: Modifiers,
        effects: Vec<ActionEffect>,
        channel: NavigatorId,
    }

    impl Rig {
        fn new() -> Self {
            let host = MemoryHost::with_tracks(4);
            let mut nav = TrackNavigationManager::new();
            let channel = nav.add_channel_navigator();
            nav.sync(&host);
            Self {
                host,
                nav,
                modifiers: Modifiers::default(),
                effects: Vec::new(),
                channel,
            }
        }

        fn env(&mut self) -> DispatchEnv<'_> {
            DispatchEnv {
                host: &mut self.host,
                nav: &mut self.nav,
                modifiers: &mut self.modifiers,
                flags: SurfaceFlags::default(),
                effects: &mut self.effects,
            }
        }

        fn context(&self, line: &str, flags: ActionFlags) -> ActionContext {
            let params = tokenize(line);
            let kind = crate::action::ActionRegistry::new()
                .lookup(&params[0])
                .unwrap_or(ActionKind::NoAction);
            ActionContext::new(kind, &params, flags, self.channel, None, &self.host)
        }

        fn track(&self) -> TargetId {
            self.host.track_at(0).unwrap()
        }
    }

    #[test]
    fn test_volume_fader() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("TrackVolume", ActionFlags::default());
        ctx.do_action(1.0, &mut rig.env());
        let t = rig.track();
        let gain = rig.host.get_number(&t, attr::VOLUME).unwrap();
        assert!((crate::host::volume::gain_to_db(gain) - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_toggle_flips_current_state() {
        let mut rig = Rig::new();
        let flags = ActionFlags {
            should_toggle: true,
            ..ActionFlags::default()
        };
        let mut ctx = rig.context("TrackMute", flags);
        let t = rig.track();

        ctx.do_action(1.0, &mut rig.env());
        assert_eq!(rig.host.get_number(&t, attr::MUTE), Some(1.0));
        ctx.do_action(1.0, &mut rig.env());
        assert_eq!(rig.host.get_number(&t, attr::MUTE), Some(0.0));
        ctx.do_action(1.0, &mut rig.env());
        assert_eq!(rig.host.get_number(&t, attr::MUTE), Some(1.0));
    }

    #[test]
    fn test_toggle_dispatches_zero_as_is() {
        let mut rig = Rig::new();
        let flags = ActionFlags {
            should_toggle: true,
            ..ActionFlags::default()
        };
        let mut ctx = rig.context("TrackMute", flags);
        let t = rig.track();

        ctx.do_action(1.0, &mut rig.env());
        assert_eq!(rig.host.get_number(&t, attr::MUTE), Some(1.0));
        ctx.do_action(0.0, &mut rig.env());
        assert_eq!(rig.host.get_number(&t, attr::MUTE), Some(0.0));
        assert_eq!(ctx.last_value(), 0.0);
    }

    #[test]
    fn test_stepped_zero_reaches_host() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("TrackPan [ 0 0.5 1 ]", ActionFlags::default());
        let t = rig.track();

        ctx.do_action(1.0, &mut rig.env());
        assert_eq!(ctx.stepped_index(), 1);
        assert_eq!(rig.host.get_number(&t, attr::PAN), Some(0.0));

        ctx.do_action(0.0, &mut rig.env());
        assert_eq!(ctx.stepped_index(), 1, "zero does not advance");
        assert_eq!(ctx.last_value(), 0.0);
        assert_eq!(rig.host.get_number(&t, attr::PAN), Some(-1.0));
    }

    #[test]
    fn test_absolute_input_is_in_action_units() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("TrackVolumeDB", ActionFlags::default());
        let t = rig.track();

        ctx.do_action(-10.0, &mut rig.env());
        assert_eq!(ctx.last_value(), -10.0);
        let gain = rig.host.get_number(&t, attr::VOLUME).unwrap();
        assert!((crate::host::volume::gain_to_db(gain) + 10.0).abs() < 1e-6);

        ctx.do_relative_action(1.5, &mut rig.env());
        assert!((ctx.last_value() + 8.5).abs() < 1e-9);
    }

    #[test]
    fn test_invert_leaves_input_alone() {
        let mut rig = Rig::new();
        let flags = ActionFlags {
            inverted: true,
            ..ActionFlags::default()
        };
        let mut ctx = rig.context("TrackPan", flags);
        let t = rig.track();
        ctx.do_action(1.0, &mut rig.env());
        assert_eq!(ctx.last_value(), 1.0);
        assert_eq!(rig.host.get_number(&t, attr::PAN), Some(1.0));
    }

    #[test]
    fn test_relative_stepped_below_threshold_leaves_host_alone() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("TrackPan [ 0 0.5 1 ]", ActionFlags::default());
        let t = rig.track();
        rig.host.set_number(&t, attr::PAN, 0.3);

        ctx.do_relative_action(0.01, &mut rig.env());
        assert_eq!(rig.host.get_number(&t, attr::PAN), Some(0.3));

        for _ in 0..9 {
            ctx.do_relative_action(0.01, &mut rig.env());
        }
        assert_eq!(ctx.stepped_index(), 1);
        assert_eq!(rig.host.get_number(&t, attr::PAN), Some(0.0));
    }

    #[test]
    fn test_relative_stepped_hold_not_rearmed_by_detents() {
        let mut rig = Rig::new();
        let flags = ActionFlags {
            delay_amount: 1.0,
            ..ActionFlags::default()
        };
        let mut ctx = rig.context("FXParam 0 [ 0.5 1 ]", flags);
        ctx.do_relative_action(0.01, &mut rig.env());
        assert_eq!(ctx.hold_state(), HoldState::Idle);
    }

    #[test]
    fn test_stepped_press_wraps_on_ascending_table() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("TrackPanPercent [ -100 0 100 ]", ActionFlags::default());
        let t = rig.track();

        let mut seen = Vec::new();
        for _ in 0..4 {
            ctx.do_action(1.0, &mut rig.env());
            seen.push((rig.host.get_number(&t, attr::PAN).unwrap() * 100.0).round());
        }
        assert_eq!(seen, vec![0.0, 100.0, -100.0, 0.0]);
    }

    #[test]
    fn test_stepped_press_sticks_on_descending_table() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("FXParam 0 [ 1 0.5 0 ]", ActionFlags::default());
        for _ in 0..5 {
            ctx.do_action(1.0, &mut rig.env());
        }
        assert_eq!(ctx.stepped_index(), 2);
    }

    #[test]
    fn test_relative_uses_delta_and_clamps() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("TrackPan [ (0.25) ]", ActionFlags::default());
        let t = rig.track();

        ctx.do_relative_action(0.01, &mut rig.env());
        assert_eq!(ctx.last_value(), 0.25);
        for _ in 0..10 {
            ctx.do_relative_action(0.01, &mut rig.env());
        }
        assert_eq!(ctx.last_value(), 1.0);
        assert_eq!(rig.host.get_number(&t, attr::PAN), Some(1.0));

        ctx.do_relative_action(-0.5, &mut rig.env());
        assert_eq!(ctx.last_value(), 0.75);
    }

    #[test]
    fn test_range_override_clamps() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("TrackPan [ 0.2>0.8 ]", ActionFlags::default());
        ctx.do_action(1.0, &mut rig.env());
        assert_eq!(ctx.last_value(), 0.8);
        ctx.do_action(0.0, &mut rig.env());
        assert_eq!(ctx.last_value(), 0.2);
    }

    #[test]
    fn test_accelerated_stepped_needs_ticks() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("FXParam 0 [ 0 0.5 1 (2,1) ]", ActionFlags::default());

        ctx.do_accelerated_relative_action(0, 1.0, &mut rig.env());
        assert_eq!(ctx.stepped_index(), 0);
        ctx.do_accelerated_relative_action(0, 1.0, &mut rig.env());
        assert_eq!(ctx.stepped_index(), 1);

        // level 1 steps on every tick; out-of-range levels clamp to the last
        ctx.do_accelerated_relative_action(7, 1.0, &mut rig.env());
        assert_eq!(ctx.stepped_index(), 2);
        ctx.do_accelerated_relative_action(1, -1.0, &mut rig.env());
        assert_eq!(ctx.stepped_index(), 1);
    }

    #[test]
    fn test_relative_stepped_waits_for_default_ticks() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("FXParam 0 [ 0 0.5 1 ]", ActionFlags::default());
        for _ in 0..9 {
            ctx.do_relative_action(0.01, &mut rig.env());
        }
        assert_eq!(ctx.stepped_index(), 0);
        ctx.do_relative_action(0.01, &mut rig.env());
        assert_eq!(ctx.stepped_index(), 1);
    }

    #[test]
    fn test_accelerated_delta_table() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("FXParam 0 [ (0.01,0.1) ]", ActionFlags::default());
        ctx.do_accelerated_relative_action(1, 1.0, &mut rig.env());
        assert!((ctx.last_value() - 0.1).abs() < 1e-9);
        ctx.do_accelerated_relative_action(0, -1.0, &mut rig.env());
        assert!((ctx.last_value() - 0.09).abs() < 1e-9);
    }

    #[test]
    fn test_hold_defers_until_delay_elapsed() {
        let mut rig = Rig::new();
        let flags = ActionFlags {
            delay_amount: 1.0,
            ..ActionFlags::default()
        };
        let mut ctx = rig.context("NextPage", flags);

        ctx.do_action(1.0, &mut rig.env());
        assert!(matches!(ctx.hold_state(), HoldState::Deferred { .. }));
        rig.host.advance_ms(500.0);
        ctx.run_deferred(&mut rig.env());
        assert!(rig.effects.is_empty());

        rig.host.advance_ms(600.0);
        ctx.run_deferred(&mut rig.env());
        assert_eq!(rig.effects, vec![ActionEffect::Page(PageCommand::NextPage)]);
        assert_eq!(ctx.hold_state(), HoldState::Idle);
    }

    #[test]
    fn test_release_cancels_hold() {
        let mut rig = Rig::new();
        let flags = ActionFlags {
            delay_amount: 1.0,
            ..ActionFlags::default()
        };
        let mut ctx = rig.context("NextPage", flags);
        ctx.do_action(1.0, &mut rig.env());
        ctx.do_release(&mut rig.env());
        rig.host.advance_ms(2000.0);
        ctx.run_deferred(&mut rig.env());
        assert!(rig.effects.is_empty());
    }

    #[test]
    fn test_release_reaches_modifiers_only_when_wanted() {
        let mut rig = Rig::new();
        let mut shift = rig.context("Shift", ActionFlags::default());
        shift.do_action(1.0, &mut rig.env());
        assert!(rig.modifiers.shift);
        shift.do_release(&mut rig.env());
        assert!(!rig.modifiers.shift);

        let mut play = rig.context("Play", ActionFlags::default());
        assert!(!play.wants_release());
        play.do_release(&mut rig.env());
        assert!(!rig.host.transport().playing);
    }

    #[test]
    fn test_unknown_command_falls_back() {
        let rig = Rig::new();
        let ctx = rig.context("Reaper _NOT_THERE", ActionFlags::default());
        assert_eq!(ctx.param(), &ContextParam::Command(UNKNOWN_COMMAND));
        let ctx = rig.context("Reaper 40001", ActionFlags::default());
        assert_eq!(ctx.param(), &ContextParam::Command(40001));
    }

    #[test]
    fn test_fx_param_display_name_and_style() {
        let rig = Rig::new();
        let ctx = rig.context(r#"FXParamNameDisplay 4 "Freq" 2"#, ActionFlags::default());
        assert_eq!(
            ctx.param(),
            &ContextParam::FxParam {
                index: 4,
                display_name: Some("Freq".to_string()),
                display_style: Some(2),
            }
        );
    }

    #[test]
    fn test_feedback_inverts_and_tracks_stepped_index() {
        let mut rig = Rig::new();
        let flags = ActionFlags {
            inverted: true,
            ..ActionFlags::default()
        };
        let mut ctx = rig.context("TrackPan [ 0 0.25 0.5 ]", flags);
        let mut widget = Widget::new("Knob1");
        widget.add_feedback(FeedbackProcessor::new(FeedbackKind::Fader7Bit {
            status: 0xB0,
            data1: 0x10,
        }));
        let mut outbox = Outbox::default();

        let t = rig.track();
        rig.host.set_number(&t, attr::PAN, 0.0);
        let mut env = FeedbackEnv {
            poll: dispatch::PollEnv {
                host: &rig.host,
                nav: &rig.nav,
                modifiers: &rig.modifiers,
                flags: SurfaceFlags::default(),
            },
            now_ms: 0.0,
            outbox: &mut outbox,
        };
        ctx.request_update(&mut widget, &mut env);

        assert_eq!(ctx.stepped_index(), 2, "inverted 0.5 -> 0.5");
        assert_eq!(outbox.drain(), vec![WireMessage::Midi([0xB0, 0x10, 64])]);
    }

    #[test]
    fn test_unresolved_target_skips_dispatch_and_clears() {
        let mut rig = Rig::new();
        let mut ctx = rig.context("TrackMute", ActionFlags::default());
        for t in rig.nav.tracks().to_vec() {
            rig.host.remove_track(&t);
        }
        ctx.do_action(1.0, &mut rig.env());
        assert_eq!(ctx.last_value(), 0.0);
    }

    #[test]
    fn test_color_table_feedback() {
        let rig = Rig::new();
        let ctx = rig.context("TrackMute { 0 0 0 255 0 0 }", ActionFlags::default());
        assert_eq!(ctx.feedback_color(0.0, None, &rig.host), Some(Rgb::new(0, 0, 0)));
        assert_eq!(ctx.feedback_color(1.0, None, &rig.host), Some(Rgb::new(255, 0, 0)));

        let single = rig.context("TrackMute { 0 255 0 }", ActionFlags::default());
        assert_eq!(single.feedback_color(1.0, None, &rig.host), Some(Rgb::new(0, 255, 0)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn table(values: &[u32]) -> String {
            let steps: Vec<String> = values.iter().map(|v| format!("{:.2}", *v as f64 / 100.0)).collect();
            format!("FXParam 0 [ {} ]", steps.join(" "))
        }

        proptest! {
            #[test]
            fn prop_range_bound_output_stays_in_range(value in -1.0e6f64..1.0e6) {
                let mut rig = Rig::new();
                let mut ctx = rig.context("TrackPan [ 0.2>0.8 ]", ActionFlags::default());
                ctx.do_action(value, &mut rig.env());
                prop_assert!((0.2..=0.8).contains(&ctx.last_value()));
                ctx.do_relative_action(value, &mut rig.env());
                prop_assert!((0.2..=0.8).contains(&ctx.last_value()));
            }

            #[test]
            fn prop_inversion_round_trips(value in 0.0f64..=1.0) {
                let rig = Rig::new();
                let flags = ActionFlags {
                    inverted: true,
                    ..ActionFlags::default()
                };
                let mut ctx = rig.context("TrackPan", flags);
                let mut widget = Widget::new("Knob1");
                let mut outbox = Outbox::default();
                let mut env = FeedbackEnv {
                    poll: dispatch::PollEnv {
                        host: &rig.host,
                        nav: &rig.nav,
                        modifiers: &rig.modifiers,
                        flags: SurfaceFlags::default(),
                    },
                    now_ms: 0.0,
                    outbox: &mut outbox,
                };
                ctx.update_widget_value(value, None, &mut widget, &mut env);
                let once = ctx.last_value();
                ctx.update_widget_value(once, None, &mut widget, &mut env);
                prop_assert!((ctx.last_value() - value).abs() < 1e-12);
            }

            #[test]
            fn prop_ascending_table_wraps(values in proptest::collection::btree_set(0u32..100, 2..6)) {
                let values: Vec<u32> = values.into_iter().collect();
                let mut rig = Rig::new();
                let mut ctx = rig.context(&table(&values), ActionFlags::default());
                for _ in 0..values.len() {
                    ctx.do_action(1.0, &mut rig.env());
                }
                prop_assert_eq!(ctx.stepped_index(), 0);
            }

            #[test]
            fn prop_descending_table_clamps(
                values in proptest::collection::btree_set(0u32..100, 2..6),
                extra in 0usize..5,
            ) {
                let values: Vec<u32> = values.into_iter().rev().collect();
                let mut rig = Rig::new();
                let mut ctx = rig.context(&table(&values), ActionFlags::default());
                for _ in 0..values.len() + extra {
                    ctx.do_action(1.0, &mut rig.env());
                }
                prop_assert_eq!(ctx.stepped_index(), values.len() - 1);
            }
        }
    }
}
