//! Action catalogue, per-binding contexts and dispatch
//!
//! An action is a named operation the engine can run when a widget fires.
//! The catalogue is closed: every action the zone language can name is a
//! variant of [`ActionKind`], and the [`ActionRegistry`] maps names to
//! kinds. Per-binding state lives in [`ActionContext`].

mod context;
mod dispatch;

pub use context::{ActionContext, ContextParam, HoldState};
pub use dispatch::{DispatchEnv, FeedbackEnv, PollEnv, Polled, SurfaceFlags};

use std::collections::HashMap;

/// Every action the zone language can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    NoAction,
    /// Host command by numeric id or symbolic name (`Reaper` in zone files)
    HostCommand,

    Play,
    Stop,
    Record,
    Rewind,
    FastForward,

    TrackVolume,
    TrackVolumeDb,
    TrackPan,
    TrackPanPercent,
    TrackPanWidth,
    TrackPanWidthPercent,
    TrackPanLPercent,
    TrackPanRPercent,
    TrackMute,
    TrackSolo,
    TrackSelect,
    TrackUniqueSelect,
    TrackRecordArm,
    ClearAllSolo,
    TrackNameDisplay,
    TrackVolumeDisplay,
    TrackPanDisplay,
    TrackPanWidthDisplay,

    TrackSendVolume,
    TrackSendVolumeDb,
    TrackSendPan,
    TrackSendMute,
    TrackSendNameDisplay,
    TrackSendVolumeDisplay,

    FxParam,
    FxParamRelative,
    FxNameDisplay,
    FxParamNameDisplay,
    FxParamValueDisplay,
    FocusedFxParam,
    FocusedFxParamNameDisplay,
    FocusedFxParamValueDisplay,

    FixedTextDisplay,
    FixedRgbColourDisplay,

    TrackBank,
    SelectTrackRelative,
    TogglePin,
    ToggleScrollLink,
    ForceScrollLink,

    NextPage,
    GoPage,
    Shift,
    Option,
    Control,
    Alt,
    FaderTouch,
    RotaryTouch,

    GoZone,
    ToggleMapSelectedTrackSends,
    MapSelectedTrackSendsToWidgets,
    ToggleMapSelectedTrackFx,
    MapSelectedTrackFxToWidgets,
    ToggleMapSelectedTrackFxMenu,
    MapSelectedTrackFxToMenu,
    ToggleMapFocusedFx,
    MapFocusedFxToWidgets,
    GoFxSlot,
    SetShowFxWindows,
}

/// Zone-language names, one per kind
const ACTION_NAMES: &[(&str, ActionKind)] = &[
    ("NoAction", ActionKind::NoAction),
    ("Reaper", ActionKind::HostCommand),
    ("Play", ActionKind::Play),
    ("Stop", ActionKind::Stop),
    ("Record", ActionKind::Record),
    ("Rewind", ActionKind::Rewind),
    ("FastForward", ActionKind::FastForward),
    ("TrackVolume", ActionKind::TrackVolume),
    ("TrackVolumeDB", ActionKind::TrackVolumeDb),
    ("TrackPan", ActionKind::TrackPan),
    ("TrackPanPercent", ActionKind::TrackPanPercent),
    ("TrackPanWidth", ActionKind::TrackPanWidth),
    ("TrackPanWidthPercent", ActionKind::TrackPanWidthPercent),
    ("TrackPanLPercent", ActionKind::TrackPanLPercent),
    ("TrackPanRPercent", ActionKind::TrackPanRPercent),
    ("TrackMute", ActionKind::TrackMute),
    ("TrackSolo", ActionKind::TrackSolo),
    ("TrackSelect", ActionKind::TrackSelect),
    ("TrackUniqueSelect", ActionKind::TrackUniqueSelect),
    ("TrackRecordArm", ActionKind::TrackRecordArm),
    ("ClearAllSolo", ActionKind::ClearAllSolo),
    ("TrackNameDisplay", ActionKind::TrackNameDisplay),
    ("TrackVolumeDisplay", ActionKind::TrackVolumeDisplay),
    ("TrackPanDisplay", ActionKind::TrackPanDisplay),
    ("TrackPanWidthDisplay", ActionKind::TrackPanWidthDisplay),
    ("TrackSendVolume", ActionKind::TrackSendVolume),
    ("TrackSendVolumeDB", ActionKind::TrackSendVolumeDb),
    ("TrackSendPan", ActionKind::TrackSendPan),
    ("TrackSendMute", ActionKind::TrackSendMute),
    ("TrackSendNameDisplay", ActionKind::TrackSendNameDisplay),
    ("TrackSendVolumeDisplay", ActionKind::TrackSendVolumeDisplay),
    ("FXParam", ActionKind::FxParam),
    ("FXParamRelative", ActionKind::FxParamRelative),
    ("FXNameDisplay", ActionKind::FxNameDisplay),
    ("FXParamNameDisplay", ActionKind::FxParamNameDisplay),
    ("FXParamValueDisplay", ActionKind::FxParamValueDisplay),
    ("FocusedFXParam", ActionKind::FocusedFxParam),
    ("FocusedFXParamNameDisplay", ActionKind::FocusedFxParamNameDisplay),
    ("FocusedFXParamValueDisplay", ActionKind::FocusedFxParamValueDisplay),
    ("FixedTextDisplay", ActionKind::FixedTextDisplay),
    ("FixedRGBColourDisplay", ActionKind::FixedRgbColourDisplay),
    ("TrackBank", ActionKind::TrackBank),
    ("SelectTrackRelative", ActionKind::SelectTrackRelative),
    ("TogglePin", ActionKind::TogglePin),
    ("ToggleScrollLink", ActionKind::ToggleScrollLink),
    ("ForceScrollLink", ActionKind::ForceScrollLink),
    ("NextPage", ActionKind::NextPage),
    ("GoPage", ActionKind::GoPage),
    ("Shift", ActionKind::Shift),
    ("Option", ActionKind::Option),
    ("Control", ActionKind::Control),
    ("Alt", ActionKind::Alt),
    ("FaderTouch", ActionKind::FaderTouch),
    ("RotaryTouch", ActionKind::RotaryTouch),
    ("GoZone", ActionKind::GoZone),
    ("ToggleMapSelectedTrackSends", ActionKind::ToggleMapSelectedTrackSends),
    ("MapSelectedTrackSendsToWidgets", ActionKind::MapSelectedTrackSendsToWidgets),
    ("ToggleMapSelectedTrackFX", ActionKind::ToggleMapSelectedTrackFx),
    ("MapSelectedTrackFXToWidgets", ActionKind::MapSelectedTrackFxToWidgets),
    ("ToggleMapSelectedTrackFXMenu", ActionKind::ToggleMapSelectedTrackFxMenu),
    ("MapSelectedTrackFXToMenu", ActionKind::MapSelectedTrackFxToMenu),
    ("ToggleMapFocusedFX", ActionKind::ToggleMapFocusedFx),
    ("MapFocusedFXToWidgets", ActionKind::MapFocusedFxToWidgets),
    ("GoFXSlot", ActionKind::GoFxSlot),
    ("SetShowFXWindows", ActionKind::SetShowFxWindows),
];

impl ActionKind {
    /// Name used in zone files
    pub fn name(self) -> &'static str {
        ACTION_NAMES
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("NoAction")
    }

    /// Value range of the action before any `[ lo>hi ]` override
    pub fn default_range(self) -> (f64, f64) {
        match self {
            Self::TrackVolumeDb | Self::TrackSendVolumeDb => (-144.0, 24.0),
            Self::TrackPanPercent
            | Self::TrackPanWidthPercent
            | Self::TrackPanLPercent
            | Self::TrackPanRPercent => (-100.0, 100.0),
            _ => (0.0, 1.0),
        }
    }

    /// Whether the action operates on the track its navigator resolves to.
    /// Such actions skip dispatch and clear their widget when the
    /// navigator resolves to nothing.
    pub fn needs_target(self) -> bool {
        matches!(
            self,
            Self::TrackVolume
                | Self::TrackVolumeDb
                | Self::TrackPan
                | Self::TrackPanPercent
                | Self::TrackPanWidth
                | Self::TrackPanWidthPercent
                | Self::TrackPanLPercent
                | Self::TrackPanRPercent
                | Self::TrackMute
                | Self::TrackSolo
                | Self::TrackSelect
                | Self::TrackUniqueSelect
                | Self::TrackRecordArm
                | Self::TrackNameDisplay
                | Self::TrackVolumeDisplay
                | Self::TrackPanDisplay
                | Self::TrackPanWidthDisplay
                | Self::TrackSendVolume
                | Self::TrackSendVolumeDb
                | Self::TrackSendPan
                | Self::TrackSendMute
                | Self::TrackSendNameDisplay
                | Self::TrackSendVolumeDisplay
                | Self::FxParam
                | Self::FxParamRelative
                | Self::FxNameDisplay
                | Self::FxParamNameDisplay
                | Self::FxParamValueDisplay
        )
    }

    /// Actions that must see button releases even without the `PR` flag
    pub fn handles_release(self) -> bool {
        matches!(
            self,
            Self::Shift | Self::Option | Self::Control | Self::Alt | Self::FaderTouch | Self::RotaryTouch
        )
    }

    pub fn is_modifier(self) -> bool {
        matches!(self, Self::Shift | Self::Option | Self::Control | Self::Alt)
    }
}

/// Name to kind lookup used when zones are activated
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    by_name: HashMap<&'static str, ActionKind>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            by_name: ACTION_NAMES.iter().copied().collect(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ActionKind> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Something an action asks its surface to do after dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCommand {
    GoZone(String),
    ToggleMapSelectedTrackSends,
    MapSelectedTrackSends,
    ToggleMapSelectedTrackFx,
    MapSelectedTrackFx,
    ToggleMapSelectedTrackFxMenu,
    MapSelectedTrackFxToMenu,
    ToggleMapFocusedFx,
    MapFocusedFx,
    GoFxSlot(usize),
    ToggleShowFxWindows,
}

/// Something an action asks the session to do after dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum PageCommand {
    NextPage,
    GoPage(String),
}

/// Deferred structural effect of an action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEffect {
    Surface(SurfaceCommand),
    Page(PageCommand),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_registry() {
        let registry = ActionRegistry::new();
        assert_eq!(registry.len(), ACTION_NAMES.len());
        for (name, kind) in ACTION_NAMES {
            assert_eq!(registry.lookup(name), Some(*kind));
            assert_eq!(kind.name(), *name);
        }
        assert_eq!(registry.lookup("TrackVolumeDb"), None);
        assert_eq!(registry.lookup("Bogus"), None);
    }

    #[test]
    fn test_default_ranges() {
        assert_eq!(ActionKind::TrackVolumeDb.default_range(), (-144.0, 24.0));
        assert_eq!(ActionKind::TrackPanPercent.default_range(), (-100.0, 100.0));
        assert_eq!(ActionKind::FxParam.default_range(), (0.0, 1.0));
    }

    #[test]
    fn test_release_and_modifier_classes() {
        assert!(ActionKind::Shift.handles_release());
        assert!(ActionKind::FaderTouch.handles_release());
        assert!(!ActionKind::FaderTouch.is_modifier());
        assert!(!ActionKind::Play.handles_release());
        assert!(ActionKind::FxParam.needs_target());
        assert!(!ActionKind::FocusedFxParam.needs_target());
    }
}
