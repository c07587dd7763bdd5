//! Modifier-keyed action bundles and per-widget resolution
//!
//! Every widget bound by a zone gets one [`WidgetActionBroker`]. On each
//! event the broker picks the bundle for the current modifier chord,
//! falling back from the touch-qualified key to the plain key to the empty
//! key. When nothing matches the caller uses the surface's default bundle.

use crate::action::ActionContext;
use crate::navigation::{NavigatorId, TrackNavigationManager};
use std::collections::HashMap;

/// Modifier names in canonical slot order
pub const MODIFIER_SLOTS: [&str; 6] = [
    "Shift",
    "Option",
    "Control",
    "Alt",
    "FaderTouch",
    "RotaryTouch",
];

/// Build the canonical modifier string for the held names, e.g.
/// `["Alt", "Shift"]` -> `"Shift+Alt+"`.
pub fn canonical_modifier(held: &[&str]) -> String {
    MODIFIER_SLOTS
        .iter()
        .filter(|slot| held.contains(*slot))
        .map(|slot| format!("{slot}+"))
        .collect()
}

/// Actions that drive a modifier key
pub fn is_modifier_action(action_name: &str) -> bool {
    MODIFIER_SLOTS[..4].contains(&action_name)
}

/// The four modifier keys of a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub option: bool,
    pub control: bool,
    pub alt: bool,
}

impl Modifiers {
    /// Canonical string of the held keys, `""` when none are held.
    pub fn as_modifier_string(&self) -> String {
        let held: Vec<&str> = [
            (self.shift, "Shift"),
            (self.option, "Option"),
            (self.control, "Control"),
            (self.alt, "Alt"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
        canonical_modifier(&held)
    }

    /// Set a key by name. Unknown names are ignored.
    pub fn set(&mut self, name: &str, held: bool) {
        match name {
            "Shift" => self.shift = held,
            "Option" => self.option = held,
            "Control" => self.control = held,
            "Alt" => self.alt = held,
            _ => {}
        }
    }
}

/// All contexts bound to one widget under one modifier chord
#[derive(Debug)]
pub struct ActionBundle {
    modifier: String,
    contexts: Vec<ActionContext>,
}

impl ActionBundle {
    pub fn new(modifier: String, contexts: Vec<ActionContext>) -> Self {
        Self { modifier, contexts }
    }

    pub fn modifier(&self) -> &str {
        &self.modifier
    }

    pub fn contexts(&self) -> &[ActionContext] {
        &self.contexts
    }

    pub fn contexts_mut(&mut self) -> &mut [ActionContext] {
        &mut self.contexts
    }
}

/// Per-widget set of bundles inside one zone
#[derive(Debug)]
pub struct WidgetActionBroker {
    navigator: NavigatorId,
    is_modifier: bool,
    bundles: HashMap<String, ActionBundle>,
}

impl WidgetActionBroker {
    pub fn new(navigator: NavigatorId, is_modifier: bool) -> Self {
        Self {
            navigator,
            is_modifier,
            bundles: HashMap::new(),
        }
    }

    pub fn insert(&mut self, bundle: ActionBundle) {
        self.bundles.insert(bundle.modifier.clone(), bundle);
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn bundle(&self, modifier: &str) -> Option<&ActionBundle> {
        self.bundles.get(modifier)
    }

    pub fn navigator(&self) -> NavigatorId {
        self.navigator
    }

    pub fn is_modifier(&self) -> bool {
        self.is_modifier
    }

    pub fn bundles_mut(&mut self) -> impl Iterator<Item = &mut ActionBundle> {
        self.bundles.values_mut()
    }

    /// Key of the bundle that handles the current chord, `None` when the
    /// surface default applies.
    pub fn resolve_key(&self, modifiers: &Modifiers, nav: &TrackNavigationManager) -> Option<String> {
        if self.is_modifier {
            return self.bundles.contains_key("").then(String::new);
        }

        let modifier = modifiers.as_modifier_string();
        let mut touch = modifier.clone();
        if let Some(navigator) = nav.navigator(self.navigator) {
            if navigator.fader_touched {
                touch.push_str("FaderTouch+");
            }
            if navigator.rotary_touched {
                touch.push_str("RotaryTouch+");
            }
        }

        [touch, modifier, String::new()]
            .into_iter()
            .find(|key| self.bundles.contains_key(key))
    }

    /// The bundle for the current chord.
    pub fn active_bundle_mut(
        &mut self,
        modifiers: &Modifiers,
        nav: &TrackNavigationManager,
    ) -> Option<&mut ActionBundle> {
        let key = self.resolve_key(modifiers, nav)?;
        self.bundles.get_mut(&key)
    }
}
