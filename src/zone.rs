//! Zone templates and live zones
//!
//! A [`ZoneTemplate`] is the immutable result of compiling one `Zone` block.
//! Activating it against a surface produces one [`Zone`] per navigator the
//! template was declared against, each owning the brokers (and therefore the
//! action contexts) for the widgets it binds. Widgets themselves stay owned
//! by the surface; a zone only refers to them by [`WidgetId`].

use crate::action::{ActionContext, ActionRegistry};
use crate::broker::{ActionBundle, WidgetActionBroker};
use crate::compiler::PLACEHOLDER;
use crate::host::{Host, TargetId};
use crate::navigation::{NavigatorId, TrackNavigationManager};
use crate::widget::WidgetId;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::{debug, trace};

/// Per-action flags taken from the widget spec (`PR+Invert+Toggle+Hold+Fader1`)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActionFlags {
    pub supports_release: bool,
    pub inverted: bool,
    pub should_toggle: bool,
    /// Hold delay in seconds, 0.0 when not held
    pub delay_amount: f64,
}

/// One action invocation inside a widget/modifier slot
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTemplate {
    pub action_name: String,
    /// Full parameter list; `params[0]` is the action name
    pub params: Vec<String>,
    pub flags: ActionFlags,
}

/// All actions bound to a widget under one modifier string
#[derive(Debug, Clone, PartialEq)]
pub struct ActionBundleTemplate {
    pub modifier: String,
    pub actions: Vec<ActionTemplate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetActionTemplate {
    pub widget_name: String,
    /// The widget drives a modifier key itself
    pub is_modifier: bool,
    pub bundles: Vec<ActionBundleTemplate>,
}

/// Which navigator family a zone binds against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigatorBinding {
    #[default]
    Global,
    Track,
    MasterTrack,
    SelectedTrack,
    FocusedFx,
    Send,
}

impl NavigatorBinding {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "TrackNavigator" => Some(Self::Track),
            "MasterTrackNavigator" => Some(Self::MasterTrack),
            "SelectedTrackNavigator" => Some(Self::SelectedTrack),
            "FocusedFXNavigator" => Some(Self::FocusedFx),
            "SendNavigator" => Some(Self::Send),
            _ => None,
        }
    }
}

/// The navigators a surface offers to its zone templates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceNavigators {
    pub channels: Vec<NavigatorId>,
    pub sends: Vec<NavigatorId>,
    pub global: NavigatorId,
    pub selected_track: NavigatorId,
    pub master_track: NavigatorId,
    pub focused_fx: NavigatorId,
}

impl SurfaceNavigators {
    /// Navigators a binding expands to.
    pub fn for_binding(&self, binding: NavigatorBinding) -> Vec<NavigatorId> {
        match binding {
            NavigatorBinding::Global => vec![self.global],
            NavigatorBinding::Track => self.channels.clone(),
            NavigatorBinding::Send => self.sends.clone(),
            NavigatorBinding::MasterTrack => vec![self.master_track],
            NavigatorBinding::SelectedTrack => vec![self.selected_track],
            NavigatorBinding::FocusedFx => vec![self.focused_fx],
        }
    }
}

/// Immutable compiled zone blueprint
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneTemplate {
    pub name: String,
    pub alias: String,
    pub source_path: PathBuf,
    pub included_zones: Vec<String>,
    pub widget_action_templates: Vec<WidgetActionTemplate>,
    pub binding: NavigatorBinding,
    pub navigators: Vec<NavigatorId>,
}

/// Zone templates of one surface, by name
pub type ZoneCatalogue = HashMap<String, ZoneTemplate>;

/// Stable id of a live zone within its surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(pub u64);

/// How a template is being activated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationRequest {
    /// FX slot for FX / FX-menu zones. Only single-navigator templates
    /// can be activated with a slot.
    pub slot_index: Option<usize>,
    pub open_editor: bool,
    /// Bind every action as NoAction (unmapped FX-menu slots)
    pub use_no_action: bool,
}

impl ActivationRequest {
    pub fn slot(slot_index: usize) -> Self {
        Self {
            slot_index: Some(slot_index),
            ..Self::default()
        }
    }
}

/// What activation needs from the surface and page
pub struct ActivationEnv<'a> {
    pub catalogue: &'a ZoneCatalogue,
    pub widgets: &'a HashMap<String, WidgetId>,
    pub registry: &'a ActionRegistry,
    pub nav: &'a TrackNavigationManager,
    pub host: &'a mut dyn Host,
}

/// A live instantiation of a template bound to one navigator
#[derive(Debug)]
pub struct Zone {
    pub name: String,
    pub alias: String,
    pub source_path: PathBuf,
    pub navigator: NavigatorId,
    pub slot_index: Option<usize>,
    pub brokers: BTreeMap<WidgetId, WidgetActionBroker>,
    /// FX editor opened by this zone, closed on deactivation
    pub editor: Option<(TargetId, usize)>,
}

impl Zone {
    pub fn widgets(&self) -> impl Iterator<Item = WidgetId> + '_ {
        self.brokers.keys().copied()
    }

    /// Close the editor this zone opened, if any.
    pub fn close_editor(&mut self, host: &mut dyn Host) {
        if let Some((track, slot)) = self.editor.take() {
            host.close_fx_editor(&track, slot);
        }
    }
}

impl ZoneTemplate {
    /// Instantiate this template and, before it, every included zone.
    ///
    /// Zones are returned in installation order: included zones first,
    /// depth first, so installing them in order lets the outer zone's
    /// bindings win on a widget collision.
    pub fn activate(&self, env: &mut ActivationEnv<'_>, request: ActivationRequest) -> Vec<Zone> {
        let mut zones = Vec::new();
        let mut visiting = vec![self.name.clone()];
        self.activate_into(env, request, &mut zones, &mut visiting);
        zones
    }

    fn activate_into(
        &self,
        env: &mut ActivationEnv<'_>,
        request: ActivationRequest,
        zones: &mut Vec<Zone>,
        visiting: &mut Vec<String>,
    ) {
        for included in &self.included_zones {
            if visiting.contains(included) {
                debug!("Zone '{}' includes '{}' recursively, skipped", self.name, included);
                continue;
            }
            let catalogue = env.catalogue;
            match catalogue.get(included) {
                Some(template) => {
                    visiting.push(included.clone());
                    template.activate_into(env, request, zones, visiting);
                    visiting.pop();
                }
                None => debug!("Zone '{}' includes unknown zone '{}'", self.name, included),
            }
        }

        match request.slot_index {
            Some(slot) => {
                let [navigator] = self.navigators.as_slice() else {
                    debug!(
                        "Zone '{}' has {} navigators, cannot bind to slot {}",
                        self.name,
                        self.navigators.len(),
                        slot
                    );
                    return;
                };
                zones.push(self.build_zone(env, request, *navigator, self.name.clone(), ""));
            }
            None => {
                for (i, &navigator) in self.navigators.iter().enumerate() {
                    let channel = (i + 1).to_string();
                    let name = if self.navigators.len() > 1 {
                        format!("{}{}", self.name, channel)
                    } else {
                        self.name.clone()
                    };
                    zones.push(self.build_zone(env, request, navigator, name, &channel));
                }
            }
        }
    }

    fn build_zone(
        &self,
        env: &mut ActivationEnv<'_>,
        request: ActivationRequest,
        navigator: NavigatorId,
        name: String,
        channel: &str,
    ) -> Zone {
        trace!("Activating zone '{}'", name);
        let substitute = |s: &str| s.replace(PLACEHOLDER, channel);

        let mut zone = Zone {
            name,
            alias: self.alias.clone(),
            source_path: self.source_path.clone(),
            navigator,
            slot_index: request.slot_index,
            brokers: BTreeMap::new(),
            editor: None,
        };

        for template in &self.widget_action_templates {
            let widget_name = substitute(&template.widget_name);
            let Some(&widget) = env.widgets.get(&widget_name) else {
                debug!("Zone '{}': no widget named '{}'", zone.name, widget_name);
                continue;
            };

            let mut broker = WidgetActionBroker::new(navigator, template.is_modifier);
            for bundle in &template.bundles {
                let mut contexts = Vec::with_capacity(bundle.actions.len());
                for action in &bundle.actions {
                    let params: Vec<String> = action.params.iter().map(|p| substitute(p)).collect();
                    let action_name = if request.use_no_action {
                        "NoAction".to_string()
                    } else {
                        substitute(&action.action_name)
                    };
                    let Some(kind) = env.registry.lookup(&action_name) else {
                        debug!("Zone '{}': unknown action '{}'", zone.name, action_name);
                        continue;
                    };
                    contexts.push(ActionContext::new(
                        kind,
                        &params,
                        action.flags,
                        navigator,
                        request.slot_index,
                        &*env.host,
                    ));
                }
                if !contexts.is_empty() {
                    broker.insert(ActionBundle::new(bundle.modifier.clone(), contexts));
                }
            }
            // a widget left without bindings stays with whatever claimed it before
            if !broker.is_empty() {
                zone.brokers.insert(widget, broker);
            }
        }

        if request.open_editor {
            if let (Some(slot), Some(track)) =
                (request.slot_index, env.nav.resolve(navigator, &*env.host))
            {
                env.host.open_fx_editor(&track, slot);
                zone.editor = Some((track, slot));
            }
        }

        zone
    }
}
