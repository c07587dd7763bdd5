//! Control surface: one device, its widgets, zones and wire endpoint
//!
//! A surface owns its widgets in an arena and its live zones by [`ZoneId`].
//! Zones are grouped into categories (home, sends, selected-track FX,
//! FX menu, focused FX) so that each category can be torn down and rebuilt
//! on its own. Every re-mapping deactivates the whole previous set before
//! activating the new one.

use crate::action::{ActionEffect, ActionRegistry, DispatchEnv, FeedbackEnv, PollEnv, SurfaceCommand, SurfaceFlags};
use crate::broker::Modifiers;
use crate::compiler::{compile_zone_file, widget_file::InputSpec, zone_files_in, WidgetDefinition};
use crate::host::{Host, TargetId};
use crate::io::{Inbound, Transport};
use crate::navigation::TrackNavigationManager;
use crate::router::feedback::{FeedbackKind, FeedbackProcessor, Outbox, WireMessage};
use crate::router::vendor::{self, VendorBusQueue, VendorCommand, VendorSender, VendorWidgetInfo};
use crate::router::{AddressRouter, InputAction, MessageGenerator, MidiRouter};
use crate::widget::{Widget, WidgetId};
use crate::zone::{ActivationEnv, ActivationRequest, NavigatorBinding, SurfaceNavigators, Zone, ZoneCatalogue, ZoneId, ZoneTemplate};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Zone every surface starts in
pub const HOME_ZONE: &str = "Home";

/// Characters replaced by `_` when a zone name becomes an OSC address
const BAD_ADDRESS_CHARS: &[char] = &[' ', '\\', ':', '*', '?', '"', '<', '>', '|', '.', ',', '(', ')', '/'];

/// Wire protocol a surface speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceProtocol {
    Midi,
    Osc,
    Vendor,
}

/// Slot counts declared for a surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceCounts {
    pub channels: usize,
    pub sends: usize,
    pub fx_slots: usize,
}

/// Traffic echo switches for the operator console
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleFlags {
    #[serde(default)]
    pub surface_in: bool,
    #[serde(default)]
    pub surface_out: bool,
}

/// Page state a surface works against
pub struct SurfaceEnv<'a> {
    pub host: &'a mut dyn Host,
    pub nav: &'a mut TrackNavigationManager,
    pub modifiers: &'a mut Modifiers,
    pub registry: &'a ActionRegistry,
    pub show_fx_windows: bool,
}

/// Zone category a live zone was activated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Home,
    Sends,
    SelectedTrackFx,
    FxMenu,
    FocusedFx,
}

pub struct ControlSurface {
    name: String,
    protocol: SurfaceProtocol,
    counts: SurfaceCounts,
    widgets: Vec<Widget>,
    widget_names: HashMap<String, WidgetId>,
    midi_router: MidiRouter,
    address_router: AddressRouter,
    navigators: SurfaceNavigators,
    zone_folder: Option<PathBuf>,
    catalogue: ZoneCatalogue,
    zones: BTreeMap<ZoneId, Zone>,
    categories: HashMap<ZoneId, Category>,
    next_zone: u64,
    maps: SurfaceFlags,
    transport: Option<Box<dyn Transport>>,
    vendor_queue: Option<VendorBusQueue>,
    outbox: Outbox,
    console: ConsoleFlags,
    fx_area_focused: bool,
    channel_visibility: BTreeMap<i32, bool>,
}

fn zone_address(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if BAD_ADDRESS_CHARS.contains(&c) { '_' } else { c })
        .collect();
    format!("/{cleaned}")
}

impl ControlSurface {
    /// Create a surface and register its navigators with the page.
    pub fn new(
        name: impl Into<String>,
        protocol: SurfaceProtocol,
        counts: SurfaceCounts,
        nav: &mut TrackNavigationManager,
    ) -> Self {
        let navigators = SurfaceNavigators {
            channels: (0..counts.channels).map(|_| nav.add_channel_navigator()).collect(),
            sends: (0..counts.sends).map(|send| nav.add_send_navigator(send)).collect(),
            global: nav.global_navigator(),
            selected_track: nav.selected_track_navigator(),
            master_track: nav.master_track_navigator(),
            focused_fx: nav.focused_fx_navigator(),
        };

        Self {
            name: name.into(),
            protocol,
            counts,
            widgets: Vec::new(),
            widget_names: HashMap::new(),
            midi_router: MidiRouter::new(),
            address_router: AddressRouter::new(),
            navigators,
            zone_folder: None,
            catalogue: ZoneCatalogue::new(),
            zones: BTreeMap::new(),
            categories: HashMap::new(),
            next_zone: 0,
            maps: SurfaceFlags::default(),
            transport: None,
            vendor_queue: (protocol == SurfaceProtocol::Vendor).then(VendorBusQueue::new),
            outbox: Outbox::default(),
            console: ConsoleFlags::default(),
            fx_area_focused: false,
            channel_visibility: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> SurfaceProtocol {
        self.protocol
    }

    pub fn counts(&self) -> SurfaceCounts {
        self.counts
    }

    pub fn navigators(&self) -> &SurfaceNavigators {
        &self.navigators
    }

    pub fn set_transport(&mut self, transport: Option<Box<dyn Transport>>) {
        if transport.is_none() {
            debug!("Surface '{}' has no transport, I/O disabled", self.name);
        }
        self.transport = transport;
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn set_console(&mut self, console: ConsoleFlags) {
        self.console = console;
    }

    /// Handle for the vendor thread; only vendor-bus surfaces have one.
    pub fn vendor_sender(&self) -> Option<VendorSender> {
        self.vendor_queue.as_ref().map(VendorBusQueue::sender)
    }

    pub fn flags(&self) -> SurfaceFlags {
        self.maps
    }

    fn surface_flags(&self, show_fx_windows: bool) -> SurfaceFlags {
        SurfaceFlags {
            show_fx_windows,
            ..self.maps
        }
    }

    pub fn fx_area_focused(&self) -> bool {
        self.fx_area_focused
    }

    pub fn channel_visible(&self, channel: i32) -> Option<bool> {
        self.channel_visibility.get(&channel).copied()
    }

    // -- widgets -----------------------------------------------------------

    /// Add a widget and register its message generators.
    pub fn add_widget(&mut self, definition: WidgetDefinition) -> WidgetId {
        let id = WidgetId(self.widgets.len());
        let mut widget = Widget::new(definition.name.clone());
        for processor in definition.feedback {
            widget.add_feedback(processor);
        }
        for input in definition.inputs {
            match input {
                InputSpec::Midi { kind, message } => {
                    self.midi_router.register(MessageGenerator::new(id, kind, message))
                }
                InputSpec::Address(address) => self.address_router.register(address, id),
            }
        }
        if self.widget_names.insert(definition.name.clone(), id).is_some() {
            debug!("Surface '{}': widget '{}' redefined", self.name, definition.name);
        }
        self.widgets.push(widget);
        id
    }

    pub fn add_widgets(&mut self, definitions: impl IntoIterator<Item = WidgetDefinition>) {
        for definition in definitions {
            self.add_widget(definition);
        }
    }

    pub fn widget(&self, id: WidgetId) -> Option<&Widget> {
        self.widgets.get(id.0)
    }

    pub fn widget_id(&self, name: &str) -> Option<WidgetId> {
        self.widget_names.get(name).copied()
    }

    pub fn widget_count(&self) -> usize {
        self.widgets.len()
    }

    // -- zone templates ----------------------------------------------------

    /// Add templates to the catalogue; a later template replaces an earlier
    /// one with the same name.
    pub fn add_zone_templates(&mut self, templates: impl IntoIterator<Item = ZoneTemplate>) {
        for template in templates {
            if let Some(previous) = self.catalogue.insert(template.name.clone(), template) {
                debug!(
                    "Surface '{}': zone '{}' from {} replaced",
                    self.name,
                    previous.name,
                    previous.source_path.display()
                );
            }
        }
    }

    /// Compile every `.zon` file under `dir` into the catalogue.
    pub fn load_zone_folder(&mut self, dir: &Path) -> Result<usize> {
        self.zone_folder = Some(dir.to_path_buf());
        let files = zone_files_in(dir)?;
        let before = self.catalogue.len();
        for file in &files {
            let compiled = compile_zone_file(file, &self.navigators);
            self.add_zone_templates(compiled.templates);
        }
        let added = self.catalogue.len().saturating_sub(before);
        info!(
            "📂 Surface '{}': {} zones from {} files in {}",
            self.name,
            added,
            files.len(),
            dir.display()
        );
        Ok(added)
    }

    pub fn zone_template(&self, name: &str) -> Option<&ZoneTemplate> {
        self.catalogue.get(name)
    }

    pub fn zone_template_count(&self) -> usize {
        self.catalogue.len()
    }

    // -- live zones --------------------------------------------------------

    pub fn active_zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    fn zone_ids(&self, category: Category) -> Vec<ZoneId> {
        self.zones
            .keys()
            .filter(|id| self.categories.get(id) == Some(&category))
            .copied()
            .collect()
    }

    /// Names of the live zones, in activation order.
    pub fn active_zone_names(&self) -> Vec<&str> {
        self.zones.values().map(|z| z.name.as_str()).collect()
    }

    /// Zone currently driving the named widget.
    pub fn widget_zone(&self, widget: &str) -> Option<&Zone> {
        let id = self.widget_id(widget)?;
        let zone = self.widgets[id.0].current_zone?;
        self.zones.get(&zone)
    }

    fn loading_zone(&mut self, name: &str) {
        if self.protocol == SurfaceProtocol::Osc {
            self.outbox.push(WireMessage::OscBare {
                address: zone_address(name),
            });
        }
        if self.console.surface_out {
            info!("{} -> LoadingZone ----> {}", name, self.name);
        }
    }

    fn install(&mut self, zones: Vec<Zone>, category: Category) {
        for zone in zones {
            self.loading_zone(&zone.name);
            let id = ZoneId(self.next_zone);
            self.next_zone += 1;
            for widget in zone.widgets() {
                if let Some(w) = self.widgets.get_mut(widget.0) {
                    w.current_zone = Some(id);
                }
            }
            self.categories.insert(id, category);
            self.zones.insert(id, zone);
        }
    }

    fn activate(&mut self, name: &str, request: ActivationRequest, category: Category, env: &mut SurfaceEnv<'_>) -> bool {
        let Some(template) = self.catalogue.get(name) else {
            debug!("Surface '{}': no zone named '{}'", self.name, name);
            return false;
        };
        let mut activation = ActivationEnv {
            catalogue: &self.catalogue,
            widgets: &self.widget_names,
            registry: env.registry,
            nav: &*env.nav,
            host: &mut *env.host,
        };
        let zones = template.activate(&mut activation, request);
        self.install(zones, category);
        true
    }

    /// Tear down one live zone. Widgets it still drives fall back to the
    /// surface default and are cleared.
    fn deactivate(&mut self, id: ZoneId, host: &mut dyn Host) {
        let Some(mut zone) = self.zones.remove(&id) else {
            return;
        };
        self.categories.remove(&id);
        trace!("Deactivating zone '{}'", zone.name);
        zone.close_editor(host);
        let now = host.now_ms();
        for widget in zone.widgets() {
            if let Some(w) = self.widgets.get_mut(widget.0) {
                if w.current_zone == Some(id) {
                    w.current_zone = None;
                    w.clear(now, &mut self.outbox);
                }
            }
        }
    }

    fn deactivate_category(&mut self, category: Category, host: &mut dyn Host) {
        for id in self.zone_ids(category) {
            self.deactivate(id, host);
        }
    }

    /// Replace the home zones with the named zone.
    pub fn go_zone(&mut self, name: &str, env: &mut SurfaceEnv<'_>) {
        if !self.catalogue.contains_key(name) {
            debug!("Surface '{}': GoZone to unknown zone '{}'", self.name, name);
            return;
        }
        self.deactivate_category(Category::Home, env.host);
        self.activate(name, ActivationRequest::default(), Category::Home, env);
    }

    pub fn go_home(&mut self, env: &mut SurfaceEnv<'_>) {
        self.go_zone(HOME_ZONE, env);
    }

    /// Send mapping is declared but never activates zones; it only tears
    /// down what is mapped.
    pub fn toggle_map_selected_track_sends(&mut self, env: &mut SurfaceEnv<'_>) {
        self.maps.map_sends = !self.maps.map_sends;
        if !self.maps.map_sends {
            self.deactivate_category(Category::Sends, env.host);
        }
        self.map_selected_track_sends(env);
    }

    pub fn map_selected_track_sends(&mut self, env: &mut SurfaceEnv<'_>) {
        self.deactivate_category(Category::Sends, env.host);
        if self.maps.map_sends && env.nav.selected_track().is_some() {
            debug!("Surface '{}': send zones are not mapped", self.name);
        }
    }

    pub fn toggle_map_selected_track_fx(&mut self, env: &mut SurfaceEnv<'_>) {
        self.maps.map_fx = !self.maps.map_fx;
        if self.maps.map_fx {
            self.map_selected_track_fx(env);
        } else {
            self.deactivate_category(Category::SelectedTrackFx, env.host);
        }
    }

    /// Activate one zone per FX on the selected track that has a
    /// single-navigator template of the same name.
    pub fn map_selected_track_fx(&mut self, env: &mut SurfaceEnv<'_>) {
        if !self.maps.map_fx {
            return;
        }
        self.deactivate_category(Category::SelectedTrackFx, env.host);
        let Some(track) = env.nav.selected_track().cloned() else {
            return;
        };
        for slot in 0..env.host.fx_count(&track) {
            self.map_fx_slot(&track, slot, env);
        }
    }

    fn map_fx_slot(&mut self, track: &TargetId, slot: usize, env: &mut SurfaceEnv<'_>) {
        let Some(fx_name) = env.host.fx_name(track, slot) else {
            return;
        };
        let eligible = self.catalogue.get(&fx_name).is_some_and(|t| {
            t.navigators.len() == 1 && t.binding != NavigatorBinding::FocusedFx
        });
        if !eligible {
            trace!("Surface '{}': no FX zone for '{}'", self.name, fx_name);
            return;
        }
        let request = ActivationRequest {
            slot_index: Some(slot),
            open_editor: env.show_fx_windows,
            use_no_action: false,
        };
        self.activate(&fx_name, request, Category::SelectedTrackFx, env);
    }

    pub fn toggle_map_selected_track_fx_menu(&mut self, env: &mut SurfaceEnv<'_>) {
        self.maps.map_fx_menu = !self.maps.map_fx_menu;
        if !self.maps.map_fx_menu {
            self.deactivate_category(Category::FxMenu, env.host);
        }
        self.map_selected_track_fx_to_menu(env);
    }

    /// Activate `FXMenu1..=FXMenuN`; slots past the track's last FX bind
    /// as no-ops.
    pub fn map_selected_track_fx_to_menu(&mut self, env: &mut SurfaceEnv<'_>) {
        self.deactivate_category(Category::FxMenu, env.host);
        if !self.maps.map_fx_menu {
            return;
        }
        let Some(track) = env.nav.selected_track().cloned() else {
            return;
        };
        let fx_count = env.host.fx_count(&track);
        for slot in 0..self.counts.fx_slots {
            let request = ActivationRequest {
                slot_index: Some(slot),
                open_editor: false,
                use_no_action: slot >= fx_count,
            };
            self.activate(&format!("FXMenu{}", slot + 1), request, Category::FxMenu, env);
        }
    }

    pub fn toggle_map_focused_fx(&mut self, env: &mut SurfaceEnv<'_>) {
        self.maps.map_focused_fx = !self.maps.map_focused_fx;
        self.map_focused_fx(env);
    }

    /// Bind the focused FX to a template declared against the focused-FX
    /// navigator.
    pub fn map_focused_fx(&mut self, env: &mut SurfaceEnv<'_>) {
        self.deactivate_category(Category::FocusedFx, env.host);
        if !self.maps.map_focused_fx {
            return;
        }
        let Some((track, slot)) = env.host.focused_fx() else {
            return;
        };
        let Some(fx_name) = env.host.fx_name(&track, slot) else {
            return;
        };
        if self
            .catalogue
            .get(&fx_name)
            .is_some_and(|t| t.binding == NavigatorBinding::FocusedFx)
        {
            self.activate(&fx_name, ActivationRequest::slot(slot), Category::FocusedFx, env);
        }
    }

    /// Map one FX slot of the selected track.
    pub fn go_fx_slot(&mut self, slot: usize, env: &mut SurfaceEnv<'_>) {
        if let Some(track) = env.nav.selected_track().cloned() {
            self.map_fx_slot(&track, slot, env);
        }
    }

    /// Re-derive every selection-driven map.
    pub fn on_track_selection(&mut self, env: &mut SurfaceEnv<'_>) {
        self.map_selected_track_sends(env);
        self.map_selected_track_fx(env);
        self.map_selected_track_fx_to_menu(env);
    }

    pub fn on_fx_focus(&mut self, env: &mut SurfaceEnv<'_>) {
        self.map_focused_fx(env);
    }

    /// Apply structural effects. Effects the page owns are handed back.
    pub fn apply_effects(&mut self, effects: Vec<ActionEffect>, env: &mut SurfaceEnv<'_>) -> Vec<ActionEffect> {
        let mut forwarded = Vec::new();
        for effect in effects {
            let ActionEffect::Surface(command) = effect else {
                forwarded.push(effect);
                continue;
            };
            debug!("Surface '{}': {:?}", self.name, command);
            match command {
                SurfaceCommand::GoZone(name) => self.go_zone(&name, env),
                SurfaceCommand::ToggleMapSelectedTrackSends => self.toggle_map_selected_track_sends(env),
                SurfaceCommand::MapSelectedTrackSends => self.map_selected_track_sends(env),
                SurfaceCommand::ToggleMapSelectedTrackFx => self.toggle_map_selected_track_fx(env),
                SurfaceCommand::MapSelectedTrackFx => self.map_selected_track_fx(env),
                SurfaceCommand::ToggleMapSelectedTrackFxMenu => self.toggle_map_selected_track_fx_menu(env),
                SurfaceCommand::MapSelectedTrackFxToMenu => self.map_selected_track_fx_to_menu(env),
                SurfaceCommand::ToggleMapFocusedFx => self.toggle_map_focused_fx(env),
                SurfaceCommand::MapFocusedFx => self.map_focused_fx(env),
                SurfaceCommand::GoFxSlot(slot) => self.go_fx_slot(slot, env),
                SurfaceCommand::ToggleShowFxWindows => {
                    forwarded.push(ActionEffect::Surface(SurfaceCommand::ToggleShowFxWindows))
                }
            }
        }
        forwarded
    }

    // -- input -------------------------------------------------------------

    /// Deliver one trigger to a widget's active bundle.
    pub fn handle_widget_input(
        &mut self,
        widget: WidgetId,
        input: InputAction,
        env: &mut SurfaceEnv<'_>,
        effects: &mut Vec<ActionEffect>,
    ) {
        let Some(w) = self.widgets.get(widget.0) else {
            return;
        };
        if self.console.surface_in {
            info!("IN <- {} {} {:?}", self.name, w.name, input);
        } else {
            trace!("IN <- {} {} {:?}", self.name, w.name, input);
        }
        let Some(zone) = w.current_zone else {
            trace!("'{}' is on the default bundle", w.name);
            return;
        };

        let flags = self.surface_flags(env.show_fx_windows);
        let Some(broker) = self.zones.get_mut(&zone).and_then(|z| z.brokers.get_mut(&widget)) else {
            return;
        };
        let Some(bundle) = broker.active_bundle_mut(env.modifiers, env.nav) else {
            trace!("No bundle for the current modifiers, default applies");
            return;
        };

        let mut dispatch = DispatchEnv {
            host: &mut *env.host,
            nav: &mut *env.nav,
            modifiers: &mut *env.modifiers,
            flags,
            effects,
        };
        for context in bundle.contexts_mut() {
            match input {
                InputAction::Absolute(value) => context.do_action(value, &mut dispatch),
                InputAction::Release => context.do_release(&mut dispatch),
                InputAction::Relative(delta) => context.do_relative_action(delta, &mut dispatch),
                InputAction::AcceleratedRelative { index, delta } => {
                    context.do_accelerated_relative_action(index, delta, &mut dispatch)
                }
            }
        }
    }

    /// Press a widget by name, as the vendor bus does for focus events.
    pub fn fire_widget(&mut self, name: &str, value: f64, env: &mut SurfaceEnv<'_>, effects: &mut Vec<ActionEffect>) -> bool {
        match self.widget_id(name) {
            Some(id) => {
                self.handle_widget_input(id, InputAction::Absolute(value), env, effects);
                true
            }
            None => false,
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound, env: &mut SurfaceEnv<'_>, effects: &mut Vec<ActionEffect>) {
        let routed = match &inbound {
            Inbound::Midi(evt) => self.midi_router.route(evt),
            Inbound::Osc { address, value } => self.address_router.route(address, *value).into_iter().collect(),
        };
        if routed.is_empty() && self.console.surface_in {
            info!("IN <- {} {:?} (unmapped)", self.name, inbound);
        }
        for (widget, input) in routed {
            self.handle_widget_input(widget, input, env, effects);
        }
    }

    /// Drain the transport and the vendor queue, dispatch everything, and
    /// return the effects this surface does not handle itself.
    pub fn poll_input(&mut self, env: &mut SurfaceEnv<'_>) -> Vec<ActionEffect> {
        let mut effects = Vec::new();

        let inbound = self.transport.as_mut().map(|t| t.receive()).unwrap_or_default();
        for message in inbound {
            self.handle_inbound(message, env, &mut effects);
        }

        let commands = self.vendor_queue.as_ref().map(VendorBusQueue::drain).unwrap_or_default();
        for command in commands {
            self.handle_vendor_command(command, env, &mut effects);
        }

        self.apply_effects(effects, env)
    }

    /// Drop pending input without dispatching it.
    pub fn discard_input(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.receive();
        }
    }

    // -- vendor bus ----------------------------------------------------------

    fn handle_vendor_command(&mut self, command: VendorCommand, env: &mut SurfaceEnv<'_>, effects: &mut Vec<ActionEffect>) {
        match command {
            VendorCommand::Double { address, value } => {
                if self.console.surface_in {
                    info!("IN <- {} {} {}", self.name, address, value);
                }
                match address.as_str() {
                    vendor::POST_MESSAGE => env.host.invoke_command(value as u32),
                    vendor::LAYOUT_CHANGED => debug!("Vendor layout changed"),
                    _ => {
                        if let Some((widget, input)) = self.address_router.route(&address, value) {
                            self.handle_widget_input(widget, input, env, effects);
                        }
                    }
                }
            }
            VendorCommand::Text { address, value } => {
                trace!("Vendor text for {} ignored: {}", address, value);
            }
            VendorCommand::VisibilityChange { group, channel, visible } => {
                self.handle_visibility_change(&group, channel, visible, env, effects)
            }
            VendorCommand::RegisterWidgets(infos) => self.register_vendor_widgets(infos, env),
        }
    }

    fn handle_visibility_change(
        &mut self,
        group: &str,
        channel: i32,
        visible: bool,
        env: &mut SurfaceEnv<'_>,
        effects: &mut Vec<ActionEffect>,
    ) {
        match group {
            "FX" => {
                let widget = if visible {
                    vendor::FX_AREA_GAINED_FOCUS
                } else {
                    vendor::FX_AREA_LOST_FOCUS
                };
                if self.fire_widget(widget, 1.0, env, effects) {
                    self.fx_area_focused = visible;
                }
            }
            "Channel" => {
                self.channel_visibility.insert(channel, visible);
            }
            other => trace!("Vendor group '{}' visibility {}", other, visible),
        }
    }

    /// Create widgets announced by the vendor bus, then load zones and go
    /// home as a freshly built surface does.
    pub fn register_vendor_widgets(&mut self, infos: Vec<VendorWidgetInfo>, env: &mut SurfaceEnv<'_>) {
        let mut added = 0;
        for info in infos {
            if info.name.is_empty() {
                continue;
            }
            let mut definition = WidgetDefinition {
                name: info.name,
                inputs: Vec::new(),
                feedback: Vec::new(),
            };
            if !info.control.is_empty() {
                definition.inputs.push(InputSpec::Address(info.control));
            }
            if !info.feedback.is_empty() {
                let db = info.feedback.contains("FaderDB");
                definition.feedback.push(FeedbackProcessor::new(FeedbackKind::Vendor {
                    address: info.feedback,
                    db,
                }));
            }
            self.add_widget(definition);
            added += 1;
        }
        info!("🧩 Surface '{}': {} vendor widgets registered", self.name, added);

        if let Some(folder) = self.zone_folder.clone() {
            if let Err(e) = self.load_zone_folder(&folder) {
                warn!("Surface '{}': {:#}", self.name, e);
            }
        }
        self.go_home(env);
        self.force_clear_all(env.host.now_ms());
    }

    // -- timers and feedback -------------------------------------------------

    /// Fire hold actions whose delay elapsed.
    pub fn run_deferred(&mut self, env: &mut SurfaceEnv<'_>) -> Vec<ActionEffect> {
        let mut effects = Vec::new();
        let flags = self.surface_flags(env.show_fx_windows);
        {
            let mut dispatch = DispatchEnv {
                host: &mut *env.host,
                nav: &mut *env.nav,
                modifiers: &mut *env.modifiers,
                flags,
                effects: &mut effects,
            };
            for zone in self.zones.values_mut() {
                for broker in zone.brokers.values_mut() {
                    for bundle in broker.bundles_mut() {
                        for context in bundle.contexts_mut() {
                            context.run_deferred(&mut dispatch);
                        }
                    }
                }
            }
        }
        self.apply_effects(effects, env)
    }

    /// Poll the first action of every widget's active bundle and push the
    /// result to the widget.
    pub fn request_update(&mut self, poll: PollEnv<'_>) {
        let poll = PollEnv {
            flags: self.surface_flags(poll.flags.show_fx_windows),
            ..poll
        };
        let now_ms = poll.host.now_ms();
        let Self {
            widgets, zones, outbox, ..
        } = self;
        let mut env = FeedbackEnv {
            poll,
            now_ms,
            outbox,
        };

        for (index, widget) in widgets.iter_mut().enumerate() {
            let Some(zone) = widget.current_zone else {
                continue;
            };
            let Some(broker) = zones
                .get_mut(&zone)
                .and_then(|z| z.brokers.get_mut(&WidgetId(index)))
            else {
                continue;
            };
            let Some(bundle) = broker.active_bundle_mut(env.poll.modifiers, env.poll.nav) else {
                continue;
            };
            if let Some(context) = bundle.contexts_mut().first_mut() {
                context.request_update(widget, &mut env);
            }
        }
    }

    pub fn force_clear_all(&mut self, now_ms: f64) {
        for widget in &mut self.widgets {
            widget.force_clear(now_ms, &mut self.outbox);
        }
    }

    pub fn pending_output(&self) -> usize {
        self.outbox.len()
    }

    /// Send everything queued. Without a transport the queue is dropped.
    pub fn flush(&mut self) {
        let messages = self.outbox.drain();
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        for message in &messages {
            if self.console.surface_out {
                info!("OUT-> {} {:?}", self.name, message);
            }
            if let Err(e) = transport.send(message) {
                warn!("Surface '{}': {:#}", self.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile_widget_source, compile_zone_source};
    use crate::host::MemoryHost;
    use crate::io::LoopbackTransport;

    struct Rig {
        host: MemoryHost,
        nav: TrackNavigationManager,
        modifiers: Modifiers,
        registry: ActionRegistry,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                host: MemoryHost::with_tracks(4),
                nav: TrackNavigationManager::new(),
                modifiers: Modifiers::default(),
                registry: ActionRegistry::new(),
            }
        }

        fn env(&mut self) -> SurfaceEnv<'_> {
            SurfaceEnv {
                host: &mut self.host,
                nav: &mut self.nav,
                modifiers: &mut self.modifiers,
                registry: &self.registry,
                show_fx_windows: false,
            }
        }
    }

    const WIDGETS: &str = "\
Widget Mute1
Press 90 10 7f 90 10 00
FB_TwoState 90 10 7f 90 10 00
WidgetEnd
Widget Mute2
Press 90 11 7f 90 11 00
FB_TwoState 90 11 7f 90 11 00
WidgetEnd
";

    fn surface(rig: &mut Rig, protocol: SurfaceProtocol, zones: &str) -> ControlSurface {
        let mut s = ControlSurface::new(
            "Test",
            protocol,
            SurfaceCounts {
                channels: 2,
                sends: 0,
                fx_slots: 2,
            },
            &mut rig.nav,
        );
        s.add_widgets(compile_widget_source(WIDGETS.as_bytes(), Path::new("t.mst")).widgets);
        let compiled = compile_zone_source(zones.as_bytes(), Path::new("t.zon"), s.navigators());
        s.add_zone_templates(compiled.templates);
        rig.nav.sync(&rig.host);
        s
    }

    #[test]
    fn test_go_home_binds_widgets() {
        let mut rig = Rig::new();
        let mut s = surface(
            &mut rig,
            SurfaceProtocol::Midi,
            "Zone Home\nIncludedZones\nChannel\nIncludedZonesEnd\nZoneEnd\nZone Channel\nTrackNavigator\nMute| TrackMute\nZoneEnd\n",
        );
        s.go_home(&mut rig.env());
        assert_eq!(s.active_zone_names(), ["Channel1", "Channel2", "Home"]);
        assert_eq!(s.widget_zone("Mute2").map(|z| z.name.as_str()), Some("Channel2"));
    }

    #[test]
    fn test_press_dispatches_and_feedback_follows() {
        let mut rig = Rig::new();
        let mut s = surface(
            &mut rig,
            SurfaceProtocol::Midi,
            "Zone Home\nTrackNavigator\nMute| TrackMute\nZoneEnd\n",
        );
        let (transport, handle) = LoopbackTransport::new();
        s.set_transport(Some(Box::new(transport)));
        s.go_home(&mut rig.env());

        handle.push_midi(0x90, 0x11, 0x7F);
        assert!(s.poll_input(&mut rig.env()).is_empty());
        let track = rig.nav.tracks()[1].clone();
        assert_eq!(rig.host.get_number(&track, crate::host::attr::MUTE), Some(1.0));

        s.request_update(PollEnv {
            host: &rig.host,
            nav: &rig.nav,
            modifiers: &rig.modifiers,
            flags: SurfaceFlags::default(),
        });
        s.flush();
        let sent = handle.take_sent();
        assert!(sent.contains(&WireMessage::Midi([0x90, 0x11, 0x7F])));
        assert!(sent.contains(&WireMessage::Midi([0x90, 0x10, 0x00])));
    }

    #[test]
    fn test_go_zone_replaces_home_and_clears_widgets() {
        let mut rig = Rig::new();
        let mut s = surface(
            &mut rig,
            SurfaceProtocol::Midi,
            "Zone Home\nMute1 TrackMute\nMute2 TrackMute\nZoneEnd\nZone Other\nMute1 NoAction\nZoneEnd\n",
        );
        s.go_home(&mut rig.env());
        s.go_zone("Other", &mut rig.env());
        assert_eq!(s.active_zone_names(), ["Other"]);
        assert!(s.widget_zone("Mute2").is_none());

        s.go_zone("Missing", &mut rig.env());
        assert_eq!(s.active_zone_names(), ["Other"]);
    }

    #[test]
    fn test_osc_surface_announces_zones() {
        let mut rig = Rig::new();
        let mut s = surface(&mut rig, SurfaceProtocol::Osc, "Zone \"Home Zone\"\nMute1 TrackMute\nZoneEnd\n");
        let (transport, handle) = LoopbackTransport::new();
        s.set_transport(Some(Box::new(transport)));
        s.go_zone("Home Zone", &mut rig.env());
        s.flush();
        assert_eq!(
            handle.take_sent(),
            vec![WireMessage::OscBare {
                address: "/Home_Zone".into()
            }]
        );
    }

    #[test]
    fn test_no_transport_is_silent() {
        let mut rig = Rig::new();
        let mut s = surface(&mut rig, SurfaceProtocol::Midi, "Zone Home\nMute1 TrackMute\nZoneEnd\n");
        s.go_home(&mut rig.env());
        s.force_clear_all(0.0);
        assert!(s.pending_output() > 0);
        s.flush();
        assert_eq!(s.pending_output(), 0);
        assert!(s.poll_input(&mut rig.env()).is_empty());
    }

    #[test]
    fn test_vendor_registration_and_focus_widgets() {
        let mut rig = Rig::new();
        let mut s = ControlSurface::new("Vendor", SurfaceProtocol::Vendor, SurfaceCounts::default(), &mut rig.nav);
        s.add_zone_templates(
            compile_zone_source(
                "Zone Home\nOnEuConFXAreaGainedFocus Reaper 40001\nZoneEnd\n".as_bytes(),
                Path::new("v.zon"),
                s.navigators(),
            )
            .templates,
        );
        let tx = s.vendor_sender().unwrap();
        tx.register_widgets(vec![
            VendorWidgetInfo {
                name: "OnEuConFXAreaGainedFocus".into(),
                ..Default::default()
            },
            VendorWidgetInfo {
                name: "Fader1".into(),
                control: "Fader1".into(),
                feedback: "Fader1_FaderDB".into(),
                channel: 1,
                group: "Channel".into(),
            },
        ]);
        tx.visibility_change("FX", 0, true);
        tx.visibility_change("Channel", 3, false);
        tx.send_double(vendor::POST_MESSAGE, 40002.0);

        s.poll_input(&mut rig.env());
        assert_eq!(s.widget_count(), 2);
        assert!(s.fx_area_focused());
        assert_eq!(s.channel_visible(3), Some(false));
        assert_eq!(rig.host.invoked, vec![40001, 40002]);
    }
}
