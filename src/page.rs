//! A page: surfaces sharing one bank, one selection and one set of modifiers
//!
//! Only the current page of a session is ticked. Each tick first folds host
//! state changes (selection, focused FX) into the surfaces' zone maps, then
//! dispatches input, fires due holds and pushes feedback.

use crate::action::{ActionEffect, ActionRegistry, PageCommand, PollEnv, SurfaceCommand, SurfaceFlags};
use crate::broker::Modifiers;
use crate::compiler::Rgb;
use crate::host::{Host, TargetId};
use crate::navigation::TrackNavigationManager;
use crate::surface::{ControlSurface, SurfaceEnv};
use tracing::{debug, info};

/// Page record of the session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PageSettings {
    pub name: String,
    pub color: Rgb,
    /// Follow mixer (MCP) rather than track list (TCP) visibility
    pub follow_mcp: bool,
    /// Keep the bank offset when switching between synched pages
    pub synch_pages: bool,
    pub use_scroll_link: bool,
}

impl PageSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: Rgb::default(),
            follow_mcp: true,
            synch_pages: true,
            use_scroll_link: false,
        }
    }
}

pub struct Page {
    settings: PageSettings,
    nav: TrackNavigationManager,
    modifiers: Modifiers,
    surfaces: Vec<ControlSurface>,
    show_fx_windows: bool,
    last_focused_fx: Option<(TargetId, usize)>,
}

impl Page {
    pub fn new(settings: PageSettings) -> Self {
        let mut nav = TrackNavigationManager::new();
        nav.set_scroll_link(settings.use_scroll_link);
        Self {
            settings,
            nav,
            modifiers: Modifiers::default(),
            surfaces: Vec::new(),
            show_fx_windows: false,
            last_focused_fx: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &PageSettings {
        &self.settings
    }

    pub fn nav(&self) -> &TrackNavigationManager {
        &self.nav
    }

    /// Navigation manager, for creating surfaces on this page.
    pub fn nav_mut(&mut self) -> &mut TrackNavigationManager {
        &mut self.nav
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    pub fn show_fx_windows(&self) -> bool {
        self.show_fx_windows
    }

    pub fn add_surface(&mut self, surface: ControlSurface) {
        debug!("Page '{}': surface '{}' added", self.settings.name, surface.name());
        self.surfaces.push(surface);
    }

    pub fn surfaces(&self) -> &[ControlSurface] {
        &self.surfaces
    }

    pub fn surface(&self, name: &str) -> Option<&ControlSurface> {
        self.surfaces.iter().find(|s| s.name() == name)
    }

    pub fn surface_mut(&mut self, name: &str) -> Option<&mut ControlSurface> {
        self.surfaces.iter_mut().find(|s| s.name() == name)
    }

    /// Activate every surface's Home zone and resend all feedback.
    pub fn go_home(&mut self, host: &mut dyn Host, registry: &ActionRegistry) {
        self.nav.sync(&*host);
        let Self {
            nav,
            modifiers,
            surfaces,
            show_fx_windows,
            ..
        } = self;
        for surface in surfaces.iter_mut() {
            let mut env = SurfaceEnv {
                host: &mut *host,
                nav: &mut *nav,
                modifiers: &mut *modifiers,
                registry,
                show_fx_windows: *show_fx_windows,
            };
            surface.go_home(&mut env);
            surface.force_clear_all(env.host.now_ms());
        }
    }

    /// Make this page current. Input queued while the page was away is
    /// dropped and every widget is resent on the next tick.
    pub fn enter(&mut self, host: &dyn Host) {
        info!("📄 Page '{}'", self.settings.name);
        self.nav.sync(host);
        let now = host.now_ms();
        for surface in &mut self.surfaces {
            surface.discard_input();
            surface.force_clear_all(now);
        }
    }

    /// Run one host callback for this page.
    pub fn tick(&mut self, host: &mut dyn Host, registry: &ActionRegistry) -> Vec<PageCommand> {
        let selection_changed = self.nav.sync(&*host);
        let focused = host.focused_fx();
        let focus_changed = focused != self.last_focused_fx;
        self.last_focused_fx = focused;

        let Self {
            settings,
            nav,
            modifiers,
            surfaces,
            show_fx_windows,
            ..
        } = self;

        if selection_changed {
            debug!("Page '{}': selection -> {:?}", settings.name, nav.selected_track());
            if nav.scroll_link() {
                nav.force_scroll_link(&*host);
            }
        }

        let mut commands = Vec::new();
        for surface in surfaces.iter_mut() {
            let mut env = SurfaceEnv {
                host: &mut *host,
                nav: &mut *nav,
                modifiers: &mut *modifiers,
                registry,
                show_fx_windows: *show_fx_windows,
            };
            if selection_changed {
                surface.on_track_selection(&mut env);
            }
            if focus_changed {
                surface.on_fx_focus(&mut env);
            }

            let mut forwarded = surface.poll_input(&mut env);
            forwarded.extend(surface.run_deferred(&mut env));
            for effect in forwarded {
                match effect {
                    ActionEffect::Page(command) => commands.push(command),
                    ActionEffect::Surface(SurfaceCommand::ToggleShowFxWindows) => {
                        *show_fx_windows = !*show_fx_windows;
                        info!("🪟 Show FX windows {}", if *show_fx_windows { "on" } else { "off" });
                    }
                    ActionEffect::Surface(other) => debug!("Unhandled surface command {:?}", other),
                }
            }
        }

        let poll = PollEnv {
            host: &*host,
            nav: &*nav,
            modifiers: &*modifiers,
            flags: SurfaceFlags {
                show_fx_windows: *show_fx_windows,
                ..SurfaceFlags::default()
            },
        };
        for surface in surfaces.iter_mut() {
            surface.request_update(poll);
            surface.flush();
        }

        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile_widget_source, compile_zone_source};
    use crate::host::{attr, MemoryHost};
    use crate::io::LoopbackTransport;
    use crate::surface::{SurfaceCounts, SurfaceProtocol};
    use std::path::Path;

    const WIDGETS: &str = "\
Widget Select1
Press 90 18 7f 90 18 00
WidgetEnd
Widget Next
Press 90 2e 7f 90 2e 00
WidgetEnd
Widget Windows
Press 90 2f 7f 90 2f 00
WidgetEnd
";

    const ZONES: &str = "\
Zone Home
TrackNavigator
Select| TrackUniqueSelect
Next NextPage
Windows SetShowFXWindows
ZoneEnd
";

    fn page(host: &mut MemoryHost, registry: &ActionRegistry) -> (Page, crate::io::LoopbackHandle) {
        let mut page = Page::new(PageSettings::new("Main"));
        let mut surface = ControlSurface::new(
            "XTouch",
            SurfaceProtocol::Midi,
            SurfaceCounts {
                channels: 1,
                ..SurfaceCounts::default()
            },
            page.nav_mut(),
        );
        surface.add_widgets(compile_widget_source(WIDGETS.as_bytes(), Path::new("x.mst")).widgets);
        let zones = compile_zone_source(ZONES.as_bytes(), Path::new("x.zon"), surface.navigators());
        surface.add_zone_templates(zones.templates);
        let (transport, handle) = LoopbackTransport::new();
        surface.set_transport(Some(Box::new(transport)));
        page.add_surface(surface);
        page.go_home(host, registry);
        (page, handle)
    }

    #[test]
    fn test_tick_forwards_page_commands() {
        let mut host = MemoryHost::with_tracks(2);
        let registry = ActionRegistry::new();
        let (mut page, handle) = page(&mut host, &registry);

        handle.push_midi(0x90, 0x2E, 0x7F);
        assert_eq!(page.tick(&mut host, &registry), vec![PageCommand::NextPage]);
        assert!(page.tick(&mut host, &registry).is_empty());
    }

    #[test]
    fn test_show_fx_windows_toggles_on_the_page() {
        let mut host = MemoryHost::with_tracks(2);
        let registry = ActionRegistry::new();
        let (mut page, handle) = page(&mut host, &registry);

        handle.push_midi(0x90, 0x2F, 0x7F);
        page.tick(&mut host, &registry);
        assert!(page.show_fx_windows());
    }

    #[test]
    fn test_selection_is_picked_up_next_tick() {
        let mut host = MemoryHost::with_tracks(2);
        let registry = ActionRegistry::new();
        let (mut page, handle) = page(&mut host, &registry);
        assert!(page.nav().selected_track().is_none());

        handle.push_midi(0x90, 0x18, 0x7F);
        page.tick(&mut host, &registry);
        let first = host.track_at(0).unwrap();
        assert_eq!(host.get_number(&first, attr::SELECTED), Some(1.0));

        page.tick(&mut host, &registry);
        assert_eq!(page.nav().selected_track(), Some(&first));
    }
}
