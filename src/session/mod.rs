//! Session: every page built from `CSI.ini`, with one current page
//!
//! The session is driven by the host callback. Each [`Session::tick`] runs
//! the current page and then applies the page commands it returned
//! (`NextPage`, `GoPage`).

use crate::action::{ActionRegistry, PageCommand};
use crate::compiler::compile_widget_file;
use crate::config::{IniConfig, SurfaceEndpoint, SurfaceRecord};
use crate::host::Host;
use crate::io::{MidiPortTable, OscSocketTable, Transport, VendorTransport};
use crate::page::Page;
use crate::paths::ResourceLayout;
use crate::router::feedback::VendorValue;
use crate::router::vendor::VendorSender;
use crate::surface::{ConsoleFlags, ControlSurface, SurfaceProtocol};
use anyhow::Result;
use crossbeam::channel::Receiver;
use std::collections::HashMap;
use tracing::{debug, info, warn};


/// Opens the wire endpoint of a MIDI or OSC surface
pub trait TransportOpener {
    fn open(&mut self, record: &SurfaceRecord) -> Result<Box<dyn Transport>>;
}

/// Real MIDI ports and UDP sockets, shared across pages
#[derive(Default)]
pub struct DeviceTransports {
    midi: MidiPortTable,
    osc: OscSocketTable,
}

impl DeviceTransports {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransportOpener for DeviceTransports {
    fn open(&mut self, record: &SurfaceRecord) -> Result<Box<dyn Transport>> {
        match &record.endpoint {
            SurfaceEndpoint::Midi { input, output, .. } => Ok(Box::new(self.midi.open(input, output)?)),
            SurfaceEndpoint::Osc {
                in_port,
                out_port,
                remote_host,
                ..
            } => Ok(Box::new(self.osc.open(*in_port, remote_host, *out_port)?)),
            SurfaceEndpoint::Vendor => anyhow::bail!("Vendor surfaces have no device transport"),
        }
    }
}

/// Leaves every MIDI/OSC surface without I/O (`--check`)
pub struct NoTransports;

impl TransportOpener for NoTransports {
    fn open(&mut self, record: &SurfaceRecord) -> Result<Box<dyn Transport>> {
        anyhow::bail!("I/O disabled for '{}'", record.name)
    }
}

/// Both ends of a vendor-bus surface
struct VendorEndpoint {
    sender: VendorSender,
    outbound: Receiver<(String, VendorValue)>,
}

pub struct Session {
    registry: ActionRegistry,
    pages: Vec<Page>,
    current: usize,
    /// Keyed by (page index, surface name)
    vendor: HashMap<(usize, String), VendorEndpoint>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            registry: ActionRegistry::new(),
            pages: Vec::new(),
            current: 0,
            vendor: HashMap::new(),
        }
    }

    /// Build every page and surface of `ini`, then send each page Home.
    ///
    /// Surfaces whose transport cannot be opened are kept with I/O
    /// disabled.
    pub fn build(
        ini: &IniConfig,
        layout: &ResourceLayout,
        console: ConsoleFlags,
        host: &mut dyn Host,
        opener: &mut dyn TransportOpener,
    ) -> Self {
        let mut session = Self::new();

        for record in &ini.pages {
            let page_index = session.pages.len();
            let mut page = Page::new(record.settings.clone());
            for surface_record in &record.surfaces {
                let surface = session.build_surface(page_index, &mut page, surface_record, layout, console, opener);
                page.add_surface(surface);
            }
            page.go_home(host, &session.registry);
            session.pages.push(page);
        }

        info!(
            "✅ Session ready: {} pages, {} surfaces",
            session.pages.len(),
            ini.surface_count()
        );
        if let Some(page) = session.pages.first_mut() {
            page.enter(&*host);
        }
        session
    }

    fn build_surface(
        &mut self,
        page_index: usize,
        page: &mut Page,
        record: &SurfaceRecord,
        layout: &ResourceLayout,
        console: ConsoleFlags,
        opener: &mut dyn TransportOpener,
    ) -> ControlSurface {
        let protocol = match record.endpoint {
            SurfaceEndpoint::Midi { .. } => SurfaceProtocol::Midi,
            SurfaceEndpoint::Osc { .. } => SurfaceProtocol::Osc,
            SurfaceEndpoint::Vendor => SurfaceProtocol::Vendor,
        };
        let mut surface = ControlSurface::new(record.name.clone(), protocol, record.counts, page.nav_mut());
        surface.set_console(console);

        let widget_file = match &record.endpoint {
            SurfaceEndpoint::Midi { widget_file, .. } => Some(layout.midi_widget_file(widget_file)),
            SurfaceEndpoint::Osc { widget_file, .. } => Some(layout.osc_widget_file(widget_file)),
            SurfaceEndpoint::Vendor => None,
        };
        if let Some(path) = widget_file {
            surface.add_widgets(compile_widget_file(&path).widgets);
        }

        let zone_folder = layout.zone_folder(&record.zone_folder);
        if let Err(e) = surface.load_zone_folder(&zone_folder) {
            warn!("Surface '{}': {:#}", record.name, e);
        }

        let transport: Option<Box<dyn Transport>> = match protocol {
            SurfaceProtocol::Vendor => {
                let (transport, outbound) = VendorTransport::new();
                if let Some(sender) = surface.vendor_sender() {
                    self.vendor.insert(
                        (page_index, record.name.clone()),
                        VendorEndpoint { sender, outbound },
                    );
                }
                Some(Box::new(transport))
            }
            _ => match opener.open(record) {
                Ok(transport) => {
                    debug!("Surface '{}' on {}", record.name, transport.describe());
                    Some(transport)
                }
                Err(e) => {
                    warn!("Surface '{}': {:#}, running without I/O", record.name, e);
                    None
                }
            },
        };
        surface.set_transport(transport);

        info!(
            "🎛️  Surface '{}': {} widgets, {} zones",
            record.name,
            surface.widget_count(),
            surface.zone_template_count()
        );
        surface
    }

    /// Append a page assembled by hand.
    pub fn add_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.pages.get(self.current)
    }

    pub fn current_page_mut(&mut self) -> Option<&mut Page> {
        self.pages.get_mut(self.current)
    }

    /// Producer handle of a vendor surface on the current page.
    pub fn vendor_sender(&self, surface: &str) -> Option<VendorSender> {
        self.vendor
            .get(&(self.current, surface.to_string()))
            .map(|v| v.sender.clone())
    }

    /// Outbound vendor messages of a surface on the current page.
    pub fn vendor_outbound(&self, surface: &str) -> Option<&Receiver<(String, VendorValue)>> {
        self.vendor
            .get(&(self.current, surface.to_string()))
            .map(|v| &v.outbound)
    }

    /// One host callback.
    pub fn tick(&mut self, host: &mut dyn Host) {
        let Some(page) = self.pages.get_mut(self.current) else {
            return;
        };
        let commands = page.tick(host, &self.registry);
        for command in commands {
            match command {
                PageCommand::NextPage => {
                    let next = (self.current + 1) % self.pages.len();
                    self.go_to_page(next, &*host);
                }
                PageCommand::GoPage(name) => match self.pages.iter().position(|p| p.name() == name) {
                    Some(index) => self.go_to_page(index, &*host),
                    None => debug!("GoPage: no page named '{}'", name),
                },
            }
        }
    }

    /// Switch the current page. Synched pages carry the bank offset over.
    pub fn go_to_page(&mut self, index: usize, host: &dyn Host) {
        if index >= self.pages.len() || index == self.current {
            return;
        }
        let from = &self.pages[self.current];
        let carry = from
            .settings()
            .synch_pages
            .then(|| from.nav().track_offset());

        let to = &mut self.pages[index];
        to.enter(host);
        if let (Some(offset), true) = (carry, to.settings().synch_pages) {
            let delta = offset as i64 - to.nav().track_offset() as i64;
            to.nav_mut().adjust_bank(delta as i32);
        }
        self.current = index;
    }
}
