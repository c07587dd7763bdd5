//! Session layout file (`CSI.ini`)
//!
//! ```text
//! Version 2.0
//! Page Home FollowMCP SynchPages UseScrollLink NoMCPDisplay { 255 0 0 }
//! MidiSurface XTouch 0 1 X-Touch.mst XTouch 8 0 4 0
//! OSCSurface TouchOSC 8000 9000 TouchOSC.ost TouchOSC 8 4 4 0 192.168.1.20
//! VendorSurface Console Console 8 4 4 0
//! ```
//!
//! Lines with fewer than five tokens are ignored. Surface lines attach to the
//! most recent Page; surfaces declared before any Page are dropped.

use crate::compiler::{tokenize, Rgb};
use crate::page::PageSettings;
use crate::surface::SurfaceCounts;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};

const PAGE: &str = "Page";
const MIDI_SURFACE: &str = "MidiSurface";
const OSC_SURFACE: &str = "OSCSurface";
const VENDOR_SURFACE: &str = "VendorSurface";
const EUCON_SURFACE: &str = "EuConSurface";

/// Wire endpoint of a configured surface
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEndpoint {
    /// Ports by index or by name substring
    Midi {
        input: String,
        output: String,
        widget_file: String,
    },
    Osc {
        in_port: u16,
        out_port: u16,
        remote_host: String,
        widget_file: String,
    },
    /// Widgets arrive at runtime from the vendor bus
    Vendor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRecord {
    pub name: String,
    pub endpoint: SurfaceEndpoint,
    pub zone_folder: String,
    pub counts: SurfaceCounts,
    pub options: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub settings: PageSettings,
    pub surfaces: Vec<SurfaceRecord>,
}

/// Parsed `CSI.ini`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IniConfig {
    pub pages: Vec<PageRecord>,
}

fn parse_page(tokens: &[String]) -> Option<PageSettings> {
    if tokens.len() != 11 {
        return None;
    }
    let mut color = Rgb::default();
    if tokens[6] == "{" && tokens[10] == "}" {
        let channel = |t: &String| t.parse::<u8>().unwrap_or(0);
        color = Rgb {
            r: channel(&tokens[7]),
            g: channel(&tokens[8]),
            b: channel(&tokens[9]),
        };
    }
    Some(PageSettings {
        name: tokens[1].clone(),
        color,
        follow_mcp: tokens[2] == "FollowMCP",
        synch_pages: tokens[3] == "SynchPages",
        use_scroll_link: tokens[4] == "UseScrollLink",
    })
}

fn counts_at(tokens: &[String], start: usize) -> Option<(SurfaceCounts, i32)> {
    let number = |i: usize| tokens.get(i)?.parse::<usize>().ok();
    let counts = SurfaceCounts {
        channels: number(start)?,
        sends: number(start + 1)?,
        fx_slots: number(start + 2)?,
    };
    let options = tokens.get(start + 3)?.parse().ok()?;
    Some((counts, options))
}

fn parse_surface(tokens: &[String]) -> Option<SurfaceRecord> {
    let kind = tokens[0].as_str();
    match (kind, tokens.len()) {
        (MIDI_SURFACE, 10) => {
            let (counts, options) = counts_at(tokens, 6)?;
            Some(SurfaceRecord {
                name: tokens[1].clone(),
                endpoint: SurfaceEndpoint::Midi {
                    input: tokens[2].clone(),
                    output: tokens[3].clone(),
                    widget_file: tokens[4].clone(),
                },
                zone_folder: tokens[5].clone(),
                counts,
                options,
            })
        }
        (OSC_SURFACE, 11) => {
            let (counts, options) = counts_at(tokens, 6)?;
            Some(SurfaceRecord {
                name: tokens[1].clone(),
                endpoint: SurfaceEndpoint::Osc {
                    in_port: tokens[2].parse().ok()?,
                    out_port: tokens[3].parse().ok()?,
                    remote_host: tokens[10].clone(),
                    widget_file: tokens[4].clone(),
                },
                zone_folder: tokens[5].clone(),
                counts,
                options,
            })
        }
        (VENDOR_SURFACE | EUCON_SURFACE, 7) => {
            let (counts, options) = counts_at(tokens, 3)?;
            Some(SurfaceRecord {
                name: tokens[1].clone(),
                endpoint: SurfaceEndpoint::Vendor,
                zone_folder: tokens[2].clone(),
                counts,
                options,
            })
        }
        _ => None,
    }
}

impl IniConfig {
    pub fn parse(text: &str) -> Self {
        let mut config = IniConfig::default();

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let tokens = tokenize(&line.replace('\t', " "));
            if tokens.len() < 5 {
                continue;
            }

            match tokens[0].as_str() {
                PAGE => match parse_page(&tokens) {
                    Some(settings) => config.pages.push(PageRecord {
                        settings,
                        surfaces: Vec::new(),
                    }),
                    None => warn!("Skipping malformed Page record at line {}", line_number),
                },
                MIDI_SURFACE | OSC_SURFACE | VENDOR_SURFACE | EUCON_SURFACE => {
                    let Some(page) = config.pages.last_mut() else {
                        debug!("Surface at line {} precedes any Page, ignored", line_number);
                        continue;
                    };
                    match parse_surface(&tokens) {
                        Some(surface) => page.surfaces.push(surface),
                        None => warn!("Skipping malformed {} record at line {}", tokens[0], line_number),
                    }
                }
                other => debug!("Unknown record '{}' at line {}", other, line_number),
            }
        }

        config
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn surface_count(&self) -> usize {
        self.pages.iter().map(|p| p.surfaces.len()).sum()
    }
}
