//! Zone description language (`.zon`)
//!
//! ```text
//! Zone "Channel" Chan          // name, optional alias
//!     TrackNavigator           // navigator family for the whole zone
//!     IncludedZones
//!         Buttons
//!     IncludedZonesEnd
//!     Fader|           TrackVolume
//!     Shift+Fader|     TrackPan
//!     Toggle+Mute|     TrackMute { 0 0 0 255 0 0 }
//! ZoneEnd
//! ```

use super::tokenize;
use crate::broker::{canonical_modifier, is_modifier_action, MODIFIER_SLOTS};
use crate::error::CompileError;
use crate::zone::{
    ActionBundleTemplate, ActionFlags, ActionTemplate, NavigatorBinding, SurfaceNavigators,
    WidgetActionTemplate, ZoneTemplate,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hold flag delay, seconds
const HOLD_DELAY: f64 = 1.0;

/// Outcome of compiling one zone file
#[derive(Debug, Default)]
pub struct ZoneCompilation {
    /// Zones completed before any failure
    pub templates: Vec<ZoneTemplate>,
    pub failure: Option<CompileError>,
}

/// Widget spec split into its parts
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WidgetSpec {
    pub widget_name: String,
    pub modifier: String,
    pub flags: ActionFlags,
}

/// Parse a `+`-joined widget spec such as `Hold+Shift+Mute1`.
///
/// The last element is the widget name. Named modifiers compose into the
/// canonical modifier string; unknown prefixes are ignored.
pub(crate) fn parse_widget_spec(spec: &str) -> WidgetSpec {
    let mut parts: Vec<&str> = spec.split('+').collect();
    let widget_name = parts.pop().unwrap_or_default().to_string();

    let mut held = Vec::new();
    let mut flags = ActionFlags::default();
    for part in parts {
        match part {
            "PR" => flags.supports_release = true,
            "Invert" => flags.inverted = true,
            "Toggle" => flags.should_toggle = true,
            "Hold" => flags.delay_amount = HOLD_DELAY,
            m if MODIFIER_SLOTS.contains(&m) => held.push(m),
            other => debug!("Ignoring unknown modifier '{}' in '{}'", other, spec),
        }
    }

    WidgetSpec {
        widget_name,
        modifier: canonical_modifier(&held),
        flags,
    }
}

#[derive(Default)]
struct WidgetBuilder {
    is_modifier: bool,
    bundles: BTreeMap<String, Vec<ActionTemplate>>,
}

struct ZoneBuilder {
    name: String,
    alias: String,
    binding: NavigatorBinding,
    included_zones: Vec<String>,
    widgets: BTreeMap<String, WidgetBuilder>,
}

impl ZoneBuilder {
    fn new(name: String, alias: String) -> Self {
        Self {
            name,
            alias,
            binding: NavigatorBinding::Global,
            included_zones: Vec::new(),
            widgets: BTreeMap::new(),
        }
    }

    fn add_action(&mut self, tokens: Vec<String>) {
        let spec = parse_widget_spec(&tokens[0]);
        let params: Vec<String> = tokens[1..].to_vec();
        let action_name = params[0].clone();

        let widget = self.widgets.entry(spec.widget_name).or_default();
        if is_modifier_action(&action_name) {
            widget.is_modifier = true;
        }
        widget.bundles.entry(spec.modifier).or_default().push(ActionTemplate {
            action_name,
            params,
            flags: spec.flags,
        });
    }

    fn build(self, path: &Path, navigators: &SurfaceNavigators) -> ZoneTemplate {
        let widget_action_templates = self
            .widgets
            .into_iter()
            .map(|(widget_name, w)| WidgetActionTemplate {
                widget_name,
                is_modifier: w.is_modifier,
                bundles: w
                    .bundles
                    .into_iter()
                    .map(|(modifier, actions)| ActionBundleTemplate { modifier, actions })
                    .collect(),
            })
            .collect();

        ZoneTemplate {
            name: self.name,
            alias: self.alias,
            source_path: path.to_path_buf(),
            included_zones: self.included_zones,
            widget_action_templates,
            binding: self.binding,
            navigators: navigators.for_binding(self.binding),
        }
    }
}

/// Compile zone templates from any line source.
pub fn compile_zone_source(
    reader: impl BufRead,
    path: &Path,
    navigators: &SurfaceNavigators,
) -> ZoneCompilation {
    let mut out = ZoneCompilation::default();
    let mut current: Option<ZoneBuilder> = None;
    let mut in_includes = false;

    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(source) => {
                out.failure = Some(CompileError::Io {
                    path: path.to_path_buf(),
                    line: index + 1,
                    source,
                });
                return out;
            }
        };

        let tokens = tokenize(&line);
        let Some(first) = tokens.first() else {
            continue;
        };

        match first.as_str() {
            "Zone" => {
                let Some(name) = tokens.get(1) else {
                    continue;
                };
                if let Some(open) = &current {
                    debug!("Zone '{}' in {} has no ZoneEnd", open.name, path.display());
                }
                let alias = tokens.get(2).unwrap_or(name).clone();
                current = Some(ZoneBuilder::new(name.clone(), alias));
                in_includes = false;
            }
            "ZoneEnd" => {
                if let Some(builder) = current.take() {
                    out.templates.push(builder.build(path, navigators));
                }
                in_includes = false;
            }
            "IncludedZones" => in_includes = true,
            "IncludedZonesEnd" => in_includes = false,
            _ => {
                let Some(zone) = current.as_mut() else {
                    continue;
                };
                if in_includes {
                    zone.included_zones.extend(tokens);
                } else if let Some(binding) = NavigatorBinding::from_token(first) {
                    zone.binding = binding;
                } else if tokens.len() >= 2 {
                    zone.add_action(tokens);
                }
            }
        }
    }

    out
}

/// Compile one zone file from disk. Failures are logged and returned with
/// whatever completed before them.
pub fn compile_zone_file(path: &Path, navigators: &SurfaceNavigators) -> ZoneCompilation {
    let compilation = match File::open(path) {
        Ok(file) => compile_zone_source(BufReader::new(file), path, navigators),
        Err(source) => ZoneCompilation {
            templates: Vec::new(),
            failure: Some(CompileError::Io {
                path: PathBuf::from(path),
                line: 0,
                source,
            }),
        },
    };
    if let Some(err) = &compilation.failure {
        warn!("{}", err);
    }
    compilation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::NavigatorId;

    fn navs() -> SurfaceNavigators {
        SurfaceNavigators {
            channels: vec![NavigatorId(10), NavigatorId(11), NavigatorId(12)],
            sends: vec![NavigatorId(20), NavigatorId(21)],
            global: NavigatorId(0),
            selected_track: NavigatorId(1),
            master_track: NavigatorId(2),
            focused_fx: NavigatorId(3),
        }
    }

    fn compile(src: &str) -> Vec<ZoneTemplate> {
        let out = compile_zone_source(src.as_bytes(), Path::new("t.zon"), &navs());
        assert!(out.failure.is_none());
        out.templates
    }

    #[test]
    fn test_single_fader_zone() {
        let zones = compile("Zone Test\nFader1 TrackVolume\nZoneEnd\n");
        assert_eq!(zones.len(), 1);
        let zone = &zones[0];
        assert_eq!(zone.name, "Test");
        assert_eq!(zone.alias, "Test");
        assert_eq!(zone.widget_action_templates.len(), 1);

        let wat = &zone.widget_action_templates[0];
        assert_eq!(wat.widget_name, "Fader1");
        assert!(!wat.is_modifier);
        assert_eq!(wat.bundles.len(), 1);
        assert_eq!(wat.bundles[0].modifier, "");
        assert_eq!(wat.bundles[0].actions.len(), 1);

        let action = &wat.bundles[0].actions[0];
        assert_eq!(action.action_name, "TrackVolume");
        assert_eq!(action.params, vec!["TrackVolume"]);
        assert_eq!(action.flags, ActionFlags::default());
    }

    #[test]
    fn test_track_navigator_with_alias() {
        let zones = compile(
            "Zone \"Channel Strip\" Strip // comment\n\tTrackNavigator\n\tFader| TrackVolume\nZoneEnd",
        );
        assert_eq!(zones[0].name, "Channel Strip");
        assert_eq!(zones[0].alias, "Strip");
        assert_eq!(zones[0].binding, NavigatorBinding::Track);
        assert_eq!(zones[0].navigators, navs().channels);
    }

    #[test]
    fn test_other_navigators() {
        let zones = compile(
            "Zone A\nSendNavigator\nZoneEnd\nZone B\nFocusedFXNavigator\nZoneEnd\nZone C\nZoneEnd\n",
        );
        assert_eq!(zones[0].navigators, navs().sends);
        assert_eq!(zones[1].navigators, vec![NavigatorId(3)]);
        assert_eq!(zones[2].navigators, vec![NavigatorId(0)]);
    }

    #[test]
    fn test_modifier_canonical_order_and_flags() {
        let spec = parse_widget_spec("Alt+Hold+Shift+FaderTouch+Invert+Fader1");
        assert_eq!(spec.widget_name, "Fader1");
        assert_eq!(spec.modifier, "Shift+Alt+FaderTouch+");
        assert!(spec.flags.inverted);
        assert_eq!(spec.flags.delay_amount, 1.0);
        assert!(!spec.flags.should_toggle);

        let spec = parse_widget_spec("PR+Toggle+Mute1");
        assert_eq!(spec.modifier, "");
        assert!(spec.flags.supports_release && spec.flags.should_toggle);
    }

    #[test]
    fn test_bundles_grouped_by_modifier() {
        let zones = compile(
            "Zone Z\nShift+Rotary1 TrackPan\nRotary1 TrackVolume\nOption+Shift+Rotary1 TrackPanWidth\nRotary1 FixedTextDisplay hi\nZoneEnd\n",
        );
        let wat = &zones[0].widget_action_templates[0];
        let modifiers: Vec<_> = wat.bundles.iter().map(|b| b.modifier.as_str()).collect();
        assert_eq!(modifiers, ["", "Shift+", "Shift+Option+"]);
        assert_eq!(wat.bundles[0].actions.len(), 2);
    }

    #[test]
    fn test_modifier_widget_detected() {
        let zones = compile("Zone Z\nShift Shift\nMute1 TrackMute\nZoneEnd\n");
        let shift = zones[0]
            .widget_action_templates
            .iter()
            .find(|w| w.widget_name == "Shift")
            .unwrap();
        assert!(shift.is_modifier);
    }

    #[test]
    fn test_includes_and_stray_lines() {
        let zones = compile(
            "Fader1 TrackVolume\nZoneEnd\nZone Home\nIncludedZones\nButtons\nChannel\nIncludedZonesEnd\nLonely\nZoneEnd\n",
        );
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].included_zones, vec!["Buttons", "Channel"]);
        assert!(zones[0].widget_action_templates.is_empty());
    }

    #[test]
    fn test_invalid_utf8_aborts_file_but_keeps_completed_zones() {
        let mut src = b"Zone A\nPlay Play\nZoneEnd\nZone B\n".to_vec();
        src.extend_from_slice(&[0xff, 0xfe, b'\n']);
        src.extend_from_slice(b"ZoneEnd\n");
        let out = compile_zone_source(src.as_slice(), Path::new("bad.zon"), &navs());
        assert_eq!(out.templates.len(), 1);
        let err = out.failure.unwrap();
        assert_eq!(err.line(), 5);
        assert!(err.to_string().contains("bad.zon"));
    }

    #[test]
    fn test_missing_file() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let out = compile_zone_file(&dir.path().join("nope.zon"), &navs());
        assert!(out.templates.is_empty());
        assert!(out.failure.is_some());

        let path = dir.path().join("ok.zon");
        std::fs::write(&path, "Zone Ok\nPlay Play\nZoneEnd\n")?;
        let out = compile_zone_file(&path, &navs());
        assert_eq!(out.templates[0].source_path, path);
        Ok(())
    }
}
