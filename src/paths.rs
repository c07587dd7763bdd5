//! Application and resource path management.
//!
//! ## Config file detection
//!
//! - **Dev mode** (debug builds): `config.yaml` in the current directory.
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   `config.yaml` beside it.
//! - **Installed mode** (default): `config.yaml` in the platform config
//!   directory under `Surface Integrator`.
//!
//! ## Resource layout
//!
//! ```text
//! <resource_dir>/CSI.ini
//! <resource_dir>/Surfaces/Midi/*.mst
//! <resource_dir>/Surfaces/OSC/*.ost
//! <resource_dir>/Zones/<zone folder>/**/*.zon
//! ```

use std::path::{Path, PathBuf};

/// Application name used for directories in installed mode
const APP_NAME: &str = "Surface Integrator";

/// Where the application config lives
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config: PathBuf,
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the config location.
    ///
    /// Called before logging is initialized, so diagnostics use eprintln.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let cwd_config = cwd.join("config.yaml");
            if cwd_config.exists() {
                eprintln!("[paths] DEV mode (config.yaml found in {})", cwd.display());
                return Self {
                    config: cwd_config,
                    is_portable: true,
                };
            }
        }

        if exe_dir.join(".portable").exists() {
            return Self {
                config: exe_dir.join("config.yaml"),
                is_portable: true,
            };
        }

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: dirs::config_dir() returned None, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        Self {
            config: config_dir.join("config.yaml"),
            is_portable: false,
        }
    }
}

/// Files of one resource directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayout {
    root: PathBuf,
    ini_file: String,
}

impl ResourceLayout {
    pub fn new(root: impl Into<PathBuf>, ini_file: &str) -> Self {
        Self {
            root: root.into(),
            ini_file: ini_file.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ini(&self) -> PathBuf {
        self.root.join(&self.ini_file)
    }

    pub fn midi_widget_file(&self, file: &str) -> PathBuf {
        self.root.join("Surfaces").join("Midi").join(file)
    }

    pub fn osc_widget_file(&self, file: &str) -> PathBuf {
        self.root.join("Surfaces").join("OSC").join(file)
    }

    pub fn zone_folder(&self, folder: &str) -> PathBuf {
        self.root.join("Zones").join(folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_layout() {
        let layout = ResourceLayout::new("/csi", "CSI.ini");
        assert_eq!(layout.ini(), PathBuf::from("/csi/CSI.ini"));
        assert_eq!(
            layout.midi_widget_file("X-Touch.mst"),
            PathBuf::from("/csi/Surfaces/Midi/X-Touch.mst")
        );
        assert_eq!(
            layout.osc_widget_file("TouchOSC.ost"),
            PathBuf::from("/csi/Surfaces/OSC/TouchOSC.ost")
        );
        assert_eq!(layout.zone_folder("XTouch"), PathBuf::from("/csi/Zones/XTouch"));
    }

    #[test]
    fn test_detect_points_at_yaml() {
        let paths = AppPaths::detect();
        assert_eq!(paths.config.file_name().and_then(|n| n.to_str()), Some("config.yaml"));
    }
}
