//! Configuration management
//!
//! Two layers: the application config (YAML, this module) says where the
//! resource directory is and how the binary runs; the session layout
//! (`CSI.ini`, [`ini`]) says which pages and surfaces exist.

pub mod ini;
pub mod watcher;

use crate::host::memory::{MemoryFx, MemoryTrack};
use crate::host::MemoryHost;
use crate::paths::ResourceLayout;
use crate::surface::ConsoleFlags;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub use ini::{IniConfig, PageRecord, SurfaceEndpoint, SurfaceRecord};
pub use watcher::ResourceWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Directory holding `CSI.ini`, `Surfaces/` and `Zones/`
    #[serde(default = "default_resource_dir")]
    pub resource_dir: PathBuf,
    #[serde(default = "default_ini_file")]
    pub ini_file: String,
    /// Period of the host callback
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub console: ConsoleFlags,
    #[serde(default)]
    pub host: HostConfig,
}

/// Project shape of the in-memory host
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default = "default_tracks")]
    pub tracks: usize,
    /// FX inserted on every track, in slot order
    #[serde(default)]
    pub fx_per_track: Vec<String>,
    #[serde(default)]
    pub sends_per_track: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tracks: default_tracks(),
            fx_per_track: Vec::new(),
            sends_per_track: 0,
        }
    }
}

impl HostConfig {
    /// Build a wall-clock memory host with this project shape.
    pub fn build(&self) -> MemoryHost {
        let mut host = MemoryHost::new().with_monotonic_clock();
        for i in 1..=self.tracks {
            let mut track = MemoryTrack::new(format!("{{track-{i}}}"), format!("Track {i}"));
            for fx in &self.fx_per_track {
                track = track.with_fx(MemoryFx::new(fx.clone(), &DEMO_FX_PARAMS));
            }
            for send in 1..=self.sends_per_track {
                track = track.with_send(format!("Bus {send}"));
            }
            host.add_track(track);
        }
        host
    }
}

const DEMO_FX_PARAMS: [&str; 4] = ["Gain", "Frequency", "Q", "Mix"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            resource_dir: default_resource_dir(),
            ini_file: default_ini_file(),
            tick_interval_ms: default_tick_interval(),
            console: ConsoleFlags::default(),
            host: HostConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load `path` if it exists, the defaults otherwise.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ini_file.is_empty() {
            anyhow::bail!("ini_file cannot be empty");
        }
        if !(1..=1000).contains(&self.tick_interval_ms) {
            anyhow::bail!(
                "tick_interval_ms {} is invalid (must be 1-1000)",
                self.tick_interval_ms
            );
        }
        if self.host.fx_per_track.iter().any(|fx| fx.is_empty()) {
            anyhow::bail!("host.fx_per_track entries cannot be empty");
        }
        Ok(())
    }

    pub fn layout(&self) -> ResourceLayout {
        ResourceLayout::new(self.resource_dir.clone(), &self.ini_file)
    }
}

fn default_resource_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("CSI")
}
fn default_ini_file() -> String { "CSI.ini".to_string() }
fn default_tick_interval() -> u64 { 30 }
fn default_tracks() -> usize { 8 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_with_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "resource_dir: /opt/csi\nconsole:\n  surface_in: true\nhost:\n  tracks: 3\n  fx_per_track: [ReaEQ]\n",
        )?;

        let config = AppConfig::load(&path).await?;
        assert_eq!(config.resource_dir, PathBuf::from("/opt/csi"));
        assert_eq!(config.ini_file, "CSI.ini");
        assert_eq!(config.tick_interval_ms, 30);
        assert!(config.console.surface_in && !config.console.surface_out);

        let host = config.host.build();
        assert_eq!(host.track_count(), 3);
        let first = host.track_at(0).unwrap();
        assert_eq!(host.fx_name(&first, 0).as_deref(), Some("ReaEQ"));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_tick_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "tick_interval_ms: 0\n")?;
        assert!(AppConfig::load(&path).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() -> Result<()> {
        let dir = TempDir::new()?;
        let config = AppConfig::load_or_default(&dir.path().join("nope.yaml")).await?;
        assert_eq!(config.tick_interval_ms, 30);
        assert!(config.resource_dir.ends_with("CSI"));
        Ok(())
    }
}
