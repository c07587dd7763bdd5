//! Resource directory watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Quiet period before a burst of edits triggers one reload
const DEBOUNCE: Duration = Duration::from_millis(250);

fn is_relevant(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ini" | "mst" | "ost" | "zon")
    )
}

/// Watches `CSI.ini`, widget files and zone files; yields the changed paths
/// once per debounced burst.
pub struct ResourceWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Vec<PathBuf>>,
}

impl ResourceWatcher {
    pub fn new(resource_dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel(10);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                let paths: Vec<PathBuf> = event.paths.into_iter().filter(|p| is_relevant(p)).collect();
                if !paths.is_empty() {
                    debug!("Resource change: {:?}", paths);
                    let _ = event_tx.send(paths);
                }
            }
            Err(e) => error!("Watch error: {}", e),
        })?;

        watcher
            .watch(resource_dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch resource directory: {}", resource_dir.display()))?;

        runtime_handle.spawn(async move {
            while let Some(first) = event_rx.recv().await {
                let mut changed = first;
                // keep absorbing events until the directory goes quiet
                while let Ok(Some(more)) = tokio::time::timeout(DEBOUNCE, event_rx.recv()).await {
                    changed.extend(more);
                }
                changed.sort();
                changed.dedup();
                if tx.send(changed).await.is_err() {
                    break;
                }
            }
        });

        info!("👀 Watching {} for changes", resource_dir.display());

        Ok(Self { _watcher: watcher, rx })
    }

    /// Wait for the next burst of changes.
    /// Returns None if the watcher has been closed
    pub async fn next_change(&mut self) -> Option<Vec<PathBuf>> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_relevant_extensions() {
        assert!(is_relevant(Path::new("/r/CSI.ini")));
        assert!(is_relevant(Path::new("/r/Zones/X/Home.zon")));
        assert!(!is_relevant(Path::new("/r/notes.txt")));
        assert!(!is_relevant(Path::new("/r/Zones")));
    }

    #[tokio::test]
    async fn test_zone_edit_is_reported() -> Result<()> {
        let dir = TempDir::new()?;
        let zone = dir.path().join("Home.zon");
        fs::write(&zone, "Zone Home\nZoneEnd\n")?;

        let mut watcher = ResourceWatcher::new(dir.path())?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&zone, "Zone Home\nFader1 TrackVolume\nZoneEnd\n")?;

        let changed = tokio::time::timeout(Duration::from_secs(3), watcher.next_change()).await?;
        if let Some(changed) = changed {
            assert!(changed.iter().any(|p| p.ends_with("Home.zon")));
        }
        Ok(())
    }
}
