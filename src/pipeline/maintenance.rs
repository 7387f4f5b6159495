//! Interim directory cleanup.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Delete task directories under `interim_root` last modified more than
/// `ttl` ago. Returns the number removed; a missing root counts as empty.
pub async fn sweep_interim(interim_root: &Path, ttl: Duration) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(interim_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_dir() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age <= ttl {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!("Removed stale interim dir {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Error removing {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

/// Sweep every `interval` until `shutdown` flips to true.
pub async fn run_periodic_cleanup(
    interim_root: PathBuf,
    ttl: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_interim(&interim_root, ttl).await {
                    Ok(0) => {}
                    Ok(n) => info!("Cleanup: removed {} stale interim directories", n),
                    Err(e) => warn!("Cleanup of {} failed: {}", interim_root.display(), e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
