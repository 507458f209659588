use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc::Sender;
use crate::io::events::Impulse;
use anyhow::Result;

/// Forwards modifications under `path` as [`Impulse::LogChanged`].
pub fn setup_watcher(path: &Path, tx: Sender<Impulse>) -> Result<RecommendedWatcher> {
    let tx_clone = tx.clone();

    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    // A full channel already has a wake-up queued
                    let _ = tx_clone.try_send(Impulse::LogChanged);
                }
            }
            Err(e) => {
                let _ = tx_clone.try_send(Impulse::Error(format!("Watch error: {:?}", e)));
            }
        }
    })?;

    watcher.watch(path, RecursiveMode::NonRecursive)?;

    Ok(watcher)
}
