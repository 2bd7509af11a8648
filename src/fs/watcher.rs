use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::event::Event;

/// Watcher settings, usually taken from the `[watcher]` config section.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub debounce: Duration,
    pub ignore_patterns: Vec<String>,
    /// More changed paths than this in one window collapse to a root refresh.
    pub flood_threshold: usize,
}

impl WatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms()),
            ignore_patterns: config.ignore_patterns(),
            flood_threshold: config.flood_threshold(),
        }
    }
}

/// Recursive watcher on one root that forwards debounced change paths as
/// [`Event::FsChange`].
pub struct FsWatcher {
    /// Dropping the debouncer stops watching.
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

impl FsWatcher {
    pub fn new(
        root: &Path,
        options: WatchOptions,
        event_tx: mpsc::UnboundedSender<Event>,
    ) -> notify::Result<Self> {
        let root_path = root.to_path_buf();
        let WatchOptions {
            debounce,
            ignore_patterns,
            flood_threshold,
        } = options;

        let mut debouncer = new_debouncer(
            debounce,
            move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                match result {
                    Ok(events) => {
                        let paths: Vec<PathBuf> = events
                            .iter()
                            .filter(|e| e.kind == DebouncedEventKind::Any)
                            .map(|e| e.path.clone())
                            .filter(|p| !should_ignore(p, &ignore_patterns))
                            .collect();
                        if paths.is_empty() {
                            return;
                        }
                        let paths = collapse_flood(paths, flood_threshold, &root_path);
                        debug!(count = paths.len(), "filesystem change");
                        let _ = event_tx.send(Event::FsChange(paths));
                    }
                    Err(e) => warn!(error = %e, "watcher error"),
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)?;

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

/// A path is ignored if any of its components equals a pattern.
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            patterns.iter().any(|p| *p == name)
        }
        _ => false,
    })
}

/// Replace an oversized batch with the root alone.
pub fn collapse_flood(paths: Vec<PathBuf>, threshold: usize, root: &Path) -> Vec<PathBuf> {
    if paths.len() > threshold {
        vec![root.to_path_buf()]
    } else {
        paths
    }
}
