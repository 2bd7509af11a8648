//! Applies filesystem change notifications to the [`TreeStore`].
//!
//! Watch delivery is racy, so every event that refers to state the store
//! does not hold is dropped instead of failing.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

use crate::fs::node::{node_id, Node, NodeId, NodeKind};
use crate::fs::store::{NodeUpdate, TreeStore};

/// Stat snapshot carried by create and modify notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryStats {
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Created {
        path: PathBuf,
        stats: Option<EntryStats>,
    },
    Modified {
        path: PathBuf,
        stats: Option<EntryStats>,
    },
    Deleted {
        path: PathBuf,
    },
    Renamed {
        path: PathBuf,
        old_path: PathBuf,
    },
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created { path, .. }
            | WatchEvent::Modified { path, .. }
            | WatchEvent::Deleted { path }
            | WatchEvent::Renamed { path, .. } => path,
        }
    }
}

/// Apply one event. Returns whether the store changed.
pub fn apply_watch_event(store: &mut TreeStore, event: &WatchEvent) -> bool {
    let applied = match event {
        WatchEvent::Created { path, stats } => match stats {
            Some(stats) => created(store, path, stats),
            None => false,
        },
        WatchEvent::Modified { path, stats } => match stats {
            Some(stats) => modified(store, path, stats),
            None => false,
        },
        WatchEvent::Deleted { path } => store.remove_node(&node_id(path)).is_some(),
        WatchEvent::Renamed { path, old_path } => renamed(store, old_path, path),
    };
    if !applied {
        trace!(?event, "watch event dropped");
    }
    applied
}

/// Depth and parent for a node appearing at `path`, or `None` when the
/// store has nowhere to attach it.
fn placement(store: &TreeStore, path: &Path) -> Option<(usize, Option<NodeId>)> {
    if store.root_paths().iter().any(|r| r == path) {
        return Some((0, None));
    }
    let parent = store.find_by_path(path.parent()?)?;
    // Unloaded directories pick the entry up on their first load.
    parent.child_ids.as_ref()?;
    Some((parent.depth + 1, Some(parent.id.clone())))
}

fn created(store: &mut TreeStore, path: &Path, stats: &EntryStats) -> bool {
    let Some((depth, parent_id)) = placement(store, path) else {
        return false;
    };
    let kind = NodeKind::from_is_dir(stats.is_directory);
    let mut node = Node::new(path, kind, depth);
    node.parent_id = parent_id;
    if kind == NodeKind::File {
        node.size = Some(stats.size);
    }
    node.last_modified = stats.modified;
    store.add_node(node);
    true
}

fn modified(store: &mut TreeStore, path: &Path, stats: &EntryStats) -> bool {
    let id = node_id(path);
    let Some(node) = store.get_node(&id) else {
        return false;
    };
    let update = NodeUpdate {
        size: (!node.is_dir()).then_some(stats.size),
        last_modified: stats.modified,
        ..Default::default()
    };
    store.update_node(&id, update).is_ok()
}

fn renamed(store: &mut TreeStore, old_path: &Path, new_path: &Path) -> bool {
    let Some(old) = store.remove_node(&node_id(old_path)) else {
        return false;
    };
    let was_root = old.depth == 0;
    let placed = if was_root {
        Some((0, None))
    } else {
        placement(store, new_path)
    };
    // Moved somewhere the store does not track: the removal stands.
    let Some((depth, parent_id)) = placed else {
        return true;
    };

    let name = new_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| new_path.to_string_lossy().to_string());
    store.add_node(Node {
        id: node_id(new_path),
        name,
        path: new_path.to_path_buf(),
        depth,
        parent_id,
        child_ids: None,
        is_expanded: false,
        is_loading: false,
        ..old
    });
    true
}
