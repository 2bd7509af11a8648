//! Composition root: owns the [`TreeStore`] and drives the [`TreeService`],
//! applying every async result back onto the store behind an existence check.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::fs::node::{Node, NodeId, NodeKind};
use crate::fs::reducer::{apply_watch_event, EntryStats, WatchEvent};
use crate::fs::service::{DeleteOutcome, SearchHit, TreeService};
use crate::fs::store::TreeStore;

pub struct App {
    store: TreeStore,
    service: Arc<TreeService>,
}

impl App {
    pub fn new(service: Arc<TreeService>, config: TreeConfig) -> Self {
        Self {
            store: TreeStore::new(config),
            service,
        }
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TreeStore {
        &mut self.store
    }

    pub fn service(&self) -> &Arc<TreeService> {
        &self.service
    }

    /// Add `path` as a root directory, load and expand it. With
    /// `auto_expand`, directories down to `max_depth` levels are loaded too.
    pub async fn open_root(&mut self, path: &Path) -> Result<NodeId> {
        let info = self.service.gateway().get_info(path).await?;
        if !info.is_directory {
            return Err(TreeError::Io(format!("{} is not a directory", path.display())));
        }

        let mut root = Node::new(path, NodeKind::Directory, 0);
        root.last_modified = info.modified;
        let id = root.id.clone();
        self.store.add_node(root);
        info!(path = %path.display(), "root opened");

        self.expand(&id).await;
        let (auto_expand, max_depth) = (self.store.config().auto_expand, self.store.config().max_depth);
        if auto_expand {
            self.expand_descendants(&id, max_depth).await;
        }
        Ok(id)
    }

    async fn expand_descendants(&mut self, root: &NodeId, levels: usize) {
        let mut frontier = vec![root.clone()];
        for _ in 1..levels {
            let show_hidden = self.store.config().show_hidden;
            let next: Vec<NodeId> = frontier
                .iter()
                .flat_map(|id| self.store.get_children(id))
                .filter(|n| n.is_dir() && (show_hidden || !n.is_hidden()))
                .map(|n| n.id.clone())
                .collect();
            for id in &next {
                self.expand(id).await;
            }
            frontier = next;
        }
    }

    // ── Expansion ───────────────────────────────────────────────────────────

    /// Mark an unloaded directory as loading and hand back a snapshot to
    /// load from. `None` for files, unknown ids, loaded directories and
    /// directories already loading.
    pub fn begin_load(&mut self, id: &NodeId) -> Option<Node> {
        let node = self.store.get_node(id)?;
        if !node.is_dir() || node.child_ids.is_some() || self.store.is_loading(id) {
            return None;
        }
        let node = node.clone();
        self.store.set_loading(id, true);
        Some(node)
    }

    /// Expand a directory, loading its children first if needed. Returns
    /// whether the node ended up expanded.
    pub async fn expand(&mut self, id: &NodeId) -> bool {
        let loaded = match self.store.get_node(id) {
            Some(node) if node.is_dir() => node.child_ids.is_some(),
            _ => return false,
        };
        if loaded {
            self.store.expand(id);
            return true;
        }

        let Some(node) = self.begin_load(id) else {
            debug!(id = %id, "expand ignored while loading");
            return false;
        };
        let config = self.store.config().clone();
        match self.service.try_load_children(&node, &config, true).await {
            Ok(children) => {
                let applied = self.apply_children(id, children);
                if applied {
                    self.store.expand(id);
                }
                applied
            }
            Err(_) => {
                self.store.set_loading(id, false);
                false
            }
        }
    }

    pub fn collapse(&mut self, id: &NodeId) {
        self.store.collapse(id);
    }

    pub async fn toggle_expand(&mut self, id: &NodeId) {
        if self.store.is_expanded(id) {
            self.store.collapse(id);
        } else {
            self.expand(id).await;
        }
    }

    /// Apply a finished load. Results for nodes removed in the meantime
    /// are discarded.
    pub fn apply_children(&mut self, parent_id: &NodeId, children: Vec<Node>) -> bool {
        if !self.store.contains(parent_id) {
            debug!(id = %parent_id, "discarding children of removed node");
            return false;
        }
        self.store.set_loading(parent_id, false);
        self.store.set_children(parent_id, children)
    }

    // ── Refresh ─────────────────────────────────────────────────────────────

    /// Re-read one directory (a file refreshes its parent), bypassing the cache.
    pub async fn refresh(&mut self, id: &NodeId) -> bool {
        let target = match self.store.get_node(id) {
            Some(node) if node.is_dir() => node.clone(),
            Some(node) => match node.parent_id.as_ref().and_then(|p| self.store.get_node(p)) {
                Some(parent) => parent.clone(),
                None => return false,
            },
            None => return false,
        };
        self.reload(&target, false).await
    }

    /// Drop every cached listing and reload all loaded directories, parents
    /// before children.
    pub async fn refresh_all(&mut self) {
        self.service.invalidate_all();
        let mut loaded: Vec<Node> = self
            .store
            .nodes()
            .filter(|n| n.child_ids.is_some())
            .cloned()
            .collect();
        loaded.sort_by_key(|n| n.depth);
        for node in loaded {
            if self.store.contains(&node.id) {
                self.reload(&node, true).await;
            }
        }
    }

    async fn reload(&mut self, node: &Node, use_cache: bool) -> bool {
        let config = self.store.config().clone();
        match self.service.try_load_children(node, &config, use_cache).await {
            Ok(children) => self.apply_children(&node.id, children),
            Err(_) => false,
        }
    }

    // ── Mutations ───────────────────────────────────────────────────────────

    pub async fn create(&mut self, parent_id: &NodeId, name: &str, kind: NodeKind) -> Option<NodeId> {
        let parent = self.store.get_node(parent_id).filter(|n| n.is_dir())?.clone();
        let config = self.store.config().clone();
        let mut node = self
            .service
            .create_node(&parent.path, name, kind, &config)
            .await?;
        node.depth = parent.depth + 1;
        node.parent_id = Some(parent.id.clone());
        let id = node.id.clone();

        let parent_loaded = self.store.get_node(parent_id)?.child_ids.is_some();
        if parent_loaded {
            self.store.add_node(node);
        } else {
            // Its first load lists the new entry.
            self.expand(parent_id).await;
        }
        Some(id)
    }

    pub async fn delete(&mut self, id: &NodeId) -> bool {
        let Some(node) = self.store.get_node(id).cloned() else {
            return false;
        };
        let deleted = self.service.delete_node(&node).await;
        if deleted {
            self.store.remove_node(id);
        }
        deleted
    }

    /// Delete every selected node concurrently; nodes stay marked loading
    /// while their delete is in flight.
    pub async fn delete_selected(&mut self) -> DeleteOutcome {
        let targets: Vec<Node> = self.store.get_selected().into_iter().cloned().collect();
        for node in &targets {
            self.store.set_loading(&node.id, true);
        }

        let outcome = self.service.delete_multiple_nodes(&targets).await;
        for node in &outcome.successful {
            self.store.remove_node(&node.id);
        }
        for (node, _) in &outcome.failed {
            self.store.set_loading(&node.id, false);
        }
        outcome
    }

    /// Rename on disk, then swap the old node for the new one. Expansion and
    /// selection follow the node.
    pub async fn rename(&mut self, id: &NodeId, new_name: &str) -> Option<NodeId> {
        let old = self.store.get_node(id)?.clone();
        let renamed = self.service.rename_node(&old, new_name).await?;
        if renamed.id == old.id {
            return Some(old.id);
        }

        let was_expanded = self.store.is_expanded(&old.id);
        let was_selected = self.store.is_selected(&old.id);
        let new_id = renamed.id.clone();
        self.store.remove_node(&old.id);
        self.store.add_node(renamed);

        if was_selected {
            self.store.select(&new_id, true);
        }
        if was_expanded {
            self.expand(&new_id).await;
        }
        Some(new_id)
    }

    // ── Search ──────────────────────────────────────────────────────────────

    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        TreeService::search_nodes(self.store.table(), query, self.store.config())
    }

    // ── Watch events ────────────────────────────────────────────────────────

    /// Invalidate the affected listings, then reduce the event into the store.
    pub fn handle_watch_event(&mut self, event: &WatchEvent) -> bool {
        let path = event.path();
        self.service.invalidate(path);
        if let Some(parent) = path.parent() {
            self.service.invalidate(parent);
        }
        if let WatchEvent::Renamed { old_path, .. } = event {
            self.service.invalidate(old_path);
            if let Some(parent) = old_path.parent() {
                self.service.invalidate(parent);
            }
        }
        apply_watch_event(&mut self.store, event)
    }

    /// Turn a raw watcher batch into typed events by statting each path,
    /// and apply them in order. A root path in the batch triggers a full
    /// refresh. Returns the number of events that changed the store.
    pub async fn handle_fs_change(&mut self, paths: &[PathBuf]) -> usize {
        let mut applied = 0;
        for path in paths {
            if self.store.root_paths().contains(path) {
                self.refresh_all().await;
                continue;
            }
            let event = self.classify(path).await;
            if self.handle_watch_event(&event) {
                applied += 1;
            }
        }
        applied
    }

    async fn classify(&self, path: &Path) -> WatchEvent {
        match self.service.gateway().get_info(path).await {
            Ok(info) => {
                let stats = Some(EntryStats {
                    is_directory: info.is_directory,
                    size: info.size,
                    modified: info.modified,
                });
                if self.store.find_by_path(path).is_some() {
                    WatchEvent::Modified {
                        path: path.to_path_buf(),
                        stats,
                    }
                } else {
                    WatchEvent::Created {
                        path: path.to_path_buf(),
                        stats,
                    }
                }
            }
            Err(_) => WatchEvent::Deleted {
                path: path.to_path_buf(),
            },
        }
    }

    // ── Side effects ────────────────────────────────────────────────────────

    pub async fn copy_path(&self, id: &NodeId) {
        if let Some(node) = self.store.get_node(id) {
            self.service.copy_path_to_clipboard(node).await;
        }
    }

    pub async fn reveal(&self, id: &NodeId) {
        if let Some(node) = self.store.get_node(id) {
            self.service.reveal_in_file_manager(node).await;
        }
    }
}
