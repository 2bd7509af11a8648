use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::fs::node::{node_id, Node, NodeId};
use crate::fs::sort::{compare_nodes, SortBy, SortOrder};

/// Partial update merged into an existing node by [`TreeStore::update_node`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub size: Option<u64>,
    pub last_modified: Option<SystemTime>,
    pub is_expanded: Option<bool>,
    pub is_loading: Option<bool>,
}

/// Normalized, in-memory model of the known filesystem subtree.
///
/// Nodes are keyed by [`NodeId`]; parents reference children through
/// `child_ids` and children point back through `parent_id`. Expansion,
/// selection and loading live in id sets, mirrored into the node flags.
/// All operations are synchronous; async results are applied by the caller.
#[derive(Debug, Default)]
pub struct TreeStore {
    nodes: HashMap<NodeId, Node>,
    root_paths: Vec<PathBuf>,
    selected: HashSet<NodeId>,
    expanded: HashSet<NodeId>,
    loading: HashSet<NodeId>,
    search_query: String,
    /// `None` while no filter is active.
    filtered: Option<Vec<NodeId>>,
    config: TreeConfig,
}

impl TreeStore {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    // ── Population ──────────────────────────────────────────────────────────

    /// Replace the whole table. Nodes whose parent is not part of `nodes`
    /// (and that are not roots) are dropped along with their descendants.
    /// Every kept node is linked into its parent's child list.
    pub fn set_nodes(&mut self, mut nodes: Vec<Node>) {
        nodes.sort_by_key(|n| n.depth);

        let mut table: HashMap<NodeId, Node> = HashMap::with_capacity(nodes.len());
        let mut roots = Vec::new();
        for mut node in nodes {
            let attached = match &node.parent_id {
                Some(parent) => table.contains_key(parent),
                None => true,
            };
            if !attached && node.depth > 0 {
                tracing::debug!(path = %node.path.display(), "dropping node with dangling parent");
                continue;
            }
            if !node.is_dir() {
                node.child_ids = None;
                node.is_expanded = false;
            }
            if node.depth == 0 && !roots.contains(&node.path) {
                roots.push(node.path.clone());
            }
            table.insert(node.id.clone(), node);
        }

        // Child lists may only name nodes that made it into the table.
        let present: HashSet<NodeId> = table.keys().cloned().collect();
        for node in table.values_mut() {
            if let Some(children) = node.child_ids.as_mut() {
                children.retain(|c| present.contains(c));
            }
        }
        for (parent, back_refs) in index_children(&table) {
            let Some(parent) = table.get_mut(&parent).filter(|p| p.is_dir()) else {
                continue;
            };
            let children = parent.child_ids.get_or_insert_with(Vec::new);
            let listed: HashSet<NodeId> = children.iter().cloned().collect();
            children.extend(back_refs.into_iter().filter(|c| !listed.contains(c)));
        }

        self.expanded = table
            .values()
            .filter(|n| n.is_dir() && n.is_expanded)
            .map(|n| n.id.clone())
            .collect();
        self.loading = table
            .values()
            .filter(|n| n.is_loading)
            .map(|n| n.id.clone())
            .collect();
        self.selected.retain(|id| present.contains(id));
        self.nodes = table;
        self.root_paths = roots;
        self.sort_all_children();
        self.refresh_filter();
    }

    /// Insert or overwrite a node by id.
    ///
    /// An overwritten directory keeps its loaded children unless the new
    /// value brings its own list; turning a directory into a file drops the
    /// old subtree. The node is linked into its parent's child list when
    /// that list is loaded.
    pub fn add_node(&mut self, node: Node) {
        self.insert(node);
        self.refresh_filter();
    }

    /// [`add_node`](Self::add_node) without the filter refresh.
    fn insert(&mut self, mut node: Node) {
        let id = node.id.clone();

        let existing_children = self
            .nodes
            .get(&id)
            .filter(|n| n.is_dir())
            .map(|n| n.child_ids.clone());
        match existing_children {
            Some(_) if !node.is_dir() => {
                for child in subtree(&self.child_index(), &id) {
                    self.purge(&child);
                }
            }
            Some(children) if node.child_ids.is_none() => node.child_ids = children,
            _ => {}
        }

        if node.is_dir() {
            if node.is_expanded {
                self.expanded.insert(id.clone());
            }
            node.is_expanded = self.expanded.contains(&id);
        } else {
            node.child_ids = None;
            node.is_expanded = false;
            self.expanded.remove(&id);
        }
        if node.is_loading {
            self.loading.insert(id.clone());
        }
        node.is_loading = self.loading.contains(&id);

        if node.depth == 0 && !self.root_paths.contains(&node.path) {
            self.root_paths.push(node.path.clone());
        }

        let parent = node.parent_id.clone();
        self.nodes.insert(id.clone(), node);

        if let Some(parent) = parent {
            let linked = match self.nodes.get_mut(&parent).and_then(|p| p.child_ids.as_mut()) {
                Some(children) if !children.contains(&id) => {
                    children.push(id);
                    true
                }
                _ => false,
            };
            if linked {
                self.sort_children_of(&parent);
            }
        }
    }

    /// Replace a directory's children with a freshly loaded list.
    ///
    /// Children that disappeared are removed with their subtrees; children
    /// that survive keep their own loaded children and expansion state.
    /// Returns `false` when `parent_id` is not a directory in the table.
    pub fn set_children(&mut self, parent_id: &NodeId, children: Vec<Node>) -> bool {
        match self.nodes.get(parent_id) {
            Some(parent) if parent.is_dir() => {}
            _ => return false,
        }

        // Known children are the listed ones plus any node pointing back here,
        // so children added before the first load are replaced too.
        let index = self.child_index();
        let mut known: HashSet<NodeId> = self
            .nodes
            .get(parent_id)
            .and_then(|p| p.child_ids.clone())
            .unwrap_or_default()
            .into_iter()
            .collect();
        known.extend(index.get(parent_id).cloned().unwrap_or_default());

        let incoming: HashSet<NodeId> = children.iter().map(|c| c.id.clone()).collect();
        for stale in known.iter().filter(|c| !incoming.contains(*c)) {
            for descendant in subtree(&index, stale) {
                self.purge(&descendant);
            }
            self.purge(stale);
        }

        // Unlinked while inserting so insert does not re-sort per child.
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.child_ids = None;
        }
        let mut ids = Vec::with_capacity(children.len());
        for mut child in children {
            child.parent_id = Some(parent_id.clone());
            ids.push(child.id.clone());
            self.insert(child);
        }

        self.sort_ids(&mut ids);
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.child_ids = Some(ids);
        }
        self.refresh_filter();
        true
    }

    /// Merge `update` into the node. Unknown ids are an error.
    pub fn update_node(&mut self, id: &NodeId, update: NodeUpdate) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NotFound(format!("node {}", id)))?;
        if let Some(size) = update.size {
            node.size = Some(size);
        }
        if let Some(modified) = update.last_modified {
            node.last_modified = Some(modified);
        }
        let parent = node.parent_id.clone();

        if let Some(expanded) = update.is_expanded {
            if expanded {
                self.expand(id);
            } else {
                self.collapse(id);
            }
        }
        if let Some(loading) = update.is_loading {
            self.set_loading(id, loading);
        }
        if let Some(parent) = parent {
            if matches!(self.config.sort_by, SortBy::Size | SortBy::Modified) {
                self.sort_children_of(&parent);
            }
        }
        Ok(())
    }

    /// Remove a node and its whole subtree. Returns the removed node.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let removed = self.nodes.get(id)?.clone();

        for child in subtree(&self.child_index(), id) {
            self.purge(&child);
        }
        self.purge(id);

        if let Some(parent) = &removed.parent_id {
            if let Some(children) = self.nodes.get_mut(parent).and_then(|p| p.child_ids.as_mut()) {
                children.retain(|c| c != id);
            }
        }
        Some(removed)
    }

    /// Parent id to child ids, from the `parent_id` back-references.
    fn child_index(&self) -> HashMap<NodeId, Vec<NodeId>> {
        index_children(&self.nodes)
    }

    /// Drop one id from the table and every id set.
    fn purge(&mut self, id: &NodeId) {
        if let Some(node) = self.nodes.remove(id) {
            if node.depth == 0 {
                self.root_paths.retain(|p| p != &node.path);
            }
        }
        self.selected.remove(id);
        self.expanded.remove(id);
        self.loading.remove(id);
        if let Some(filtered) = self.filtered.as_mut() {
            filtered.retain(|f| f != id);
        }
    }

    // ── Expansion ───────────────────────────────────────────────────────────

    /// Expand a directory. No-op for files and unknown ids.
    pub fn expand(&mut self, id: &NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            if node.is_dir() {
                node.is_expanded = true;
                self.expanded.insert(id.clone());
            }
        }
    }

    pub fn collapse(&mut self, id: &NodeId) {
        self.expanded.remove(id);
        if let Some(node) = self.nodes.get_mut(id) {
            node.is_expanded = false;
        }
    }

    pub fn toggle_expand(&mut self, id: &NodeId) {
        if self.expanded.contains(id) {
            self.collapse(id);
        } else {
            self.expand(id);
        }
    }

    /// Expansion set becomes exactly the directories in the table.
    pub fn expand_all(&mut self) {
        self.expanded.clear();
        for node in self.nodes.values_mut() {
            node.is_expanded = node.is_dir();
            if node.is_dir() {
                self.expanded.insert(node.id.clone());
            }
        }
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
        for node in self.nodes.values_mut() {
            node.is_expanded = false;
        }
    }

    // ── Selection ───────────────────────────────────────────────────────────

    /// Select `id`. With `multi_select` the id's membership is toggled,
    /// otherwise the selection becomes exactly `{id}`. Unknown ids are ignored.
    pub fn select(&mut self, id: &NodeId, multi_select: bool) {
        if !self.nodes.contains_key(id) {
            return;
        }
        if multi_select {
            if !self.selected.remove(id) {
                self.selected.insert(id.clone());
            }
        } else {
            self.selected.clear();
            self.selected.insert(id.clone());
        }
    }

    /// Selection becomes exactly the known ids among `ids`.
    pub fn select_many<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.selected = ids
            .into_iter()
            .filter(|id| self.nodes.contains_key(id))
            .collect();
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn select_all(&mut self) {
        self.selected = self.nodes.keys().cloned().collect();
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    pub fn set_loading(&mut self, id: &NodeId, loading: bool) {
        if loading {
            if let Some(node) = self.nodes.get_mut(id) {
                node.is_loading = true;
                self.loading.insert(id.clone());
            }
        } else {
            self.loading.remove(id);
            if let Some(node) = self.nodes.get_mut(id) {
                node.is_loading = false;
            }
        }
    }

    // ── Filter & sort ───────────────────────────────────────────────────────

    /// Case-insensitive substring filter on names. An empty query turns
    /// the filter off (`filtered_ids()` returns `None`).
    pub fn set_search_query(&mut self, query: &str) {
        self.search_query = query.to_string();
        self.refresh_filter();
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    /// Matching ids ordered by path, or `None` when no filter is active.
    pub fn filtered_ids(&self) -> Option<&[NodeId]> {
        self.filtered.as_deref()
    }

    fn refresh_filter(&mut self) {
        if self.search_query.is_empty() {
            self.filtered = None;
            return;
        }
        let query = self.search_query.to_lowercase();
        let mut matches: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.name.to_lowercase().contains(&query))
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        self.filtered = Some(matches.into_iter().map(|n| n.id.clone()).collect());
    }

    /// Store the sort settings and reorder every loaded sibling list.
    pub fn sort(&mut self, sort_by: SortBy, sort_order: SortOrder) {
        self.config.sort_by = sort_by;
        self.config.sort_order = sort_order;

        self.sort_all_children();

        let mut roots = std::mem::take(&mut self.root_paths);
        roots.sort_by(|a, b| {
            match (self.nodes.get(&node_id(a)), self.nodes.get(&node_id(b))) {
                (Some(a), Some(b)) => compare_nodes(a, b, sort_by, sort_order),
                _ => Ordering::Equal,
            }
        });
        self.root_paths = roots;
    }

    fn sort_all_children(&mut self) {
        let parents: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.child_ids.is_some())
            .map(|n| n.id.clone())
            .collect();
        for parent in parents {
            self.sort_children_of(&parent);
        }
    }

    fn sort_children_of(&mut self, parent: &NodeId) {
        let Some(mut ids) = self.nodes.get_mut(parent).and_then(|n| n.child_ids.take()) else {
            return;
        };
        self.sort_ids(&mut ids);
        if let Some(node) = self.nodes.get_mut(parent) {
            node.child_ids = Some(ids);
        }
    }

    fn sort_ids(&self, ids: &mut [NodeId]) {
        let (by, order) = (self.config.sort_by, self.config.sort_order);
        ids.sort_by(|a, b| match (self.nodes.get(a), self.nodes.get(b)) {
            (Some(a), Some(b)) => compare_nodes(a, b, by, order),
            _ => Ordering::Equal,
        });
    }

    pub fn set_show_hidden(&mut self, show: bool) {
        self.config.show_hidden = show;
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&Node> {
        self.nodes.get(&node_id(path))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Children in sibling order. A directory that was never loaded lists
    /// the nodes whose `parent_id` points at it; files have none.
    pub fn get_children(&self, id: &NodeId) -> Vec<&Node> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        match &node.child_ids {
            Some(ids) => ids.iter().filter_map(|c| self.nodes.get(c)).collect(),
            None => {
                let mut children: Vec<&Node> = self
                    .nodes
                    .values()
                    .filter(|n| n.parent_id.as_ref() == Some(id))
                    .collect();
                let (by, order) = (self.config.sort_by, self.config.sort_order);
                children.sort_by(|a, b| compare_nodes(a, b, by, order));
                children
            }
        }
    }

    pub fn get_parent(&self, id: &NodeId) -> Option<&Node> {
        self.nodes
            .get(id)
            .and_then(|n| n.parent_id.as_ref())
            .and_then(|p| self.nodes.get(p))
    }

    /// Selected nodes ordered by path.
    pub fn get_selected(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self
            .selected
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes
    }

    pub fn is_expanded(&self, id: &NodeId) -> bool {
        self.expanded.contains(id)
    }

    pub fn is_selected(&self, id: &NodeId) -> bool {
        self.selected.contains(id)
    }

    pub fn is_loading(&self, id: &NodeId) -> bool {
        self.loading.contains(id)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }

    pub fn root_paths(&self) -> &[PathBuf] {
        &self.root_paths
    }

    pub fn roots(&self) -> Vec<&Node> {
        self.root_paths
            .iter()
            .filter_map(|p| self.nodes.get(&node_id(p)))
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// The id → node table, for scans such as ranked search.
    pub fn table(&self) -> &HashMap<NodeId, Node> {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first rows for rendering.
    ///
    /// Roots are always shown; hidden entries only with `show_hidden`. While a
    /// filter is active only matches and their ancestors appear, and
    /// ancestors of matches are walked even when collapsed.
    pub fn visible_nodes(&self) -> Vec<&Node> {
        let keep = self.filtered.as_ref().map(|ids| {
            let mut keep: HashSet<&NodeId> = HashSet::new();
            for id in ids {
                let mut current = self.nodes.get(id);
                while let Some(node) = current {
                    if !keep.insert(&node.id) {
                        break;
                    }
                    current = node.parent_id.as_ref().and_then(|p| self.nodes.get(p));
                }
            }
            keep
        });

        let mut rows = Vec::new();
        for root in self.roots() {
            self.flatten_node(root, true, keep.as_ref(), &mut rows);
        }
        rows
    }

    fn flatten_node<'a>(
        &'a self,
        node: &'a Node,
        is_root: bool,
        keep: Option<&HashSet<&NodeId>>,
        rows: &mut Vec<&'a Node>,
    ) {
        if !is_root && !self.config.show_hidden && node.is_hidden() {
            return;
        }
        if let Some(keep) = keep {
            if !is_root && !keep.contains(&node.id) {
                return;
            }
        }
        rows.push(node);

        let walk = node.is_expanded || keep.is_some_and(|k| k.contains(&node.id));
        if walk {
            for child in self.get_children(&node.id) {
                self.flatten_node(child, false, keep, rows);
            }
        }
    }
}

fn index_children(nodes: &HashMap<NodeId, Node>) -> HashMap<NodeId, Vec<NodeId>> {
    let mut index: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in nodes.values() {
        if let Some(parent) = &node.parent_id {
            index.entry(parent.clone()).or_default().push(node.id.clone());
        }
    }
    index
}

/// All ids below `id` in `index`, excluding `id` itself.
fn subtree(index: &HashMap<NodeId, Vec<NodeId>>, id: &NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        for child in index.get(current).into_iter().flatten() {
            if child != id {
                out.push(child.clone());
                stack.push(child);
            }
        }
    }
    out
}
