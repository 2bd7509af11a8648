//! Directory loads and filesystem mutations, going through the gateway and
//! the listing cache, with validation and user-facing reporting.
//!
//! The service never touches the [`TreeStore`](crate::fs::store::TreeStore):
//! it returns nodes and outcomes, and the caller applies them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::fs::cache::TreeCache;
use crate::fs::gateway::DirectoryGateway;
use crate::fs::names::validate_name;
use crate::fs::node::{node_id, segment_count, Node, NodeId, NodeKind};
use crate::fs::sort::{compare_nodes, natural_cmp};
use crate::notifications::NotificationSink;

type LoadWaiter = oneshot::Sender<Result<Vec<Node>>>;

/// Outcome of a batch delete. Every node is attempted.
#[derive(Debug, Default)]
pub struct DeleteOutcome {
    pub successful: Vec<Node>,
    pub failed: Vec<(Node, TreeError)>,
}

/// How a search hit matched; earlier variants rank higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRank {
    NamePrefix,
    Name,
    /// Matched only in the full path, which includes the extension.
    Path,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub node: Node,
    pub rank: MatchRank,
}

pub struct TreeService {
    gateway: Arc<dyn DirectoryGateway>,
    notifier: Arc<dyn NotificationSink>,
    cache: Mutex<TreeCache>,
    loads: Mutex<Loads>,
    report_success: bool,
}

/// Listings in progress, keyed by path. Lock order is `loads` then `cache`.
///
/// Invalidating a path detaches its load: the load still answers the callers
/// already waiting on it, but it no longer fills the cache and new callers
/// start a fresh listing.
#[derive(Default)]
struct Loads {
    active: HashMap<PathBuf, InFlight>,
    detached: HashMap<u64, Vec<LoadWaiter>>,
    next_ticket: u64,
}

struct InFlight {
    ticket: u64,
    waiters: Vec<LoadWaiter>,
}

enum Joined {
    Lead(u64),
    Wait(oneshot::Receiver<Result<Vec<Node>>>),
}

impl Loads {
    fn join(&mut self, path: &Path) -> Joined {
        if let Some(load) = self.active.get_mut(path) {
            let (tx, rx) = oneshot::channel();
            load.waiters.push(tx);
            return Joined::Wait(rx);
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.active.insert(
            path.to_path_buf(),
            InFlight {
                ticket,
                waiters: Vec::new(),
            },
        );
        Joined::Lead(ticket)
    }

    fn detach(&mut self, path: &Path) {
        if let Some(load) = self.active.remove(path) {
            debug!(path = %path.display(), "detached in-flight load");
            self.detached.insert(load.ticket, load.waiters);
        }
    }

    fn detach_all(&mut self) {
        for (_, load) in self.active.drain() {
            self.detached.insert(load.ticket, load.waiters);
        }
    }

    /// Waiters of the load, and whether it was still current.
    fn take(&mut self, path: &Path, ticket: u64) -> (Vec<LoadWaiter>, bool) {
        let current = self
            .active
            .get(path)
            .map_or(false, |load| load.ticket == ticket);
        if current {
            let waiters = self
                .active
                .remove(path)
                .map(|load| load.waiters)
                .unwrap_or_default();
            (waiters, true)
        } else {
            (self.detached.remove(&ticket).unwrap_or_default(), false)
        }
    }
}

/// Removes the load entry even if the leading load is dropped midway;
/// waiters then observe a closed channel.
struct LoadGuard<'a> {
    loads: &'a Mutex<Loads>,
    path: &'a Path,
    ticket: Option<u64>,
}

impl LoadGuard<'_> {
    fn disarm(mut self) {
        self.ticket = None;
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            lock(self.loads).take(self.path, ticket);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl TreeService {
    pub fn new(
        gateway: Arc<dyn DirectoryGateway>,
        notifier: Arc<dyn NotificationSink>,
        cache: TreeCache,
    ) -> Self {
        Self {
            gateway,
            notifier,
            cache: Mutex::new(cache),
            loads: Mutex::new(Loads::default()),
            report_success: true,
        }
    }

    /// Whether successful mutations are confirmed through the sink.
    pub fn with_success_reports(mut self, enabled: bool) -> Self {
        self.report_success = enabled;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn DirectoryGateway> {
        &self.gateway
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }

    /// Drop the cached listing of `path` and keep any listing still in
    /// flight for it from writing its result back.
    pub fn invalidate(&self, path: &Path) {
        let mut loads = lock(&self.loads);
        loads.detach(path);
        lock(&self.cache).invalidate(path);
    }

    pub fn invalidate_all(&self) {
        let mut loads = lock(&self.loads);
        loads.detach_all();
        lock(&self.cache).invalidate_all();
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    /// Children of `path` at depth `segment_count(path)`, hidden entries
    /// removed unless `config.show_hidden`.
    pub async fn read_directory(
        &self,
        path: &Path,
        config: &TreeConfig,
        use_cache: bool,
    ) -> Result<Vec<Node>> {
        self.read_directory_at(path, segment_count(path), config, use_cache)
            .await
    }

    /// Children of a directory node, one level below it. Failures are
    /// reported and yield an empty list; files yield an empty list.
    pub async fn load_children(
        &self,
        node: &Node,
        config: &TreeConfig,
        use_cache: bool,
    ) -> Vec<Node> {
        self.try_load_children(node, config, use_cache)
            .await
            .unwrap_or_default()
    }

    /// Like [`load_children`](Self::load_children) but hands the failure back
    /// (after reporting it) so the caller can tell "empty" from "failed".
    pub async fn try_load_children(
        &self,
        node: &Node,
        config: &TreeConfig,
        use_cache: bool,
    ) -> Result<Vec<Node>> {
        if !node.is_dir() {
            return Ok(Vec::new());
        }
        self.read_directory_at(&node.path, node.depth + 1, config, use_cache)
            .await
            .map_err(|e| {
                warn!(path = %node.path.display(), error = %e, "directory load failed");
                self.notifier.report_error(
                    "Failed to load directory",
                    &format!("{}: {}", node.path.display(), e),
                );
                e
            })
    }

    async fn read_directory_at(
        &self,
        path: &Path,
        depth: usize,
        config: &TreeConfig,
        use_cache: bool,
    ) -> Result<Vec<Node>> {
        let cached = if use_cache {
            lock(&self.cache).get(path)
        } else {
            None
        };
        if let Some(hit) = cached {
            return Ok(shape(hit, depth, config));
        }

        let joined = lock(&self.loads).join(path);
        let ticket = match joined {
            Joined::Lead(ticket) => ticket,
            Joined::Wait(rx) => {
                debug!(path = %path.display(), "joining in-flight load");
                return match rx.await {
                    Ok(result) => result.map(|nodes| shape(nodes, depth, config)),
                    Err(_) => Err(TreeError::Unknown(format!(
                        "load of {} was cancelled",
                        path.display()
                    ))),
                };
            }
        };

        let guard = LoadGuard {
            loads: &self.loads,
            path,
            ticket: Some(ticket),
        };
        let result = self.fetch(path).await;
        let waiters = {
            let mut loads = lock(&self.loads);
            let (waiters, current) = loads.take(path, ticket);
            match &result {
                Ok(nodes) if use_cache && current => lock(&self.cache).set(path, nodes.clone()),
                Ok(_) if use_cache => {
                    debug!(path = %path.display(), "listing went stale in flight, not cached")
                }
                _ => {}
            }
            waiters
        };
        guard.disarm();
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        result.map(|nodes| shape(nodes, depth, config))
    }

    /// Unfiltered listing; the cache keeps hidden entries so a later
    /// show-hidden toggle does not need a refetch.
    async fn fetch(&self, path: &Path) -> Result<Vec<Node>> {
        if !self.gateway.exists(path).await {
            return Err(TreeError::not_found(path));
        }
        let entries = self.gateway.list_entries(path).await?;
        let parent_id = node_id(path);
        debug!(path = %path.display(), entries = entries.len(), "directory listed");

        Ok(entries
            .iter()
            .map(|entry| {
                let mut node = Node::from_entry(path, entry, 1);
                node.parent_id = Some(parent_id.clone());
                node
            })
            .collect())
    }

    // ── Mutations ───────────────────────────────────────────────────────────

    /// Create `name` under `parent_path`. Returns the new node (for the
    /// caller to insert) or `None` after reporting the failure.
    pub async fn create_node(
        &self,
        parent_path: &Path,
        name: &str,
        kind: NodeKind,
        config: &TreeConfig,
    ) -> Option<Node> {
        match self.try_create(parent_path, name, kind).await {
            Ok(node) => {
                info!(path = %node.path.display(), "created");
                if node.is_hidden() && !config.show_hidden {
                    self.notifier.report_warning(
                        "Hidden item created",
                        &format!("{} is hidden while hidden files are not shown", node.name),
                    );
                } else if self.report_success {
                    self.notifier.report_success("Created", &node.name);
                }
                Some(node)
            }
            Err(e) => {
                self.report_failure("Create failed", &parent_path.join(name), &e);
                None
            }
        }
    }

    async fn try_create(&self, parent_path: &Path, name: &str, kind: NodeKind) -> Result<Node> {
        validate_name(name)?;
        let path = parent_path.join(name);
        self.gateway
            .create(&path, kind == NodeKind::Directory)
            .await?;
        self.invalidate(parent_path);

        let mut node = Node::new(&path, kind, segment_count(parent_path))
            .with_modified(SystemTime::now());
        node.parent_id = Some(node_id(parent_path));
        if kind == NodeKind::File {
            node.size = Some(0);
        }
        if kind == NodeKind::Directory {
            node.child_ids = Some(Vec::new());
        }
        Ok(node)
    }

    /// Delete one node on disk. The caller removes it from the store on `true`.
    pub async fn delete_node(&self, node: &Node) -> bool {
        match self.try_delete(node).await {
            Ok(()) => {
                info!(path = %node.path.display(), "deleted");
                if self.report_success {
                    self.notifier.report_success("Deleted", &node.name);
                }
                true
            }
            Err(e) => {
                self.report_failure("Delete failed", &node.path, &e);
                false
            }
        }
    }

    async fn try_delete(&self, node: &Node) -> Result<()> {
        self.gateway.delete(&node.path).await?;
        self.invalidate(&node.path);
        if let Some(parent) = node.path.parent() {
            self.invalidate(parent);
        }
        Ok(())
    }

    /// Rename on disk. Returns the renamed node (new id, name and path);
    /// the old node is left untouched for the caller to remove.
    pub async fn rename_node(&self, node: &Node, new_name: &str) -> Option<Node> {
        match self.try_rename(node, new_name).await {
            Ok(renamed) => {
                info!(from = %node.path.display(), to = %renamed.path.display(), "renamed");
                if self.report_success {
                    self.notifier
                        .report_success("Renamed", &format!("{} → {}", node.name, renamed.name));
                }
                Some(renamed)
            }
            Err(e) => {
                self.report_failure("Rename failed", &node.path, &e);
                None
            }
        }
    }

    async fn try_rename(&self, node: &Node, new_name: &str) -> Result<Node> {
        validate_name(new_name)?;
        let new_path = node.path.with_file_name(new_name);
        if new_path == node.path {
            return Ok(node.clone());
        }
        self.gateway.rename(&node.path, &new_path).await?;

        self.invalidate(&node.path);
        self.invalidate(&new_path);
        if let Some(parent) = node.path.parent() {
            self.invalidate(parent);
        }

        Ok(Node {
            id: node_id(&new_path),
            name: new_name.to_string(),
            path: new_path,
            last_modified: Some(SystemTime::now()),
            // Children were keyed by the old paths.
            child_ids: None,
            is_expanded: false,
            is_loading: false,
            ..node.clone()
        })
    }

    /// Delete every node concurrently. One failure never stops the others
    /// and nothing is rolled back.
    pub async fn delete_multiple_nodes(&self, nodes: &[Node]) -> DeleteOutcome {
        let attempts = nodes.iter().map(|node| async move {
            let result = self.try_delete(node).await;
            (node, result)
        });
        let results = join_all(attempts).await;

        let mut outcome = DeleteOutcome::default();
        for (node, result) in results {
            match result {
                Ok(()) => outcome.successful.push(node.clone()),
                Err(e) => {
                    warn!(path = %node.path.display(), error = %e, "batch delete item failed");
                    outcome.failed.push((node.clone(), e));
                }
            }
        }

        let total = nodes.len();
        if outcome.failed.is_empty() {
            if self.report_success && total > 0 {
                self.notifier
                    .report_success("Deleted", &format!("{} item(s) deleted", total));
            }
        } else {
            let detail = outcome
                .failed
                .iter()
                .map(|(n, e)| format!("{}: {}", n.name, e))
                .collect::<Vec<_>>()
                .join("\n");
            self.notifier.report_error(
                &format!("Deleted {} of {} item(s)", outcome.successful.len(), total),
                &detail,
            );
        }
        outcome
    }

    // ── Side effects ────────────────────────────────────────────────────────

    pub async fn copy_path_to_clipboard(&self, node: &Node) {
        match self.gateway.copy_path_to_clipboard(&node.path).await {
            Ok(()) if self.report_success => self
                .notifier
                .report_success("Path copied", &node.path.display().to_string()),
            Ok(()) => {}
            Err(e) => self
                .notifier
                .report_warning("Could not copy path", &e.to_string()),
        }
    }

    pub async fn reveal_in_file_manager(&self, node: &Node) {
        if let Err(e) = self.gateway.reveal_in_file_manager(&node.path).await {
            self.notifier
                .report_warning("Could not open file manager", &e.to_string());
        }
    }

    // ── Search ──────────────────────────────────────────────────────────────

    /// Ranked scan of the table: name-prefix matches, then other name
    /// matches, then path-only matches; ties in natural name order. An empty
    /// query yields nothing.
    pub fn search_nodes(
        table: &HashMap<NodeId, Node>,
        query: &str,
        config: &TreeConfig,
    ) -> Vec<SearchHit> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = table
            .values()
            .filter(|n| config.show_hidden || !n.is_hidden())
            .filter_map(|node| {
                let name = node.name.to_lowercase();
                let rank = if name.starts_with(&query) {
                    MatchRank::NamePrefix
                } else if name.contains(&query) {
                    MatchRank::Name
                } else if node.path.to_string_lossy().to_lowercase().contains(&query) {
                    MatchRank::Path
                } else {
                    return None;
                };
                Some(SearchHit {
                    node: node.clone(),
                    rank,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| natural_cmp(&a.node.name, &b.node.name))
                .then_with(|| a.node.path.cmp(&b.node.path))
        });
        hits
    }

    fn report_failure(&self, title: &str, path: &Path, err: &TreeError) {
        warn!(path = %path.display(), error = %err, "{}", title);
        self.notifier
            .report_error(title, &format!("{}: {}", err.title(), err));
    }
}

/// Re-stamp depth, drop hidden entries unless shown, and order siblings.
fn shape(nodes: Vec<Node>, depth: usize, config: &TreeConfig) -> Vec<Node> {
    let mut nodes: Vec<Node> = nodes
        .into_iter()
        .filter(|n| config.show_hidden || !n.is_hidden())
        .map(|mut n| {
            n.depth = depth;
            n
        })
        .collect();
    nodes.sort_by(|a, b| compare_nodes(a, b, config.sort_by, config.sort_order));
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::testing::{Level, MemoryGateway, Op, RecordingSink};
    use crate::fs::store::TreeStore;
    use std::time::Duration;

    fn gateway() -> MemoryGateway {
        MemoryGateway::new()
            .with_dir("/p")
            .with_file("/p/a.txt", 10)
            .with_file("/p/b.txt", 20)
            .with_file("/p/.env", 1)
            .with_dir("/p/src")
            .with_file("/p/src/lib.rs", 5)
    }

    fn service(gw: MemoryGateway) -> (TreeService, Arc<MemoryGateway>, Arc<RecordingSink>) {
        let gw = Arc::new(gw);
        let sink = Arc::new(RecordingSink::new());
        let svc = TreeService::new(gw.clone(), sink.clone(), TreeCache::new());
        (svc, gw, sink)
    }

    fn names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    fn dir_node(path: &str, depth: usize) -> Node {
        Node::new(Path::new(path), NodeKind::Directory, depth)
    }

    #[tokio::test]
    async fn read_directory_maps_entries() {
        let (svc, _, _) = service(gateway());
        let nodes = svc
            .read_directory(Path::new("/p"), &TreeConfig::default(), true)
            .await
            .unwrap();

        assert_eq!(names(&nodes), vec!["src", "a.txt", "b.txt"]);
        for n in &nodes {
            assert_eq!(n.depth, 1);
            assert_eq!(n.parent_id, Some(node_id(Path::new("/p"))));
        }
        assert_eq!(nodes[1].size, Some(10));
    }

    #[tokio::test]
    async fn read_directory_shows_hidden_on_request() {
        let (svc, _, _) = service(gateway());
        let config = TreeConfig {
            show_hidden: true,
            ..Default::default()
        };
        let nodes = svc.read_directory(Path::new("/p"), &config, true).await.unwrap();
        assert!(names(&nodes).contains(&".env"));
    }

    #[tokio::test]
    async fn hidden_toggle_is_served_from_cache() {
        let (svc, gw, _) = service(gateway());
        let hidden_off = TreeConfig::default();
        let hidden_on = TreeConfig {
            show_hidden: true,
            ..Default::default()
        };
        svc.read_directory(Path::new("/p"), &hidden_off, true).await.unwrap();
        let nodes = svc.read_directory(Path::new("/p"), &hidden_on, true).await.unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(gw.list_calls(), 1);
    }

    #[tokio::test]
    async fn read_directory_missing_path_is_not_found() {
        let (svc, gw, _) = service(gateway());
        let err = svc
            .read_directory(Path::new("/nope"), &TreeConfig::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::NotFound(_)));
        assert_eq!(gw.list_calls(), 0);
    }

    #[tokio::test]
    async fn read_directory_propagates_gateway_errors() {
        let gw = gateway().fail(Op::List, "/p", TreeError::PermissionDenied("/p".into()));
        let (svc, _, _) = service(gw);
        let err = svc
            .read_directory(Path::new("/p"), &TreeConfig::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn cache_hit_skips_gateway_and_bypass_refetches() {
        let (svc, gw, _) = service(gateway());
        let config = TreeConfig::default();
        svc.read_directory(Path::new("/p"), &config, true).await.unwrap();
        svc.read_directory(Path::new("/p"), &config, true).await.unwrap();
        assert_eq!(gw.list_calls(), 1);

        svc.read_directory(Path::new("/p"), &config, false).await.unwrap();
        assert_eq!(gw.list_calls(), 2);
    }

    #[tokio::test]
    async fn expired_cache_entry_refetches() {
        let gw = Arc::new(gateway());
        let sink = Arc::new(RecordingSink::new());
        let svc = TreeService::new(
            gw.clone(),
            sink,
            TreeCache::with_ttl(Duration::from_millis(20)),
        );
        let config = TreeConfig::default();
        svc.read_directory(Path::new("/p"), &config, true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        svc.read_directory(Path::new("/p"), &config, true).await.unwrap();
        assert_eq!(gw.list_calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_gateway_call() {
        let gw = gateway().with_list_delay(Duration::from_millis(50));
        let (svc, gw, _) = service(gw);
        let node = dir_node("/p", 0);
        let config = TreeConfig::default();

        let (first, second) = tokio::join!(
            svc.load_children(&node, &config, false),
            svc.load_children(&node, &config, false),
        );
        assert_eq!(gw.list_calls(), 1);
        assert_eq!(names(&first), names(&second));
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn create_during_load_is_not_masked_by_stale_cache() {
        let gw = gateway().with_list_tail_delay(Duration::from_millis(50));
        let (svc, gw, _) = service(gw);
        let config = TreeConfig::default();

        let (first, created) = tokio::join!(
            svc.read_directory(Path::new("/p"), &config, true),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                svc.create_node(Path::new("/p"), "c.txt", NodeKind::File, &config)
                    .await
            },
        );
        assert!(!names(&first.unwrap()).contains(&"c.txt"));
        assert!(created.is_some());

        let listed = svc.read_directory(Path::new("/p"), &config, true).await.unwrap();
        assert!(names(&listed).contains(&"c.txt"));
        assert_eq!(gw.list_calls(), 2);
    }

    #[tokio::test]
    async fn load_after_invalidation_does_not_join_stale_listing() {
        let gw = gateway().with_list_tail_delay(Duration::from_millis(50));
        let (svc, gw, _) = service(gw);
        let config = TreeConfig::default();

        let (first, second) = tokio::join!(
            svc.read_directory(Path::new("/p"), &config, true),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                gw.insert(Path::new("/p/late.txt"), false, 0);
                svc.invalidate(Path::new("/p"));
                svc.read_directory(Path::new("/p"), &config, true).await
            },
        );
        assert!(!names(&first.unwrap()).contains(&"late.txt"));
        assert!(names(&second.unwrap()).contains(&"late.txt"));
        assert_eq!(gw.list_calls(), 2);

        // The fresh listing is the one cached.
        let cached = svc.read_directory(Path::new("/p"), &config, true).await.unwrap();
        assert!(names(&cached).contains(&"late.txt"));
        assert_eq!(gw.list_calls(), 2);
    }

    #[tokio::test]
    async fn load_children_of_file_is_empty() {
        let (svc, gw, _) = service(gateway());
        let file = Node::new(Path::new("/p/a.txt"), NodeKind::File, 1);
        assert!(svc
            .load_children(&file, &TreeConfig::default(), true)
            .await
            .is_empty());
        assert_eq!(gw.list_calls(), 0);
    }

    #[tokio::test]
    async fn load_children_uses_relative_depth() {
        let (svc, _, _) = service(gateway());
        let children = svc
            .load_children(&dir_node("/p", 0), &TreeConfig::default(), true)
            .await;
        assert!(children.iter().all(|c| c.depth == 1));
        let nested = svc
            .load_children(&dir_node("/p/src", 1), &TreeConfig::default(), true)
            .await;
        assert_eq!(nested[0].depth, 2);
    }

    #[tokio::test]
    async fn load_failure_reports_and_returns_empty() {
        let gw = gateway().fail(Op::List, "/p/src", TreeError::Io("disk".into()));
        let (svc, _, sink) = service(gw);
        let children = svc
            .load_children(&dir_node("/p/src", 1), &TreeConfig::default(), true)
            .await;
        assert!(children.is_empty());
        assert_eq!(sink.titles(Level::Error), vec!["Failed to load directory"]);
    }

    #[tokio::test]
    async fn create_node_validates_before_gateway() {
        let (svc, gw, sink) = service(gateway());
        let created = svc
            .create_node(Path::new("/p"), "bad:name", NodeKind::File, &TreeConfig::default())
            .await;
        assert!(created.is_none());
        assert!(!gw.contains("/p/bad:name"));
        assert_eq!(sink.titles(Level::Error), vec!["Create failed"]);
    }

    #[tokio::test]
    async fn dot_names_never_reach_gateway() {
        let (svc, gw, sink) = service(gateway());
        let config = TreeConfig::default();
        assert!(svc
            .create_node(Path::new("/p/src"), "..", NodeKind::Directory, &config)
            .await
            .is_none());

        let a = Node::new(Path::new("/p/a.txt"), NodeKind::File, 1);
        assert!(svc.rename_node(&a, ".").await.is_none());
        assert!(svc.rename_node(&a, "..").await.is_none());
        assert!(gw.contains("/p/a.txt"));
        assert_eq!(
            sink.titles(Level::Error),
            vec!["Create failed", "Rename failed", "Rename failed"]
        );
    }

    #[tokio::test]
    async fn create_node_invalidates_parent_and_returns_node() {
        let (svc, gw, sink) = service(gateway());
        let config = TreeConfig::default();
        svc.read_directory(Path::new("/p"), &config, true).await.unwrap();

        let node = svc
            .create_node(Path::new("/p"), "c.txt", NodeKind::File, &config)
            .await
            .unwrap();
        assert_eq!(node.id, node_id(Path::new("/p/c.txt")));
        assert_eq!(node.parent_id, Some(node_id(Path::new("/p"))));
        assert_eq!(node.depth, 1);
        assert_eq!(node.size, Some(0));
        assert!(gw.contains("/p/c.txt"));
        assert_eq!(sink.count(Level::Success), 1);

        let listed = svc.read_directory(Path::new("/p"), &config, true).await.unwrap();
        assert!(names(&listed).contains(&"c.txt"));
        assert_eq!(gw.list_calls(), 2);
    }

    #[tokio::test]
    async fn create_existing_reports_already_exists() {
        let (svc, _, sink) = service(gateway());
        let created = svc
            .create_node(Path::new("/p"), "a.txt", NodeKind::File, &TreeConfig::default())
            .await;
        assert!(created.is_none());
        assert_eq!(sink.count(Level::Error), 1);
    }

    #[tokio::test]
    async fn creating_hidden_file_warns_when_hidden_not_shown() {
        let (svc, _, sink) = service(gateway());
        svc.create_node(Path::new("/p"), ".secret", NodeKind::File, &TreeConfig::default())
            .await
            .unwrap();
        assert_eq!(sink.titles(Level::Warning), vec!["Hidden item created"]);
    }

    #[tokio::test]
    async fn delete_node_invalidates_caches() {
        let (svc, gw, _) = service(gateway());
        let config = TreeConfig::default();
        svc.read_directory(Path::new("/p"), &config, true).await.unwrap();

        let node = Node::new(Path::new("/p/a.txt"), NodeKind::File, 1);
        assert!(svc.delete_node(&node).await);
        assert!(!gw.contains("/p/a.txt"));

        let listed = svc.read_directory(Path::new("/p"), &config, true).await.unwrap();
        assert!(!names(&listed).contains(&"a.txt"));
    }

    #[tokio::test]
    async fn delete_node_failure_returns_false() {
        let gw = gateway().fail(Op::Delete, "/p/a.txt", TreeError::PermissionDenied("ro".into()));
        let (svc, _, sink) = service(gw);
        let node = Node::new(Path::new("/p/a.txt"), NodeKind::File, 1);
        assert!(!svc.delete_node(&node).await);
        assert_eq!(sink.titles(Level::Error), vec!["Delete failed"]);
    }

    #[tokio::test]
    async fn rename_returns_new_node_and_store_round_trips() {
        let (svc, gw, _) = service(gateway());
        let mut store = TreeStore::default();
        store.add_node(dir_node("/p", 0));
        let children = svc
            .load_children(&dir_node("/p", 0), &TreeConfig::default(), true)
            .await;
        store.set_children(&node_id(Path::new("/p")), children);

        let old = store.find_by_path(Path::new("/p/a.txt")).unwrap().clone();
        let renamed = svc.rename_node(&old, "renamed.txt").await.unwrap();
        assert_eq!(renamed.path, PathBuf::from("/p/renamed.txt"));
        assert_eq!(renamed.size, old.size);
        assert!(gw.contains("/p/renamed.txt"));

        store.remove_node(&old.id);
        store.add_node(renamed.clone());
        assert_eq!(store.get_node(&renamed.id).unwrap().name, "renamed.txt");
        assert!(store.get_node(&old.id).is_none());
    }

    #[tokio::test]
    async fn rename_rejects_invalid_names() {
        let (svc, gw, sink) = service(gateway());
        let node = Node::new(Path::new("/p/a.txt"), NodeKind::File, 1);
        assert!(svc.rename_node(&node, "   ").await.is_none());
        assert!(svc.rename_node(&node, "LPT1").await.is_none());
        assert!(gw.contains("/p/a.txt"));
        assert_eq!(sink.count(Level::Error), 2);
    }

    #[tokio::test]
    async fn rename_onto_existing_fails() {
        let (svc, _, _) = service(gateway());
        let node = Node::new(Path::new("/p/a.txt"), NodeKind::File, 1);
        assert!(svc.rename_node(&node, "b.txt").await.is_none());
    }

    #[tokio::test]
    async fn batch_delete_partitions_results() {
        let gw = gateway().fail(Op::Delete, "/p/b.txt", TreeError::PermissionDenied("ro".into()));
        let (svc, gw, sink) = service(gw);
        let a = Node::new(Path::new("/p/a.txt"), NodeKind::File, 1);
        let b = Node::new(Path::new("/p/b.txt"), NodeKind::File, 1);

        let outcome = svc.delete_multiple_nodes(&[a.clone(), b.clone()]).await;
        assert_eq!(outcome.successful, vec![a]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, b);
        assert!(matches!(outcome.failed[0].1, TreeError::PermissionDenied(_)));
        assert!(!gw.contains("/p/a.txt"));
        assert!(gw.contains("/p/b.txt"));
        assert_eq!(sink.titles(Level::Error), vec!["Deleted 1 of 2 item(s)"]);
    }

    #[tokio::test]
    async fn batch_delete_attempts_every_node() {
        let gw = gateway()
            .fail(Op::Delete, "/p/a.txt", TreeError::Io("x".into()))
            .fail(Op::Delete, "/p/b.txt", TreeError::Io("y".into()));
        let (svc, gw, _) = service(gw);
        let nodes = vec![
            Node::new(Path::new("/p/a.txt"), NodeKind::File, 1),
            Node::new(Path::new("/p/b.txt"), NodeKind::File, 1),
            Node::new(Path::new("/p/src"), NodeKind::Directory, 1),
        ];
        let outcome = svc.delete_multiple_nodes(&nodes).await;
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.successful.len(), 1);
        assert!(!gw.contains("/p/src/lib.rs"));
    }

    #[tokio::test]
    async fn copy_path_forwards_and_reveal_failure_warns() {
        let (svc, gw, sink) = service(gateway());
        let node = Node::new(Path::new("/p/a.txt"), NodeKind::File, 1);
        svc.copy_path_to_clipboard(&node).await;
        svc.reveal_in_file_manager(&node).await;
        assert_eq!(gw.copied.lock().unwrap().clone(), vec![PathBuf::from("/p/a.txt")]);
        assert_eq!(sink.titles(Level::Warning), vec!["Could not open file manager"]);
    }

    fn search_table() -> HashMap<NodeId, Node> {
        [
            Node::new(Path::new("/p"), NodeKind::Directory, 0),
            Node::new(Path::new("/p/config"), NodeKind::Directory, 1),
            Node::new(Path::new("/p/config/app.toml"), NodeKind::File, 2),
            Node::new(Path::new("/p/my_config.rs"), NodeKind::File, 1),
            Node::new(Path::new("/p/config.rs"), NodeKind::File, 1),
            Node::new(Path::new("/p/.config"), NodeKind::File, 1),
            Node::new(Path::new("/p/readme.md"), NodeKind::File, 1),
        ]
        .into_iter()
        .map(|n| (n.id.clone(), n))
        .collect()
    }

    #[test]
    fn search_ranks_prefix_then_name_then_path() {
        let hits = TreeService::search_nodes(&search_table(), "config", &TreeConfig::default());
        let ranked: Vec<(&str, MatchRank)> =
            hits.iter().map(|h| (h.node.name.as_str(), h.rank)).collect();
        assert_eq!(
            ranked,
            vec![
                ("config", MatchRank::NamePrefix),
                ("config.rs", MatchRank::NamePrefix),
                ("my_config.rs", MatchRank::Name),
                ("app.toml", MatchRank::Path),
            ]
        );
    }

    #[test]
    fn search_includes_hidden_when_shown() {
        let config = TreeConfig {
            show_hidden: true,
            ..Default::default()
        };
        let hits = TreeService::search_nodes(&search_table(), "CONFIG", &config);
        assert!(hits.iter().any(|h| h.node.name == ".config"));
    }

    #[test]
    fn search_empty_query_is_empty() {
        assert!(TreeService::search_nodes(&search_table(), "  ", &TreeConfig::default()).is_empty());
    }

    #[test]
    fn search_by_extension() {
        let hits = TreeService::search_nodes(&search_table(), ".md", &TreeConfig::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.name, "readme.md");
        assert_eq!(hits[0].rank, MatchRank::Name);
    }
}
