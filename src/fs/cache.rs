use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::fs::node::Node;

/// Default time-to-live of a cached directory listing (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    nodes: Vec<Node>,
    expires_at: Instant,
}

/// Per-directory cache of child node lists with a fixed TTL.
///
/// Staleness is only observed lazily: every `get` sweeps expired entries
/// before looking up, there is no background timer.
#[derive(Debug)]
pub struct TreeCache {
    entries: HashMap<PathBuf, CacheEntry>,
    ttl: Duration,
}

impl Default for TreeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached children of `path`, or `None` on a miss.
    pub fn get(&mut self, path: &Path) -> Option<Vec<Node>> {
        self.get_at(path, Instant::now())
    }

    /// Store `nodes` for `path` with a fresh expiry.
    pub fn set(&mut self, path: &Path, nodes: Vec<Node>) {
        self.set_at(path, nodes, Instant::now());
    }

    /// Drop exactly this path's entry, expired or not.
    pub fn invalidate(&mut self, path: &Path) {
        if self.entries.remove(path).is_some() {
            debug!(path = %path.display(), "cache entry invalidated");
        }
    }

    pub fn invalidate_all(&mut self) {
        debug!(entries = self.entries.len(), "cache cleared");
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_at(&mut self, path: &Path, now: Instant) -> Option<Vec<Node>> {
        self.sweep(now);
        let hit = self.entries.get(path).map(|e| e.nodes.clone());
        debug!(path = %path.display(), hit = hit.is_some(), "cache lookup");
        hit
    }

    fn set_at(&mut self, path: &Path, nodes: Vec<Node>, now: Instant) {
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                nodes,
                expires_at: now + self.ttl,
            },
        );
    }

    fn sweep(&mut self, now: Instant) {
        self.entries.retain(|_, entry| now <= entry.expires_at);
    }
}
