//! Tree nodes and the path → id identity function.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::fs::gateway::DirEntryRecord;

/// Number of digest bytes kept in a [`NodeId`] (hex-encoded to twice as many chars).
const ID_BYTES: usize = 16;

/// Stable identifier of a node, derived from its normalized absolute path.
///
/// Always 32 lowercase hex characters, whatever the path depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the id for a path.
///
/// Pure and deterministic: the path is lexically normalized (`.` dropped,
/// `..` folded, trailing separators ignored) and its raw bytes are hashed
/// with SHA-256, so names that are not valid UTF-8 keep distinct ids.
pub fn node_id(path: &Path) -> NodeId {
    let digest = Sha256::digest(normalized_bytes(path));
    NodeId(hex::encode(&digest[..ID_BYTES]))
}

/// Lexical normalization used as the hash input. Never touches the filesystem.
fn normalized_bytes(path: &Path) -> Vec<u8> {
    let mut prefix: &[u8] = &[];
    let mut absolute = false;
    let mut parts: Vec<&[u8]> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().as_encoded_bytes(),
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() && !absolute {
                    parts.push(b"..");
                }
            }
            Component::Normal(name) => parts.push(name.as_encoded_bytes()),
        }
    }

    let mut out = prefix.to_vec();
    if absolute {
        out.push(b'/');
    }
    // '/' never occurs inside a component.
    out.extend_from_slice(&parts.join(&b'/'));
    out
}

/// Count of named segments in a path (`/p/a.txt` → 2).
pub fn segment_count(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn from_is_dir(is_dir: bool) -> Self {
        if is_dir {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }
}

/// One filesystem entry known to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub path: PathBuf,
    pub kind: NodeKind,
    /// Bytes; files only.
    pub size: Option<u64>,
    pub last_modified: Option<SystemTime>,
    pub depth: usize,
    /// Back-reference to the parent; never ownership.
    pub parent_id: Option<NodeId>,
    /// `None` until the directory has been loaded. Always `None` for files.
    pub child_ids: Option<Vec<NodeId>>,
    pub is_expanded: bool,
    pub is_loading: bool,
}

impl Node {
    /// Build a node for `path`. Nodes at depth 0 are roots and carry no parent.
    pub fn new(path: &Path, kind: NodeKind, depth: usize) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let parent_id = if depth == 0 {
            None
        } else {
            path.parent().map(node_id)
        };

        Self {
            id: node_id(path),
            name,
            path: path.to_path_buf(),
            kind,
            size: None,
            last_modified: None,
            depth,
            parent_id,
            child_ids: None,
            is_expanded: false,
            is_loading: false,
        }
    }

    /// Map a raw gateway record listed under `parent` to a node.
    pub fn from_entry(parent: &Path, entry: &DirEntryRecord, depth: usize) -> Self {
        let kind = NodeKind::from_is_dir(entry.is_directory);
        let mut node = Node::new(&parent.join(&entry.name), kind, depth);
        if kind == NodeKind::File {
            node.size = Some(entry.size);
        }
        node.last_modified = entry.modified;
        node
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.last_modified = Some(modified);
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Dotfiles are hidden.
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Lowercased extension without the dot; empty for directories and
    /// extension-less files.
    pub fn extension(&self) -> String {
        if self.is_dir() {
            return String::new();
        }
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}
