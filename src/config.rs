//! Configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--show-hidden`, `--sort`, `--depth`, etc.)
//! 2. `--config <file>`
//! 3. `$FTREE_CONFIG` environment variable (path to config file)
//! 4. Project-local `.ftree.toml` in the current working directory
//! 5. Global `~/.config/ftree/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::fs::sort::{SortBy, SortOrder};

// ── Runtime tree settings ────────────────────────────────────────────────────

/// Sort/display configuration held by the tree store and passed to the
/// service for directory reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub show_hidden: bool,
    /// Directory levels below a root loaded eagerly when `auto_expand` is on.
    pub max_depth: usize,
    pub auto_expand: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            sort_by: SortBy::Name,
            sort_order: SortOrder::Ascending,
            show_hidden: false,
            max_depth: DEFAULT_MAX_DEPTH,
            auto_expand: false,
        }
    }
}

// ── Section configs ──────────────────────────────────────────────────────────

/// Tree panel settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeSection {
    pub show_hidden: Option<bool>,
    /// "name", "type", "size" or "modified".
    pub sort_by: Option<String>,
    /// "asc" or "desc".
    pub sort_order: Option<String>,
    pub max_depth: Option<usize>,
    pub auto_expand: Option<bool>,
}

/// Directory listing cache settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheSection {
    pub ttl_secs: Option<u64>,
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WatcherSection {
    pub enabled: Option<bool>,
    pub debounce_ms: Option<u64>,
    /// Events per debounce window above which a batch collapses into a root refresh.
    pub flood_threshold: Option<usize>,
    /// Path components never reported.
    pub ignore: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogSection {
    /// `tracing` filter directive, e.g. "info" or "file_tree_engine=debug".
    pub level: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub tree: TreeSection,
    pub cache: CacheSection,
    pub watcher: WatcherSection,
    pub log: LogSection,
}

// ── Default constants ────────────────────────────────────────────────────────

pub const DEFAULT_MAX_DEPTH: usize = 1;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_FLOOD_THRESHOLD: usize = 100;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "target",
];

// ── Config file locator ──────────────────────────────────────────────────────

/// Candidate config file paths in priority order (highest first).
///
/// Does not include the CLI `--config` path, which is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("FTREE_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".ftree.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("ftree").join("config.toml"));
    }

    paths
}

/// Read and parse a TOML config file. `None` if the file is missing or
/// unparseable (the latter is logged).
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse config file");
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            tree: TreeSection {
                show_hidden: other.tree.show_hidden.or(self.tree.show_hidden),
                sort_by: other.tree.sort_by.clone().or(self.tree.sort_by),
                sort_order: other.tree.sort_order.clone().or(self.tree.sort_order),
                max_depth: other.tree.max_depth.or(self.tree.max_depth),
                auto_expand: other.tree.auto_expand.or(self.tree.auto_expand),
            },
            cache: CacheSection {
                ttl_secs: other.cache.ttl_secs.or(self.cache.ttl_secs),
            },
            watcher: WatcherSection {
                enabled: other.watcher.enabled.or(self.watcher.enabled),
                debounce_ms: other.watcher.debounce_ms.or(self.watcher.debounce_ms),
                flood_threshold: other
                    .watcher
                    .flood_threshold
                    .or(self.watcher.flood_threshold),
                ignore: other.watcher.ignore.clone().or(self.watcher.ignore),
            },
            log: LogSection {
                level: other.log.level.clone().or(self.log.level),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so higher ones overwrite.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn show_hidden(&self) -> bool {
        self.tree.show_hidden.unwrap_or(false)
    }

    pub fn sort_by(&self) -> SortBy {
        self.tree
            .sort_by
            .as_deref()
            .map(SortBy::from_str)
            .unwrap_or_default()
    }

    pub fn sort_order(&self) -> SortOrder {
        self.tree
            .sort_order
            .as_deref()
            .map(SortOrder::from_str)
            .unwrap_or_default()
    }

    pub fn max_depth(&self) -> usize {
        self.tree.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }

    pub fn auto_expand(&self) -> bool {
        self.tree.auto_expand.unwrap_or(false)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS))
    }

    pub fn watcher_enabled(&self) -> bool {
        self.watcher.enabled.unwrap_or(true)
    }

    pub fn debounce_ms(&self) -> u64 {
        self.watcher.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    pub fn flood_threshold(&self) -> usize {
        self.watcher
            .flood_threshold
            .unwrap_or(DEFAULT_FLOOD_THRESHOLD)
    }

    pub fn ignore_patterns(&self) -> Vec<String> {
        self.watcher.ignore.clone().unwrap_or_else(|| {
            DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect()
        })
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Runtime settings for the tree store.
    pub fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            sort_by: self.sort_by(),
            sort_order: self.sort_order(),
            show_hidden: self.show_hidden(),
            max_depth: self.max_depth(),
            auto_expand: self.auto_expand(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
