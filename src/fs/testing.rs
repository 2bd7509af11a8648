//! In-memory gateway and recording sink for service and app tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::{Result, TreeError};
use crate::fs::gateway::{DirEntryRecord, DirectoryGateway, EntryInfo};
use crate::notifications::NotificationSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Create,
    Delete,
    Rename,
}

#[derive(Debug, Clone)]
struct MemEntry {
    is_dir: bool,
    size: u64,
    modified: SystemTime,
}

/// Fake filesystem keyed by absolute path, with per-path failure injection.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    entries: Mutex<BTreeMap<PathBuf, MemEntry>>,
    failures: Mutex<HashMap<(Op, PathBuf), TreeError>>,
    list_delay: Duration,
    list_tail_delay: Duration,
    list_calls: AtomicUsize,
    pub copied: Mutex<Vec<PathBuf>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.insert(Path::new(path), true, 0);
        self
    }

    pub fn with_file(self, path: &str, size: u64) -> Self {
        self.insert(Path::new(path), false, size);
        self
    }

    /// Make every listing sleep first, so concurrent loads overlap.
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    /// Make every listing snapshot the entries first and sleep before
    /// returning, so writes that land meanwhile are missing from the result.
    pub fn with_list_tail_delay(mut self, delay: Duration) -> Self {
        self.list_tail_delay = delay;
        self
    }

    pub fn fail(self, op: Op, path: &str, err: TreeError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((op, PathBuf::from(path)), err);
        self
    }

    pub fn insert(&self, path: &Path, is_dir: bool, size: u64) {
        self.entries.lock().unwrap().insert(
            path.to_path_buf(),
            MemEntry {
                is_dir,
                size,
                modified: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            },
        );
    }

    pub fn remove(&self, path: &Path) {
        self.entries
            .lock()
            .unwrap()
            .retain(|p, _| !p.starts_with(path));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().unwrap().contains_key(Path::new(path))
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn injected(&self, op: Op, path: &Path) -> Result<()> {
        match self.failures.lock().unwrap().get(&(op, path.to_path_buf())) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DirectoryGateway for MemoryGateway {
    async fn list_entries(&self, path: &Path) -> Result<Vec<DirEntryRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        self.injected(Op::List, path)?;

        let records: Vec<DirEntryRecord> = {
            let entries = self.entries.lock().unwrap();
            match entries.get(path) {
                Some(e) if e.is_dir => {}
                _ => return Err(TreeError::not_found(path)),
            }
            entries
                .iter()
                .filter(|(p, _)| p.parent() == Some(path))
                .map(|(p, e)| DirEntryRecord {
                    name: p.file_name().unwrap().to_os_string(),
                    is_directory: e.is_dir,
                    size: e.size,
                    modified: Some(e.modified),
                })
                .collect()
        };
        if !self.list_tail_delay.is_zero() {
            tokio::time::sleep(self.list_tail_delay).await;
        }
        Ok(records)
    }

    async fn exists(&self, path: &Path) -> bool {
        self.entries.lock().unwrap().contains_key(path)
    }

    async fn get_info(&self, path: &Path) -> Result<EntryInfo> {
        let entries = self.entries.lock().unwrap();
        let e = entries.get(path).ok_or_else(|| TreeError::not_found(path))?;
        Ok(EntryInfo {
            is_directory: e.is_dir,
            size: e.size,
            created: Some(e.modified),
            modified: Some(e.modified),
            accessed: Some(e.modified),
        })
    }

    async fn create(&self, path: &Path, is_directory: bool) -> Result<()> {
        self.injected(Op::Create, path)?;
        if self.exists(path).await {
            return Err(TreeError::AlreadyExists(path.display().to_string()));
        }
        let parent = path.parent().unwrap_or(path);
        if !self.exists(parent).await {
            return Err(TreeError::not_found(parent));
        }
        self.insert(path, is_directory, 0);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.injected(Op::Delete, path)?;
        if !self.exists(path).await {
            return Err(TreeError::not_found(path));
        }
        self.remove(path);
        Ok(())
    }

    async fn rename(&self, old_path: &Path, new_path: &Path) -> Result<()> {
        self.injected(Op::Rename, old_path)?;
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(new_path) {
            return Err(TreeError::AlreadyExists(new_path.display().to_string()));
        }
        let moved: Vec<PathBuf> = entries
            .keys()
            .filter(|p| p.starts_with(old_path))
            .cloned()
            .collect();
        if moved.is_empty() {
            return Err(TreeError::not_found(old_path));
        }
        for p in moved {
            if let Some(e) = entries.remove(&p) {
                let rest = p.strip_prefix(old_path).unwrap();
                entries.insert(new_path.join(rest), e);
            }
        }
        Ok(())
    }

    async fn copy_path_to_clipboard(&self, path: &Path) -> Result<()> {
        self.copied.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn reveal_in_file_manager(&self, _path: &Path) -> Result<()> {
        Err(TreeError::Unknown("no file manager in tests".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
    Warning,
}

/// Sink that keeps every report for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(Level, String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, level: Level) -> usize {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| *l == level)
            .count()
    }

    /// Titles of every report at `level`, in arrival order.
    pub fn titles(&self, level: Level) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| *l == level)
            .map(|(_, t, _)| t.clone())
            .collect()
    }

    fn push(&self, level: Level, title: &str, detail: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((level, title.to_string(), detail.to_string()));
    }
}

impl NotificationSink for RecordingSink {
    fn report_success(&self, title: &str, detail: &str) {
        self.push(Level::Success, title, detail);
    }

    fn report_error(&self, title: &str, detail: &str) {
        self.push(Level::Error, title, detail);
    }

    fn report_warning(&self, title: &str, detail: &str) {
        self.push(Level::Warning, title, detail);
    }
}
