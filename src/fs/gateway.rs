//! Directory access boundary: the trait the tree service consumes and a
//! local-disk implementation on `tokio::fs`.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

use arboard::Clipboard;
use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, TreeError};

/// Raw directory entry as listed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryRecord {
    /// Raw file name; not necessarily valid UTF-8.
    pub name: OsString,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Metadata for a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub is_directory: bool,
    pub size: u64,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
}

impl From<std::fs::Metadata> for EntryInfo {
    fn from(meta: std::fs::Metadata) -> Self {
        Self {
            is_directory: meta.is_dir(),
            size: meta.len(),
            created: meta.created().ok(),
            modified: meta.modified().ok(),
            accessed: meta.accessed().ok(),
        }
    }
}

/// Filesystem reads, writes and side effects used by the tree service.
#[async_trait]
pub trait DirectoryGateway: Send + Sync {
    /// Entries of a directory. Fails if the path is unreadable.
    async fn list_entries(&self, path: &Path) -> Result<Vec<DirEntryRecord>>;

    async fn exists(&self, path: &Path) -> bool;

    /// Fails with `NotFound` for missing paths.
    async fn get_info(&self, path: &Path) -> Result<EntryInfo>;

    async fn create(&self, path: &Path, is_directory: bool) -> Result<()>;

    async fn delete(&self, path: &Path) -> Result<()>;

    async fn rename(&self, old_path: &Path, new_path: &Path) -> Result<()>;

    async fn copy_path_to_clipboard(&self, path: &Path) -> Result<()>;

    async fn reveal_in_file_manager(&self, path: &Path) -> Result<()>;
}

/// Gateway backed by the local disk and the system clipboard.
#[derive(Default)]
pub struct LocalGateway {
    /// Opened on first copy; headless sessions never touch the display.
    clipboard: Mutex<Option<Clipboard>>,
}

impl LocalGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

fn clipboard_error(e: arboard::Error) -> TreeError {
    TreeError::Unknown(format!("clipboard unavailable: {}", e))
}

#[async_trait]
impl DirectoryGateway for LocalGateway {
    /// Symlinks are followed; broken links list as files. Entries whose
    /// metadata cannot be read are skipped.
    async fn list_entries(&self, path: &Path) -> Result<Vec<DirEntryRecord>> {
        let mut entries = fs::read_dir(path).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            let meta = match fs::metadata(&entry_path).await {
                Ok(m) => m,
                Err(_) => match fs::symlink_metadata(&entry_path).await {
                    Ok(m) => m,
                    Err(e) => {
                        debug!(path = %entry_path.display(), error = %e, "skipping unreadable entry");
                        continue;
                    }
                },
            };
            records.push(DirEntryRecord {
                name: entry.file_name(),
                is_directory: meta.is_dir(),
                size: meta.len(),
                modified: meta.modified().ok(),
            });
        }
        Ok(records)
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn get_info(&self, path: &Path) -> Result<EntryInfo> {
        Ok(fs::metadata(path).await?.into())
    }

    /// Never truncates: an existing file is `AlreadyExists`.
    async fn create(&self, path: &Path, is_directory: bool) -> Result<()> {
        if is_directory {
            fs::create_dir(path).await?;
        } else {
            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await?;
        }
        Ok(())
    }

    /// Directories are removed recursively.
    async fn delete(&self, path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(path).await?;
        if meta.is_dir() {
            fs::remove_dir_all(path).await?;
        } else {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    /// Refuses to overwrite an existing target.
    async fn rename(&self, old_path: &Path, new_path: &Path) -> Result<()> {
        if fs::try_exists(new_path).await.unwrap_or(false) {
            return Err(TreeError::AlreadyExists(new_path.display().to_string()));
        }
        fs::rename(old_path, new_path).await?;
        Ok(())
    }

    async fn copy_path_to_clipboard(&self, path: &Path) -> Result<()> {
        let mut slot = self.clipboard.lock().unwrap_or_else(|e| e.into_inner());
        let clipboard = match slot.as_mut() {
            Some(clipboard) => clipboard,
            None => slot.insert(Clipboard::new().map_err(clipboard_error)?),
        };
        clipboard
            .set_text(path.to_string_lossy().into_owned())
            .map_err(clipboard_error)?;
        debug!(path = %path.display(), "copied path to clipboard");
        Ok(())
    }

    /// Spawns the platform file manager and does not wait for it.
    async fn reveal_in_file_manager(&self, path: &Path) -> Result<()> {
        let mut command = reveal_command(path);
        command.spawn()?;
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn reveal_command(path: &Path) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("open");
    cmd.arg("-R").arg(path);
    cmd
}

#[cfg(target_os = "windows")]
fn reveal_command(path: &Path) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("explorer");
    cmd.arg(format!("/select,{}", path.display()));
    cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn reveal_command(path: &Path) -> tokio::process::Command {
    // xdg-open cannot select a file, so open the containing directory.
    let target = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(path)
    };
    let mut cmd = tokio::process::Command::new("xdg-open");
    cmd.arg(target);
    cmd
}
