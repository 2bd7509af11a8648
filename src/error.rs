use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type used by the tree engine.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Failures surfaced by the tree service and the directory gateway.
///
/// `Clone` so one load result can be handed to every caller waiting on the
/// same in-flight directory read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    /// Path or node is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The gateway was refused access.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Create or rename target collides with an existing entry.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Rejected by filename validation before any gateway call.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Generic gateway failure.
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl TreeError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        TreeError::NotFound(path.into().display().to_string())
    }

    pub fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        TreeError::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Short title for user-facing notifications.
    pub fn title(&self) -> &'static str {
        match self {
            TreeError::NotFound(_) => "Not found",
            TreeError::PermissionDenied(_) => "Permission denied",
            TreeError::AlreadyExists(_) => "Already exists",
            TreeError::InvalidName { .. } => "Invalid name",
            TreeError::Io(_) => "I/O error",
            TreeError::Unknown(_) => "Unexpected error",
        }
    }
}

impl From<io::Error> for TreeError {
    fn from(err: io::Error) -> Self {
        let msg = err.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => TreeError::NotFound(msg),
            io::ErrorKind::PermissionDenied => TreeError::PermissionDenied(msg),
            io::ErrorKind::AlreadyExists => TreeError::AlreadyExists(msg),
            _ => TreeError::Io(msg),
        }
    }
}

/// Errors that end the `ftree` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}
