//! Normalized file-tree state engine: an id-keyed node store, a TTL cache of
//! directory listings, an async service over a pluggable directory gateway,
//! and a reducer that keeps the store in step with filesystem watch events.

pub mod app;
pub mod config;
pub mod error;
pub mod event;
pub mod fs;
pub mod logging;
pub mod notifications;

pub use app::App;
pub use error::{AppError, Result, TreeError};
pub use fs::node::{node_id, Node, NodeId, NodeKind};
pub use fs::store::TreeStore;
