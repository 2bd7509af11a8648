//! User-facing feedback channel used by the tree service.

use tracing::{error, info, warn};

/// Receives human-readable outcome reports.
///
/// Implementations must not block; failures inside a sink are not observable
/// by the caller.
pub trait NotificationSink: Send + Sync {
    fn report_success(&self, title: &str, detail: &str);
    fn report_error(&self, title: &str, detail: &str);
    fn report_warning(&self, title: &str, detail: &str);
}

/// Sink that forwards every report to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn report_success(&self, title: &str, detail: &str) {
        info!(target: "notifications", %title, %detail);
    }

    fn report_error(&self, title: &str, detail: &str) {
        error!(target: "notifications", %title, %detail);
    }

    fn report_warning(&self, title: &str, detail: &str) {
        warn!(target: "notifications", %title, %detail);
    }
}
