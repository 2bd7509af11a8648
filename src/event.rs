use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::debug;

/// Events driving the `--watch` loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Paths reported changed by the filesystem watcher.
    FsChange(Vec<PathBuf>),
    /// Ctrl-C or an explicit stop request.
    Shutdown,
}

/// Channel hub for watcher output and the Ctrl-C signal.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    tx: mpsc::UnboundedSender<Event>,
}

impl EventHandler {
    /// Create the channel and spawn the Ctrl-C listener.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let signal_tx = tx.clone();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("ctrl-c received");
                let _ = signal_tx.send(Event::Shutdown);
            }
        });

        Self { rx, tx }
    }

    /// Sender for the watcher and other producers.
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    /// Next event, or `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
