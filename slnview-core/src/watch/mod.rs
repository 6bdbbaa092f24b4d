//! Filesystem notifications.
//!
//! Watcher callbacks arrive on a thread owned by `notify` (or, when the host
//! shell forwards its own watcher, on whichever task reads its messages).
//! They never touch the tree: every notification is turned into a
//! [`FileEvent`] and sent over an unbounded mpsc channel. A single pump task
//! drains that channel and publishes onto the [`EventAggregator`], so bus
//! handlers observe file events one at a time and in arrival order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::events::{EventAggregator, FileEvent, FileEventKind};

/// Entry point for filesystem notifications, whatever their source.
#[derive(Clone)]
pub struct FileEventSink {
    tx: mpsc::UnboundedSender<FileEvent>,
}

impl FileEventSink {
    pub fn on_create(&self, path: impl Into<PathBuf>) {
        self.send(FileEvent::new(FileEventKind::Create, path));
    }

    pub fn on_change(&self, path: impl Into<PathBuf>) {
        self.send(FileEvent::new(FileEventKind::Modify, path));
    }

    pub fn on_delete(&self, path: impl Into<PathBuf>) {
        self.send(FileEvent::new(FileEventKind::Delete, path));
    }

    pub fn send(&self, event: FileEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("File event dropped, pump has stopped: {:?}", e.0.path);
        }
    }
}

/// Owns the pump task. Dropping it stops publishing.
pub struct EventPump {
    sink: FileEventSink,
    task: JoinHandle<()>,
}

impl EventPump {
    pub fn start(bus: EventAggregator) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<FileEvent>();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                bus.publish(event);
            }
        });

        Self {
            sink: FileEventSink { tx },
            task,
        }
    }

    pub fn sink(&self) -> FileEventSink {
        self.sink.clone()
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Recursive `notify` watcher over the workspace roots, feeding a
/// [`FileEventSink`].
pub struct FileSystemWatcher {
    watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl FileSystemWatcher {
    pub fn start(roots: &[PathBuf], sink: FileEventSink) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    for file_event in convert_notify_event(event) {
                        sink.send(file_event);
                    }
                }
                Err(e) => error!("Notify error: {:?}", e),
            }
        })
        .context("Failed to create filesystem watcher")?;

        let mut watched = Vec::new();
        for root in roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", root.display()))?;
            debug!("Watching {}", root.display());
            watched.push(root.clone());
        }

        Ok(Self { watcher, watched })
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    pub fn unwatch(&mut self, root: &Path) -> Result<()> {
        self.watcher
            .unwatch(root)
            .with_context(|| format!("Failed to unwatch {}", root.display()))?;
        self.watched.retain(|p| p != root);
        Ok(())
    }
}

/// Renames become a delete of the old path followed by a create of the new
/// one; access notifications are dropped.
fn convert_notify_event(event: notify::Event) -> Vec<FileEvent> {
    use notify::event::{ModifyKind, RenameMode};

    let kind = match event.kind {
        EventKind::Create(_) => FileEventKind::Create,
        EventKind::Remove(_) => FileEventKind::Delete,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            return vec![
                FileEvent::new(FileEventKind::Delete, event.paths[0].clone()),
                FileEvent::new(FileEventKind::Create, event.paths[1].clone()),
            ];
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FileEventKind::Delete,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FileEventKind::Create,
        EventKind::Modify(_) => FileEventKind::Modify,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return vec![],
    };

    event
        .paths
        .into_iter()
        .map(|path| FileEvent::new(kind, path))
        .collect()
}
