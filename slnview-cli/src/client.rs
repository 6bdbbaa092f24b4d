use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use anyhow::{bail, Result};
use slnview_core::explorer::{ExplorerActor, ExplorerEvent};
use slnview_core::settings::SettingsManager;
use slnview_core::tree::{Collapsible, NodeId, TreeItem};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Request/response wrapper over the explorer actor. The actor answers in
/// order, so every request waits for its matching event and anything else
/// that arrives in between is kept for `next_notification`.
pub struct ExplorerClient {
    actor: ExplorerActor,
    events: mpsc::UnboundedReceiver<ExplorerEvent>,
    pending: Vec<ExplorerEvent>,
}

/// A node together with the children that were expanded below it.
pub struct Expanded {
    pub item: TreeItem,
    pub children: Vec<Expanded>,
}

impl ExplorerClient {
    pub fn launch(roots: Vec<PathBuf>, settings: SettingsManager, watch: bool) -> Self {
        let (actor, events) = if watch {
            ExplorerActor::launch(roots, settings)
        } else {
            ExplorerActor::launch_unwatched(roots, settings)
        };
        Self {
            actor,
            events,
            pending: Vec::new(),
        }
    }

    async fn wait_for<F>(&mut self, pred: F) -> Result<ExplorerEvent>
    where
        F: Fn(&ExplorerEvent) -> bool,
    {
        loop {
            let Some(event) = self.events.recv().await else {
                bail!("Explorer stopped");
            };
            if pred(&event) {
                return Ok(event);
            }
            match event {
                ExplorerEvent::Error(message) => bail!(message),
                other => {
                    debug!(?other, "Deferring explorer event");
                    self.pending.push(other);
                }
            }
        }
    }

    pub async fn children(&mut self, node: Option<NodeId>) -> Result<Vec<TreeItem>> {
        self.actor.get_children(node)?;
        let event = self
            .wait_for(|e| matches!(e, ExplorerEvent::Children { node: n, .. } if *n == node))
            .await?;
        match event {
            ExplorerEvent::Children {
                items: Some(items), ..
            } => Ok(items),
            _ => bail!("Node {node:?} is no longer in the tree"),
        }
    }

    /// Loads the tree down to `depth` levels below the roots.
    pub async fn expand(&mut self, depth: usize) -> Result<Vec<Expanded>> {
        let roots = self.children(None).await?;
        let mut out = Vec::with_capacity(roots.len());
        for root in roots {
            out.push(self.expand_item(root, depth).await?);
        }
        Ok(out)
    }

    fn expand_item(
        &mut self,
        item: TreeItem,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Expanded>> + '_>> {
        Box::pin(async move {
            let mut children = Vec::new();
            if depth > 0 && item.collapsible != Collapsible::None {
                for child in self.children(Some(item.id)).await? {
                    children.push(self.expand_item(child, depth - 1).await?);
                }
            }
            Ok(Expanded { item, children })
        })
    }

    /// The next event that was not an answer to a request: tree changes,
    /// load failures and the like.
    pub async fn next_notification(&mut self) -> Option<ExplorerEvent> {
        if !self.pending.is_empty() {
            return Some(self.pending.remove(0));
        }
        self.events.recv().await
    }

    pub fn report_pending(&mut self) {
        for event in self.pending.drain(..) {
            match event {
                ExplorerEvent::LoadFailures(failures) => {
                    for failure in failures {
                        warn!(
                            "Could not load {}: {}",
                            failure.solution_path.display(),
                            failure.message
                        );
                        eprintln!(
                            "warning: could not load {}: {}",
                            failure.solution_path.display(),
                            failure.message
                        );
                    }
                }
                other => debug!(?other, "Dropping explorer event"),
            }
        }
    }
}
