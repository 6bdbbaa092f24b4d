use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::commands::{Answer, CommandContext, CommandRegistry};
use crate::events::{EventAggregator, SolutionEvent};
use crate::explorer::events::ExplorerEvent;
use crate::settings::{Settings, SettingsManager, ShowMode};
use crate::tree::{NodeId, TreeChange, TreeSynchronizer};
use crate::watch::{EventPump, FileSystemWatcher};
use crate::workspace::WorkspaceRoots;

/// Defines the possible input messages to the `ExplorerActor`.
///
/// These messages derive serde so they can cross process boundaries: editor
/// extensions spawn `slnview-subprocess` and send these as JSON lines over
/// stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExplorerMessage {
    /// Children of a node, or the solution roots when `node` is `None`
    GetChildren { node: Option<NodeId> },
    GetParent { node: NodeId },
    /// Finds the node showing `path`, e.g. to reveal the active editor
    Search { path: PathBuf },
    Refresh { node: Option<NodeId> },

    /// Filesystem notifications forwarded by the host instead of (or in
    /// addition to) the built-in watcher
    FileCreated { path: PathBuf },
    FileChanged { path: PathBuf },
    FileDeleted { path: PathBuf },

    GetCommands { node: NodeId },
    GetPrompts { node: NodeId, command: String },
    RunCommand {
        node: NodeId,
        command: String,
        answers: Vec<Answer>,
    },

    GetLoadFailures,
    GetSettings,
    SaveSettings { settings: serde_json::Value },
}

/// The `ExplorerActor` is the backend of every slnview front-end.
///
/// It owns the tree synchronizer and processes one message at a time, so
/// all tree reads and rebuilds are serialized on its task. Front-ends send
/// `ExplorerMessage`s through `tx` and render the `ExplorerEvent`s coming
/// out of the receiver returned by `launch`.
pub struct ExplorerActor {
    pub tx: mpsc::UnboundedSender<ExplorerMessage>,
}

impl ExplorerActor {
    /// Launch the explorer with a recursive filesystem watcher over the
    /// workspace roots.
    pub fn launch(
        workspace_roots: Vec<PathBuf>,
        settings_manager: SettingsManager,
    ) -> (Self, mpsc::UnboundedReceiver<ExplorerEvent>) {
        Self::spawn(workspace_roots, settings_manager, true)
    }

    /// Launch without a watcher; the host forwards filesystem changes with
    /// the `File*` messages.
    pub fn launch_unwatched(
        workspace_roots: Vec<PathBuf>,
        settings_manager: SettingsManager,
    ) -> (Self, mpsc::UnboundedReceiver<ExplorerEvent>) {
        Self::spawn(workspace_roots, settings_manager, false)
    }

    fn spawn(
        workspace_roots: Vec<PathBuf>,
        settings_manager: SettingsManager,
        watch: bool,
    ) -> (Self, mpsc::UnboundedReceiver<ExplorerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let settings = settings_manager.settings();
            let workspace = WorkspaceRoots::new(workspace_roots);
            if workspace.is_empty() {
                info!("No workspace roots, the tree will stay empty");
            }

            let bus = EventAggregator::new();
            let pump = EventPump::start(bus.clone());
            let mut sync = TreeSynchronizer::new(workspace, settings.clone(), bus.clone());
            sync.register();
            let Some(changes) = sync.take_changes() else {
                error!("Tree change receiver already taken");
                return;
            };

            let mut state = ActorState {
                event_tx,
                sync,
                commands: CommandRegistry::default(),
                context: CommandContext { bus: bus.clone() },
                bus,
                settings: settings_manager,
                pump,
                watch,
                watcher: None,
                offered_templates: HashSet::new(),
            };
            state.update_watcher(&settings);

            run_actor(state, rx, changes).await;
        });

        (ExplorerActor { tx }, event_rx)
    }

    pub fn get_children(&self, node: Option<NodeId>) -> Result<()> {
        self.tx.send(ExplorerMessage::GetChildren { node })?;
        Ok(())
    }

    pub fn search(&self, path: PathBuf) -> Result<()> {
        self.tx.send(ExplorerMessage::Search { path })?;
        Ok(())
    }

    pub fn refresh(&self, node: Option<NodeId>) -> Result<()> {
        self.tx.send(ExplorerMessage::Refresh { node })?;
        Ok(())
    }

    pub fn run_command(&self, node: NodeId, command: String, answers: Vec<Answer>) -> Result<()> {
        self.tx.send(ExplorerMessage::RunCommand {
            node,
            command,
            answers,
        })?;
        Ok(())
    }

    pub fn get_settings(&self) -> Result<()> {
        self.tx.send(ExplorerMessage::GetSettings)?;
        Ok(())
    }

    pub fn save_settings(&self, settings: serde_json::Value) -> Result<()> {
        self.tx.send(ExplorerMessage::SaveSettings { settings })?;
        Ok(())
    }
}

struct ActorState {
    event_tx: mpsc::UnboundedSender<ExplorerEvent>,
    sync: TreeSynchronizer,
    commands: CommandRegistry,
    context: CommandContext,
    bus: EventAggregator,
    settings: SettingsManager,
    pump: EventPump,
    watch: bool,
    watcher: Option<FileSystemWatcher>,
    offered_templates: HashSet<PathBuf>,
}

impl ActorState {
    fn emit(&self, event: ExplorerEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }

    /// The watcher runs only while the explorer is visible.
    fn update_watcher(&mut self, settings: &Settings) {
        if !self.watch || settings.show_mode == ShowMode::None {
            self.watcher = None;
            return;
        }
        if self.watcher.is_some() {
            return;
        }
        match FileSystemWatcher::start(self.sync.workspace().roots(), self.pump.sink()) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => error!(?e, "Failed to start filesystem watcher"),
        }
    }
}

async fn run_actor(
    mut state: ActorState,
    mut rx: mpsc::UnboundedReceiver<ExplorerMessage>,
    mut changes: mpsc::UnboundedReceiver<TreeChange>,
) {
    info!("ExplorerActor started");

    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some(message) = message else {
                    info!("Explorer request queue dropped, stopping");
                    break;
                };
                let rebuilds = state.sync.rebuild_count();
                let mut result = process_message(&mut state, message).await;
                if state.sync.rebuild_count() != rebuilds {
                    result = result.and(report_rebuild(&mut state));
                }
                if let Err(e) = result {
                    error!(?e, "Error processing message");
                    if state.emit(ExplorerEvent::Error(format!("Error: {e:?}"))).is_err() {
                        break;
                    }
                }
            }

            Some(change) = changes.recv() => {
                if state.emit(ExplorerEvent::TreeChanged { node: change.node }).is_err() {
                    break;
                }
            }
        }
    }

    state.sync.dispose();
}

async fn process_message(state: &mut ActorState, message: ExplorerMessage) -> Result<()> {
    debug!(?message, "Processing explorer message");

    match message {
        ExplorerMessage::GetChildren { node } => {
            let items = state.sync.get_children(node).await;
            state.emit(ExplorerEvent::Children {
                node,
                items: items.map(|items| items.as_ref().clone()),
            })
        }
        ExplorerMessage::GetParent { node } => {
            let parent = state.sync.get_parent(node);
            state.emit(ExplorerEvent::Parent { node, parent })
        }
        ExplorerMessage::Search { path } => {
            let item = state.sync.search(&path).await;
            state.emit(ExplorerEvent::SearchResult { path, item })
        }
        ExplorerMessage::Refresh { node } => {
            if !state.sync.refresh(node) {
                bail!("Cannot refresh {node:?}: not in the tree");
            }
            Ok(())
        }
        ExplorerMessage::FileCreated { path } => {
            state.pump.sink().on_create(path);
            Ok(())
        }
        ExplorerMessage::FileChanged { path } => {
            state.pump.sink().on_change(path);
            Ok(())
        }
        ExplorerMessage::FileDeleted { path } => {
            state.pump.sink().on_delete(path);
            Ok(())
        }
        ExplorerMessage::GetCommands { node } => {
            let Some(item) = state.sync.item(node) else {
                bail!("Tree item {node} no longer exists");
            };
            let commands = state.commands.applicable(item);
            state.emit(ExplorerEvent::Commands { node, commands })
        }
        ExplorerMessage::GetPrompts { node, command } => {
            let Some(item) = state.sync.item(node) else {
                bail!("Tree item {node} no longer exists");
            };
            let prompts = state.commands.prompts(&command, item)?;
            state.emit(ExplorerEvent::Prompts {
                node,
                command,
                prompts,
            })
        }
        ExplorerMessage::RunCommand {
            node,
            command,
            answers,
        } => {
            let result = state
                .commands
                .execute(&mut state.sync, &state.context, node, &command, &answers)
                .await;
            let event = match result {
                Ok(outcome) => ExplorerEvent::CommandCompleted {
                    node,
                    command,
                    outcome,
                },
                Err(e) => ExplorerEvent::CommandFailed {
                    node,
                    command,
                    error: e.to_string(),
                },
            };
            state.emit(event)
        }
        ExplorerMessage::GetLoadFailures => {
            let failures = state.sync.load_failures().to_vec();
            state.emit(ExplorerEvent::LoadFailures(failures))
        }
        ExplorerMessage::GetSettings => {
            let settings = serde_json::to_value(state.settings.settings())
                .context("Failed to serialize settings")?;
            state.emit(ExplorerEvent::Settings(settings))
        }
        ExplorerMessage::SaveSettings { settings } => {
            let new_settings: Settings =
                serde_json::from_value(settings).context("Failed to deserialize settings")?;
            state.settings.save_settings(new_settings.clone())?;
            state.update_watcher(&new_settings);
            state.sync.update_settings(new_settings);
            state.bus.publish(SolutionEvent::ConfigurationChanged);
            Ok(())
        }
    }
}

/// Pushes what the last root rebuild found: load failures and, once per
/// folder, missing template folders.
fn report_rebuild(state: &mut ActorState) -> Result<()> {
    let failures = state.sync.load_failures();
    if !failures.is_empty() {
        state.emit(ExplorerEvent::LoadFailures(failures.to_vec()))?;
    }

    let folders: Vec<PathBuf> = state
        .sync
        .missing_template_folders()
        .into_iter()
        .filter(|folder| state.offered_templates.insert(folder.clone()))
        .collect();
    if !folders.is_empty() {
        state.emit(ExplorerEvent::TemplateFoldersMissing { folders })?;
    }
    Ok(())
}
