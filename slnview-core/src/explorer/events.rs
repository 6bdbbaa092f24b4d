use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::commands::{CommandInfo, CommandOutcome, Prompt};
use crate::tree::{LoadFailure, NodeId, TreeItem};

/// `ExplorerEvent`s are the output of the explorer actor.
///
/// Every request produces at most one direct answer. `TreeChanged` is sent
/// on its own whenever the tree went stale (a watched solution file changed,
/// settings were saved, a command modified something), and front-ends react
/// by re-querying the node it names, or the roots when it names none.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum ExplorerEvent {
    Children {
        node: Option<NodeId>,
        /// `None` when `node` no longer exists
        items: Option<Vec<TreeItem>>,
    },
    Parent {
        node: NodeId,
        parent: Option<TreeItem>,
    },
    SearchResult {
        path: PathBuf,
        item: Option<TreeItem>,
    },
    TreeChanged {
        node: Option<NodeId>,
    },
    Commands {
        node: NodeId,
        commands: Vec<CommandInfo>,
    },
    Prompts {
        node: NodeId,
        command: String,
        prompts: Vec<Prompt>,
    },
    CommandCompleted {
        node: NodeId,
        command: String,
        outcome: CommandOutcome,
    },
    CommandFailed {
        node: NodeId,
        command: String,
        error: String,
    },
    LoadFailures(Vec<LoadFailure>),
    /// Solution roots without a template folder. Only sent once per folder
    /// and only when `create_template_folder_question` is enabled.
    TemplateFoldersMissing {
        folders: Vec<PathBuf>,
    },
    Settings(serde_json::Value),
    Error(String),
}
