//! Explorer commands.
//!
//! A command decides whether it applies to a tree item, declares the prompts
//! the host shell must ask before running it, and performs its change
//! through the project model or the solution file. The registry applies the
//! refresh a successful command asks for; a failed command refreshes
//! nothing.

pub mod project_items;
pub mod registry;
pub mod rename_solution_item;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::events::EventAggregator;
use crate::tree::{NodeId, TreeItem};

pub use project_items::{CreateFolderCommand, DeleteCommand, RenameCommand};
pub use registry::CommandRegistry;
pub use rename_solution_item::RenameSolutionItemCommand;

/// Input the host shell collects before running a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prompt {
    Text {
        message: String,
        default: Option<String>,
    },
    Confirm {
        message: String,
    },
}

/// One answer per prompt, in prompt order. Serialized as a bare JSON string
/// or boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Confirm(bool),
    Text(String),
}

/// Which part of the tree a successful command made stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshScope {
    Node(NodeId),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub message: String,
    pub refresh: RefreshScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub name: String,
    pub title: String,
}

#[derive(Clone)]
pub struct CommandContext {
    pub bus: EventAggregator,
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    fn title(&self) -> &'static str;
    fn applies_to(&self, item: &TreeItem) -> bool;
    fn prompts(&self, item: &TreeItem) -> Vec<Prompt>;

    async fn run(
        &self,
        ctx: &CommandContext,
        item: &TreeItem,
        answers: &[Answer],
    ) -> Result<CommandOutcome, CommandError>;
}

pub(crate) fn text_answer(answers: &[Answer], index: usize) -> Result<&str, CommandError> {
    match answers.get(index) {
        Some(Answer::Text(text)) if !text.trim().is_empty() => Ok(text.trim()),
        _ => Err(CommandError::MissingAnswer(index)),
    }
}

pub(crate) fn confirmed(answers: &[Answer], index: usize) -> Result<(), CommandError> {
    match answers.get(index) {
        Some(Answer::Confirm(true)) => Ok(()),
        Some(Answer::Confirm(false)) => Err(CommandError::Cancelled),
        _ => Err(CommandError::MissingAnswer(index)),
    }
}

/// Refresh target for a change among the siblings of `item`.
pub(crate) fn parent_scope(item: &TreeItem) -> RefreshScope {
    RefreshScope::Node(item.parent.unwrap_or(item.id))
}
