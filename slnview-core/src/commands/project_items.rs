use async_trait::async_trait;
use tracing::info;

use super::{
    confirmed, parent_scope, text_answer, Answer, Command, CommandContext, CommandOutcome, Prompt,
    RefreshScope,
};
use crate::error::{CommandError, MutationError};
use crate::project::ProjectFile;
use crate::tree::{TreeItem, TreeItemKind};
use crate::workspace::is_valid_name;

fn project_of<'a>(
    item: &'a TreeItem,
    command: &'static str,
) -> Result<&'a ProjectFile, CommandError> {
    item.model
        .project()
        .map(|project| project.as_ref())
        .ok_or(CommandError::NotApplicable {
            command,
            kind: item.kind,
        })
}

fn is_project_entry(item: &TreeItem) -> bool {
    matches!(
        item.kind,
        TreeItemKind::ProjectFile | TreeItemKind::ProjectFolder
    ) && item.model.project().is_some()
}

/// Creates a folder next to a file, inside a folder, or at the top of a
/// project.
pub struct CreateFolderCommand;

#[async_trait]
impl Command for CreateFolderCommand {
    fn name(&self) -> &'static str {
        "create_folder"
    }

    fn title(&self) -> &'static str {
        "New Folder"
    }

    fn applies_to(&self, item: &TreeItem) -> bool {
        item.model.project().is_some()
    }

    fn prompts(&self, _item: &TreeItem) -> Vec<Prompt> {
        vec![Prompt::Text {
            message: "Folder name".to_string(),
            default: None,
        }]
    }

    async fn run(
        &self,
        _ctx: &CommandContext,
        item: &TreeItem,
        answers: &[Answer],
    ) -> Result<CommandOutcome, CommandError> {
        let project = project_of(item, self.name())?;
        let name = text_answer(answers, 0)?;
        if !is_valid_name(name) {
            return Err(MutationError::InvalidName(name.to_string()).into());
        }

        let (parent_dir, refresh) = match item.kind {
            TreeItemKind::ProjectFolder => (item.path.as_path(), RefreshScope::Node(item.id)),
            TreeItemKind::Project => (project.directory(), RefreshScope::Node(item.id)),
            _ => (
                item.path.parent().unwrap_or(project.directory()),
                parent_scope(item),
            ),
        };

        let created = project.create_folder(&parent_dir.join(name)).await?;
        info!("Folder created: {}", created.display());
        Ok(CommandOutcome {
            message: format!("Folder created: {name}"),
            refresh,
        })
    }
}

pub struct DeleteCommand;

#[async_trait]
impl Command for DeleteCommand {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn title(&self) -> &'static str {
        "Delete"
    }

    fn applies_to(&self, item: &TreeItem) -> bool {
        is_project_entry(item)
    }

    fn prompts(&self, item: &TreeItem) -> Vec<Prompt> {
        vec![Prompt::Confirm {
            message: format!("Delete \"{}\"?", item.label),
        }]
    }

    async fn run(
        &self,
        _ctx: &CommandContext,
        item: &TreeItem,
        answers: &[Answer],
    ) -> Result<CommandOutcome, CommandError> {
        let project = project_of(item, self.name())?;
        confirmed(answers, 0)?;

        match item.kind {
            TreeItemKind::ProjectFolder => project.delete_folder(&item.path).await?,
            _ => project.delete_file(&item.path).await?,
        }

        Ok(CommandOutcome {
            message: format!("Deleted: {}", item.path.display()),
            refresh: parent_scope(item),
        })
    }
}

pub struct RenameCommand;

#[async_trait]
impl Command for RenameCommand {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn title(&self) -> &'static str {
        "Rename"
    }

    fn applies_to(&self, item: &TreeItem) -> bool {
        is_project_entry(item)
    }

    fn prompts(&self, item: &TreeItem) -> Vec<Prompt> {
        vec![Prompt::Text {
            message: "New name".to_string(),
            default: Some(item.label.clone()),
        }]
    }

    async fn run(
        &self,
        _ctx: &CommandContext,
        item: &TreeItem,
        answers: &[Answer],
    ) -> Result<CommandOutcome, CommandError> {
        let project = project_of(item, self.name())?;
        let new_name = text_answer(answers, 0)?;

        let renamed = match item.kind {
            TreeItemKind::ProjectFolder => project.rename_folder(&item.path, new_name).await?,
            _ => project.rename_file(&item.path, new_name).await?,
        };

        Ok(CommandOutcome {
            message: format!("Renamed: {} -> {}", item.path.display(), renamed.display()),
            refresh: parent_scope(item),
        })
    }
}
