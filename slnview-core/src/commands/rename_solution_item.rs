use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{info, warn};

use super::{text_answer, Answer, Command, CommandContext, CommandOutcome, Prompt, RefreshScope};
use crate::error::{CommandError, MutationError};
use crate::events::SolutionEvent;
use crate::solution::{decode, rename_declaration, Solution, SOLUTION_EXTENSION};
use crate::tree::{ItemModel, TreeItem, TreeItemKind};
use crate::workspace::is_valid_name;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Renames a solution file, or a project / solution folder as declared in
/// its solution. Renaming a project also renames its project file, keeping
/// the extension.
pub struct RenameSolutionItemCommand;

#[async_trait]
impl Command for RenameSolutionItemCommand {
    fn name(&self) -> &'static str {
        "rename_solution_item"
    }

    fn title(&self) -> &'static str {
        "Rename"
    }

    fn applies_to(&self, item: &TreeItem) -> bool {
        matches!(
            item.kind,
            TreeItemKind::SolutionRoot | TreeItemKind::SolutionFolder | TreeItemKind::Project
        ) && item.model.solution().is_some()
    }

    fn prompts(&self, item: &TreeItem) -> Vec<Prompt> {
        vec![Prompt::Text {
            message: "New name".to_string(),
            default: Some(item.label.clone()),
        }]
    }

    async fn run(
        &self,
        ctx: &CommandContext,
        item: &TreeItem,
        answers: &[Answer],
    ) -> Result<CommandOutcome, CommandError> {
        let new_name = text_answer(answers, 0)?;
        if !is_valid_name(new_name) || new_name.contains('"') {
            return Err(MutationError::InvalidName(new_name.to_string()).into());
        }

        let not_applicable = || CommandError::NotApplicable {
            command: "rename_solution_item",
            kind: item.kind,
        };
        let solution = item.model.solution().ok_or_else(not_applicable)?;

        let message = match (item.kind, &item.model) {
            (TreeItemKind::SolutionRoot, _) => {
                let renamed = rename_solution_file(&solution.full_path, new_name).await?;
                ctx.bus.publish(SolutionEvent::SolutionsChanged);
                format!("Solution renamed: {}", renamed.display())
            }
            (
                TreeItemKind::SolutionFolder,
                ItemModel::Solution {
                    folder_id: Some(id),
                    ..
                },
            ) => {
                write_declaration(solution, *id, new_name, None).await?;
                ctx.bus.publish(SolutionEvent::SolutionsChanged);
                format!("Solution folder renamed: {new_name}")
            }
            (TreeItemKind::Project, ItemModel::Project { project_id, .. }) => {
                let declared = solution
                    .project(project_id)
                    .ok_or(CommandError::NotInSolution(*project_id))?;
                let renamed = rename_project(solution, declared, new_name).await?;
                ctx.bus.publish(SolutionEvent::ProjectChanged { path: renamed });
                format!("Project renamed: {new_name}")
            }
            _ => return Err(not_applicable()),
        };

        info!("{message}");
        Ok(CommandOutcome {
            message,
            refresh: RefreshScope::All,
        })
    }
}

fn with_extension(name: &str, extension: &str) -> String {
    let suffix = format!(".{extension}");
    if extension.is_empty() || name.to_lowercase().ends_with(&suffix.to_lowercase()) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

async fn rename_solution_file(path: &Path, new_name: &str) -> Result<PathBuf, MutationError> {
    let file_name = with_extension(new_name, SOLUTION_EXTENSION);
    let target = path.with_file_name(&file_name);
    if target == path {
        return Ok(target);
    }
    if fs::symlink_metadata(&target).await.is_ok() {
        return Err(MutationError::AlreadyExists(target));
    }

    fs::rename(path, &target)
        .await
        .map_err(|e| MutationError::io(path, e))?;
    Ok(target)
}

/// Renames the project file on disk, then its declaration. The file rename is
/// undone when the solution cannot be rewritten.
async fn rename_project(
    solution: &Solution,
    declared: &crate::solution::ProjectInSolution,
    new_name: &str,
) -> Result<PathBuf, CommandError> {
    let old_path = &declared.full_path;
    let extension = old_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = with_extension(new_name, &extension);
    let new_path = old_path.with_file_name(&file_name);

    let moved = new_path != *old_path;
    if moved {
        if fs::symlink_metadata(&new_path).await.is_ok() {
            return Err(MutationError::AlreadyExists(new_path).into());
        }
        fs::rename(old_path, &new_path)
            .await
            .map_err(|e| MutationError::io(old_path, e))?;
    }

    let relative_path = match declared.relative_path.rfind(['\\', '/']) {
        Some(index) => format!("{}{file_name}", &declared.relative_path[..=index]),
        None => file_name.clone(),
    };

    if let Err(e) = write_declaration(solution, declared.id, new_name, Some(&relative_path)).await {
        if moved {
            if let Err(undo) = fs::rename(&new_path, old_path).await {
                warn!(
                    "Failed to restore {} after solution update failed: {undo}",
                    old_path.display()
                );
            }
        }
        return Err(e);
    }

    Ok(new_path)
}

async fn write_declaration(
    solution: &Solution,
    id: uuid::Uuid,
    new_name: &str,
    new_relative_path: Option<&str>,
) -> Result<(), CommandError> {
    let path = &solution.full_path;
    let bytes = fs::read(path)
        .await
        .map_err(|e| MutationError::io(path, e))?;
    let text = decode(&bytes)?;

    let rewritten = rename_declaration(&text, id, new_name, new_relative_path)?
        .ok_or(CommandError::NotInSolution(id))?;

    // UTF-16 input is written back as UTF-8; a UTF-8 BOM is kept.
    let mut out = Vec::with_capacity(rewritten.len() + UTF8_BOM.len());
    if bytes.starts_with(&UTF8_BOM) {
        out.extend_from_slice(&UTF8_BOM);
    }
    out.extend_from_slice(rewritten.as_bytes());

    fs::write(path, out)
        .await
        .map_err(|e| MutationError::io(path, e))?;
    Ok(())
}
