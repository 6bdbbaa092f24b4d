use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    Answer, Command, CommandContext, CommandInfo, CommandOutcome, CreateFolderCommand,
    DeleteCommand, Prompt, RefreshScope, RenameCommand, RenameSolutionItemCommand,
};
use crate::error::CommandError;
use crate::tree::{NodeId, TreeItem, TreeSynchronizer};

pub type SharedCommand = Arc<dyn Command>;

pub struct CommandRegistry {
    commands: BTreeMap<&'static str, SharedCommand>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(CreateFolderCommand),
            Arc::new(DeleteCommand),
            Arc::new(RenameCommand),
            Arc::new(RenameSolutionItemCommand),
        ])
    }
}

impl CommandRegistry {
    pub fn new(commands: Vec<SharedCommand>) -> Self {
        let mut registry = Self {
            commands: BTreeMap::new(),
        };
        for command in commands {
            registry.register(command);
        }
        registry
    }

    pub fn register(&mut self, command: SharedCommand) {
        debug!(command = command.name(), "Registering command");
        self.commands.insert(command.name(), command);
    }

    pub fn applicable(&self, item: &TreeItem) -> Vec<CommandInfo> {
        self.commands
            .values()
            .filter(|command| command.applies_to(item))
            .map(|command| CommandInfo {
                name: command.name().to_string(),
                title: command.title().to_string(),
            })
            .collect()
    }

    pub fn prompts(&self, name: &str, item: &TreeItem) -> Result<Vec<Prompt>, CommandError> {
        let command = self.applicable_command(name, item)?;
        Ok(command.prompts(item))
    }

    /// Runs `name` on the node and, on success, refreshes what the command
    /// reported as stale.
    pub async fn execute(
        &self,
        sync: &mut TreeSynchronizer,
        ctx: &CommandContext,
        node: NodeId,
        name: &str,
        answers: &[Answer],
    ) -> Result<CommandOutcome, CommandError> {
        let item = sync
            .item(node)
            .cloned()
            .ok_or(CommandError::StaleItem(node))?;
        let command = self.applicable_command(name, &item)?;

        let outcome = match command.run(ctx, &item, answers).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(command = name, "Command failed on {}: {e}", item.path.display());
                return Err(e);
            }
        };

        match outcome.refresh {
            RefreshScope::Node(id) => {
                sync.refresh(Some(id));
            }
            RefreshScope::All => {
                sync.refresh(None);
            }
        }
        info!(command = name, "{}", outcome.message);
        Ok(outcome)
    }

    fn applicable_command(&self, name: &str, item: &TreeItem) -> Result<&SharedCommand, CommandError> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        if !command.applies_to(item) {
            return Err(CommandError::NotApplicable {
                command: command.name(),
                kind: item.kind,
            });
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MutationError;
    use crate::events::EventAggregator;
    use crate::settings::Settings;
    use crate::tree::{SyncState, TreeItemKind};
    use crate::workspace::WorkspaceRoots;
    use std::fs;
    use std::path::PathBuf;

    const SOLUTION: &str = "\u{feff}
Microsoft Visual Studio Solution File, Format Version 12.00
Project(\"{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}\") = \"App\", \"App\\App.csproj\", \"{11111111-1111-1111-1111-111111111111}\"
EndProject
Project(\"{2150E333-8FDC-42A3-9474-1A3956D46DE8}\") = \"Docs\", \"Docs\", \"{22222222-2222-2222-2222-222222222222}\"
EndProject
";

    struct Harness {
        _temp: tempfile::TempDir,
        ws: PathBuf,
        sync: TreeSynchronizer,
        ctx: CommandContext,
        registry: CommandRegistry,
    }

    fn harness() -> Harness {
        let temp = tempfile::tempdir().unwrap();
        let ws = temp.path().canonicalize().unwrap();
        let app = ws.join("App");
        fs::create_dir_all(app.join("Models")).unwrap();
        fs::write(ws.join("A.sln"), SOLUTION).unwrap();
        fs::write(app.join("App.csproj"), "").unwrap();
        fs::write(app.join("Program.cs"), "").unwrap();

        let bus = EventAggregator::new();
        let mut sync = TreeSynchronizer::new(
            WorkspaceRoots::new(vec![ws.clone()]),
            Settings::default(),
            bus.clone(),
        );
        sync.register();
        Harness {
            _temp: temp,
            ws,
            sync,
            ctx: CommandContext { bus },
            registry: CommandRegistry::default(),
        }
    }

    async fn find(h: &mut Harness, relative: &str) -> TreeItem {
        let path = h.ws.join(relative);
        h.sync.search(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_applicable_commands_by_kind() {
        let mut h = harness();
        let file = find(&mut h, "App/Program.cs").await;
        let solution = find(&mut h, "A.sln").await;

        let names = |infos: Vec<CommandInfo>| -> Vec<String> {
            infos.into_iter().map(|i| i.name).collect()
        };
        assert_eq!(
            names(h.registry.applicable(&file)),
            vec!["create_folder", "delete", "rename"]
        );
        assert_eq!(
            names(h.registry.applicable(&solution)),
            vec!["rename_solution_item"]
        );
    }

    #[tokio::test]
    async fn test_create_folder_refreshes_project_node() {
        let mut h = harness();
        let project = find(&mut h, "App/App.csproj").await;
        let before = h.sync.get_children(Some(project.id)).await.unwrap();

        h.registry
            .execute(
                &mut h.sync,
                &h.ctx,
                project.id,
                "create_folder",
                &[Answer::Text("Services".to_string())],
            )
            .await
            .unwrap();

        assert!(h.ws.join("App").join("Services").is_dir());
        let after = h.sync.get_children(Some(project.id)).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        let labels: Vec<_> = after.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["Models", "Services", "Program.cs"]);
        assert_eq!(h.sync.state(), SyncState::Loaded);
    }

    #[tokio::test]
    async fn test_failed_command_refreshes_nothing() {
        let mut h = harness();
        let project = find(&mut h, "App/App.csproj").await;
        let before = h.sync.get_children(Some(project.id)).await.unwrap();

        let err = h
            .registry
            .execute(
                &mut h.sync,
                &h.ctx,
                project.id,
                "create_folder",
                &[Answer::Text("Models".to_string())],
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommandError::Mutation(MutationError::AlreadyExists(_))
        ));
        let after = h.sync.get_children(Some(project.id)).await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let mut h = harness();
        let file = find(&mut h, "App/Program.cs").await;

        let err = h
            .registry
            .execute(&mut h.sync, &h.ctx, file.id, "delete", &[Answer::Confirm(false)])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Cancelled));
        assert!(file.path.exists());

        h.registry
            .execute(&mut h.sync, &h.ctx, file.id, "delete", &[Answer::Confirm(true)])
            .await
            .unwrap();
        assert!(!file.path.exists());
        assert!(h.sync.item(file.id).is_none());
    }

    #[tokio::test]
    async fn test_rename_file() {
        let mut h = harness();
        let file = find(&mut h, "App/Program.cs").await;

        let outcome = h
            .registry
            .execute(
                &mut h.sync,
                &h.ctx,
                file.id,
                "rename",
                &[Answer::Text("Main.cs".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(outcome.refresh, RefreshScope::Node(file.parent.unwrap()));
        let renamed = find(&mut h, "App/Main.cs").await;
        assert_eq!(renamed.kind, TreeItemKind::ProjectFile);
    }

    #[tokio::test]
    async fn test_rename_solution_file() {
        let mut h = harness();
        let solution = find(&mut h, "A.sln").await;

        h.registry
            .execute(
                &mut h.sync,
                &h.ctx,
                solution.id,
                "rename_solution_item",
                &[Answer::Text("Renamed".to_string())],
            )
            .await
            .unwrap();

        assert!(h.ws.join("Renamed.sln").exists());
        assert_eq!(h.sync.state(), SyncState::Invalidated);
        let roots = h.sync.get_children(None).await.unwrap();
        assert_eq!(roots[0].label, "Renamed");
    }

    #[tokio::test]
    async fn test_rename_project_renames_file_and_declaration() {
        let mut h = harness();
        let project = find(&mut h, "App/App.csproj").await;

        h.registry
            .execute(
                &mut h.sync,
                &h.ctx,
                project.id,
                "rename_solution_item",
                &[Answer::Text("Web".to_string())],
            )
            .await
            .unwrap();

        let web = h.ws.join("App").join("Web.csproj");
        assert!(web.exists());
        let bytes = fs::read(h.ws.join("A.sln")).unwrap();
        assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("= \"Web\", \"App\\Web.csproj\""));

        let found = find(&mut h, "App/Web.csproj").await;
        assert_eq!(found.label, "Web");
    }

    #[tokio::test]
    async fn test_rename_solution_folder() {
        let mut h = harness();
        let folder = find(&mut h, "A.sln/Docs").await;

        h.registry
            .execute(
                &mut h.sync,
                &h.ctx,
                folder.id,
                "rename_solution_item",
                &[Answer::Text("Documentation".to_string())],
            )
            .await
            .unwrap();

        let roots = h.sync.get_children(None).await.unwrap();
        let children = h.sync.get_children(Some(roots[0].id)).await.unwrap();
        assert_eq!(children[1].label, "Documentation");
    }

    #[tokio::test]
    async fn test_unknown_and_stale() {
        let mut h = harness();
        let file = find(&mut h, "App/Program.cs").await;

        let err = h
            .registry
            .execute(&mut h.sync, &h.ctx, file.id, "add_package", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand(_)));

        h.sync.refresh(None);
        h.sync.get_children(None).await;
        let err = h
            .registry
            .execute(&mut h.sync, &h.ctx, file.id, "rename", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::StaleItem(_)));
    }
}
