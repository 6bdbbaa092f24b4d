use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::task::JoinError;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::MutationError;
use crate::workspace::{is_valid_name, is_within, normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectItemKind {
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectItem {
    pub path: PathBuf,
    pub kind: ProjectItemKind,
}

/// One project referenced by a solution.
///
/// Items are enumerated from the project directory the way SDK-style
/// projects include them: everything below the project folder except the
/// ignored names and the project file itself. The list is loaded on first
/// use and from then on only changes through the mutation operations below,
/// each of which touches disk first and updates the list only once the disk
/// operation succeeded.
#[derive(Debug)]
pub struct ProjectFile {
    full_path: PathBuf,
    directory: PathBuf,
    ignored: Vec<String>,
    items: RwLock<Option<Vec<ProjectItem>>>,
}

impl ProjectFile {
    pub fn new(full_path: PathBuf, ignored: Vec<String>) -> Self {
        let full_path = normalize(&full_path);
        let directory = full_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            full_path,
            directory,
            ignored,
            items: RwLock::new(None),
        }
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn name(&self) -> String {
        self.full_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// All items of the project, loading them from disk on first call.
    pub async fn items(&self) -> Vec<ProjectItem> {
        if let Some(items) = self.read_items().as_ref() {
            return items.clone();
        }

        let directory = self.directory.clone();
        let full_path = self.full_path.clone();
        let ignored = self.ignored.clone();
        let scanned =
            tokio::task::spawn_blocking(move || scan_items(&directory, &full_path, &ignored)).await;
        self.store_scan(scanned)
    }

    /// Caches a finished scan. A scan that did not finish is not cached, so
    /// the next `items()` walks the directory again.
    fn store_scan(&self, scanned: Result<Vec<ProjectItem>, JoinError>) -> Vec<ProjectItem> {
        let loaded = match scanned {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(?e, "Failed to scan project {}", self.full_path.display());
                return Vec::new();
            }
        };
        debug!(
            "Loaded {} item(s) for project {}",
            loaded.len(),
            self.full_path.display()
        );

        let mut guard = self.write_items();
        guard.get_or_insert(loaded).clone()
    }

    /// Forgets the loaded item list; the next `items()` reads the directory
    /// again.
    pub fn reset(&self) {
        *self.write_items() = None;
    }

    /// Direct children of `dir` (the project directory or one of its
    /// folders): folders first, then files, each sorted case-insensitively.
    pub async fn items_in(&self, dir: &Path) -> Vec<ProjectItem> {
        let mut children: Vec<ProjectItem> = self
            .items()
            .await
            .into_iter()
            .filter(|item| item.path.parent() == Some(dir))
            .collect();
        children.sort_by(|a, b| {
            let folder_first = |item: &ProjectItem| item.kind != ProjectItemKind::Folder;
            folder_first(a).cmp(&folder_first(b)).then_with(|| {
                let name = |item: &ProjectItem| {
                    item.path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_lowercase())
                        .unwrap_or_default()
                };
                name(a).cmp(&name(b))
            })
        });
        children
    }

    pub async fn create_folder(&self, path: &Path) -> Result<PathBuf, MutationError> {
        let path = self.check_target(path)?;
        let name = file_name(&path);
        if !is_valid_name(&name) {
            return Err(MutationError::InvalidName(name));
        }
        if exists(&path).await {
            return Err(MutationError::AlreadyExists(path));
        }

        fs::create_dir(&path)
            .await
            .map_err(|e| MutationError::io(&path, e))?;

        self.update_items(|items| {
            items.push(ProjectItem {
                path: path.clone(),
                kind: ProjectItemKind::Folder,
            })
        });
        info!("Created folder: {}", path.display());
        Ok(path)
    }

    pub async fn delete_file(&self, path: &Path) -> Result<(), MutationError> {
        let path = self.check_target(path)?;
        let metadata = metadata(&path).await?;
        if !metadata.is_file() {
            return Err(MutationError::NotAFile(path));
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| MutationError::io(&path, e))?;

        self.update_items(|items| items.retain(|i| i.path != path));
        info!("Deleted file: {}", path.display());
        Ok(())
    }

    pub async fn delete_folder(&self, path: &Path) -> Result<(), MutationError> {
        let path = self.check_target(path)?;
        let metadata = metadata(&path).await?;
        if !metadata.is_dir() {
            return Err(MutationError::NotAFolder(path));
        }

        fs::remove_dir_all(&path)
            .await
            .map_err(|e| MutationError::io(&path, e))?;

        self.update_items(|items| items.retain(|i| !i.path.starts_with(&path)));
        info!("Deleted folder: {}", path.display());
        Ok(())
    }

    pub async fn rename_file(&self, old_path: &Path, new_name: &str) -> Result<PathBuf, MutationError> {
        let old_path = self.check_target(old_path)?;
        if !metadata(&old_path).await?.is_file() {
            return Err(MutationError::NotAFile(old_path));
        }
        let new_path = self.rename_on_disk(&old_path, new_name).await?;

        self.update_items(|items| {
            for item in items.iter_mut().filter(|i| i.path == old_path) {
                item.path = new_path.clone();
            }
        });
        info!("Renamed file: {} -> {}", old_path.display(), new_path.display());
        Ok(new_path)
    }

    pub async fn rename_folder(
        &self,
        old_path: &Path,
        new_name: &str,
    ) -> Result<PathBuf, MutationError> {
        let old_path = self.check_target(old_path)?;
        if !metadata(&old_path).await?.is_dir() {
            return Err(MutationError::NotAFolder(old_path));
        }
        let new_path = self.rename_on_disk(&old_path, new_name).await?;

        self.update_items(|items| {
            for item in items.iter_mut() {
                if let Ok(rest) = item.path.strip_prefix(&old_path) {
                    item.path = if rest.as_os_str().is_empty() {
                        new_path.clone()
                    } else {
                        new_path.join(rest)
                    };
                }
            }
        });
        info!("Renamed folder: {} -> {}", old_path.display(), new_path.display());
        Ok(new_path)
    }

    async fn rename_on_disk(&self, old_path: &Path, new_name: &str) -> Result<PathBuf, MutationError> {
        if !is_valid_name(new_name) {
            return Err(MutationError::InvalidName(new_name.to_string()));
        }
        let parent = old_path
            .parent()
            .ok_or_else(|| MutationError::NotFound(old_path.to_path_buf()))?;
        let new_path = parent.join(new_name);
        if new_path == old_path {
            return Ok(new_path);
        }
        // On case-insensitive filesystems a case-only rename finds the old
        // entry under the new name; only an entry spelled exactly like the
        // new name is a collision then.
        let case_only = file_name(old_path).eq_ignore_ascii_case(new_name);
        let collides = if case_only {
            has_entry(parent, new_name).await?
        } else {
            exists(&new_path).await
        };
        if collides {
            return Err(MutationError::AlreadyExists(new_path));
        }

        fs::rename(old_path, &new_path)
            .await
            .map_err(|e| MutationError::io(old_path, e))?;
        Ok(new_path)
    }

    /// Normalizes `path` and requires it to lie strictly below the project
    /// directory.
    fn check_target(&self, path: &Path) -> Result<PathBuf, MutationError> {
        let path = normalize(path);
        if path == self.directory || !is_within(&path, &self.directory) {
            return Err(MutationError::OutsideProject {
                path,
                project_dir: self.directory.clone(),
            });
        }
        Ok(path)
    }

    fn update_items(&self, update: impl FnOnce(&mut Vec<ProjectItem>)) {
        if let Some(items) = self.write_items().as_mut() {
            update(items);
        }
    }

    fn read_items(&self) -> std::sync::RwLockReadGuard<'_, Option<Vec<ProjectItem>>> {
        self.items
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_items(&self) -> std::sync::RwLockWriteGuard<'_, Option<Vec<ProjectItem>>> {
        self.items
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

async fn has_entry(dir: &Path, name: &str) -> Result<bool, MutationError> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| MutationError::io(dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| MutationError::io(dir, e))?
    {
        if entry.file_name() == name {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

async fn metadata(path: &Path) -> Result<std::fs::Metadata, MutationError> {
    fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => MutationError::NotFound(path.to_path_buf()),
        _ => MutationError::io(path, e),
    })
}

fn scan_items(directory: &Path, project_file: &Path, ignored: &[String]) -> Vec<ProjectItem> {
    let is_ignored = |name: &str| ignored.iter().any(|i| i.eq_ignore_ascii_case(name));

    WalkDir::new(directory)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_ignored(&e.file_name().to_string_lossy()))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable project item: {e}");
                None
            }
        })
        .filter(|entry| entry.path() != project_file)
        .map(|entry| ProjectItem {
            kind: if entry.file_type().is_dir() {
                ProjectItemKind::Folder
            } else {
                ProjectItemKind::File
            },
            path: entry.into_path(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    struct TestProject {
        _temp: TempDir,
        root: PathBuf,
        project: ProjectFile,
    }

    fn project() -> TestProject {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let dir = root.join("App");
        std_fs::create_dir_all(dir.join("Models")).unwrap();
        std_fs::create_dir_all(dir.join("obj")).unwrap();
        std_fs::write(dir.join("App.csproj"), "<Project Sdk=\"Microsoft.NET.Sdk\" />").unwrap();
        std_fs::write(dir.join("Program.cs"), "").unwrap();
        std_fs::write(dir.join("Models").join("User.cs"), "").unwrap();
        std_fs::write(dir.join("obj").join("cache"), "").unwrap();

        let project = ProjectFile::new(
            dir.join("App.csproj"),
            vec!["bin".to_string(), "obj".to_string()],
        );
        TestProject {
            _temp: temp,
            root,
            project,
        }
    }

    fn paths(items: &[ProjectItem]) -> Vec<PathBuf> {
        let mut paths: Vec<_> = items.iter().map(|i| i.path.clone()).collect();
        paths.sort();
        paths
    }

    #[tokio::test]
    async fn test_items_skip_ignored_and_project_file() {
        let t = project();
        let dir = t.project.directory().to_path_buf();

        let items = t.project.items().await;

        assert_eq!(
            paths(&items),
            vec![
                dir.join("Models"),
                dir.join("Models").join("User.cs"),
                dir.join("Program.cs"),
            ]
        );
    }

    #[tokio::test]
    async fn test_items_in_orders_folders_first() {
        let t = project();
        let dir = t.project.directory().to_path_buf();
        std_fs::write(dir.join("appsettings.json"), "").unwrap();

        let children = t.project.items_in(&dir).await;

        let names: Vec<_> = children
            .iter()
            .map(|i| i.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["Models", "appsettings.json", "Program.cs"]);
    }

    #[tokio::test]
    async fn test_create_folder() {
        let t = project();
        let target = t.project.directory().join("Services");

        let created = t.project.create_folder(&target).await.unwrap();

        assert!(created.is_dir());
        assert!(t.project.items().await.iter().any(|i| i.path == target
            && i.kind == ProjectItemKind::Folder));
    }

    #[tokio::test]
    async fn test_create_folder_collision() {
        let t = project();
        let target = t.project.directory().join("Models");

        let err = t.project.create_folder(&target).await.unwrap_err();

        assert!(matches!(err, MutationError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_create_folder_needs_existing_parent() {
        let t = project();
        let target = t.project.directory().join("Data").join("Migrations");
        let before = t.project.items().await;

        let err = t.project.create_folder(&target).await.unwrap_err();

        assert!(matches!(err, MutationError::Io { .. }));
        assert!(!t.project.directory().join("Data").exists());
        assert_eq!(t.project.items().await, before);
    }

    #[tokio::test]
    async fn test_unfinished_scan_is_not_cached() {
        let t = project();
        let panicked = tokio::task::spawn_blocking(|| -> Vec<ProjectItem> { panic!("walk failed") })
            .await;

        assert!(t.project.store_scan(panicked).is_empty());
        assert!(t.project.read_items().is_none());
        assert_eq!(t.project.items().await.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_folder_outside_project_fails() {
        let t = project();
        let outside = t.root.join("Other");
        std_fs::create_dir(&outside).unwrap();
        let before = t.project.items().await;

        let err = t.project.delete_folder(&outside).await.unwrap_err();

        assert!(matches!(err, MutationError::OutsideProject { .. }));
        assert!(outside.exists());
        assert_eq!(t.project.items().await, before);
    }

    #[tokio::test]
    async fn test_dot_dot_escape_is_outside() {
        let t = project();
        let sneaky = t.project.directory().join("..").join("App.sln");

        let err = t.project.delete_file(&sneaky).await.unwrap_err();

        assert!(matches!(err, MutationError::OutsideProject { .. }));
    }

    #[tokio::test]
    async fn test_delete_project_directory_itself_fails() {
        let t = project();
        let dir = t.project.directory().to_path_buf();

        let err = t.project.delete_folder(&dir).await.unwrap_err();

        assert!(matches!(err, MutationError::OutsideProject { .. }));
        assert!(dir.exists());
    }

    #[tokio::test]
    async fn test_delete_file_and_folder() {
        let t = project();
        let dir = t.project.directory().to_path_buf();
        t.project.items().await;

        t.project.delete_file(&dir.join("Program.cs")).await.unwrap();
        t.project.delete_folder(&dir.join("Models")).await.unwrap();

        assert!(!dir.join("Program.cs").exists());
        assert!(!dir.join("Models").exists());
        assert!(t.project.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_file_on_folder_fails() {
        let t = project();
        let dir = t.project.directory().to_path_buf();

        let err = t.project.delete_file(&dir.join("Models")).await.unwrap_err();

        assert!(matches!(err, MutationError::NotAFile(_)));
        assert!(dir.join("Models").exists());
    }

    #[tokio::test]
    async fn test_delete_missing_file() {
        let t = project();
        let missing = t.project.directory().join("Nope.cs");

        let err = t.project.delete_file(&missing).await.unwrap_err();

        assert!(matches!(err, MutationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_file() {
        let t = project();
        let dir = t.project.directory().to_path_buf();
        t.project.items().await;

        let renamed = t
            .project
            .rename_file(&dir.join("Program.cs"), "Main.cs")
            .await
            .unwrap();

        assert_eq!(renamed, dir.join("Main.cs"));
        assert!(renamed.exists());
        let items = paths(&t.project.items().await);
        assert!(items.contains(&dir.join("Main.cs")));
        assert!(!items.contains(&dir.join("Program.cs")));
    }

    #[tokio::test]
    async fn test_rename_file_collision_leaves_everything() {
        let t = project();
        let dir = t.project.directory().to_path_buf();
        std_fs::write(dir.join("Other.cs"), "").unwrap();
        let before = t.project.items().await;

        let err = t
            .project
            .rename_file(&dir.join("Program.cs"), "Other.cs")
            .await
            .unwrap_err();

        assert!(matches!(err, MutationError::AlreadyExists(_)));
        assert!(dir.join("Program.cs").exists());
        assert_eq!(t.project.items().await, before);
    }

    #[tokio::test]
    async fn test_case_only_rename_keeps_differently_cased_sibling() {
        let t = project();
        let dir = t.project.directory().to_path_buf();
        std_fs::write(dir.join("Program.cs"), "UPPER").unwrap();
        std_fs::write(dir.join("program.cs"), "lower").unwrap();
        if std_fs::read_to_string(dir.join("Program.cs")).unwrap() != "UPPER" {
            // case-insensitive filesystem, both names are one file
            return;
        }
        let before = t.project.items().await;

        let err = t
            .project
            .rename_file(&dir.join("Program.cs"), "program.cs")
            .await
            .unwrap_err();

        assert!(matches!(err, MutationError::AlreadyExists(_)));
        assert_eq!(std_fs::read_to_string(dir.join("Program.cs")).unwrap(), "UPPER");
        assert_eq!(std_fs::read_to_string(dir.join("program.cs")).unwrap(), "lower");
        assert_eq!(t.project.items().await, before);
    }

    #[tokio::test]
    async fn test_case_only_folder_rename_keeps_differently_cased_sibling() {
        let t = project();
        let dir = t.project.directory().to_path_buf();
        let _ = std_fs::create_dir(dir.join("models"));
        if !dir.join("Models").join("User.cs").exists() || dir.join("models").join("User.cs").exists() {
            return;
        }

        let err = t
            .project
            .rename_folder(&dir.join("Models"), "models")
            .await
            .unwrap_err();

        assert!(matches!(err, MutationError::AlreadyExists(_)));
        assert!(dir.join("Models").join("User.cs").exists());
    }

    #[tokio::test]
    async fn test_case_only_rename() {
        let t = project();
        let dir = t.project.directory().to_path_buf();

        let renamed = t
            .project
            .rename_file(&dir.join("Program.cs"), "PROGRAM.cs")
            .await
            .unwrap();

        assert_eq!(renamed, dir.join("PROGRAM.cs"));
        assert!(has_entry(&dir, "PROGRAM.cs").await.unwrap());
        assert!(!has_entry(&dir, "Program.cs").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_with_separator_is_invalid() {
        let t = project();
        let dir = t.project.directory().to_path_buf();

        let err = t
            .project
            .rename_file(&dir.join("Program.cs"), "../Escape.cs")
            .await
            .unwrap_err();

        assert!(matches!(err, MutationError::InvalidName(_)));
    }

    #[tokio::test]
    async fn test_rename_folder_moves_descendants() {
        let t = project();
        let dir = t.project.directory().to_path_buf();
        t.project.items().await;

        t.project
            .rename_folder(&dir.join("Models"), "Entities")
            .await
            .unwrap();

        let items = paths(&t.project.items().await);
        assert!(items.contains(&dir.join("Entities")));
        assert!(items.contains(&dir.join("Entities").join("User.cs")));
        assert!(!items.iter().any(|p| p.starts_with(dir.join("Models"))));
    }
}
