//! Tree item hierarchy.
//!
//! Nodes live in an arena keyed by [`NodeId`]. Children are materialized on
//! first request and memoized as one `Arc<Vec<TreeItem>>` per node, so
//! asking twice hands out the same allocation until the node is cleared.
//! Clearing a node removes every descendant from the arena, which is also
//! what cuts their parent back-references.

pub mod item;
pub mod sync;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::project::{ProjectFile, ProjectItemKind};
use crate::solution::{Solution, SolutionEntry};
use crate::workspace::{is_within, normalize};

pub use item::{Collapsible, ItemModel, NodeId, TreeItem, TreeItemKind};
pub(crate) use item::NewItem;
pub use sync::{LoadFailure, RootContext, SyncState, TreeChange, TreeSynchronizer};

struct Node {
    item: TreeItem,
    /// `None` until computed; `Some(empty)` is a computed leaf.
    children: Option<Arc<Vec<TreeItem>>>,
}

pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
    ignored: Vec<String>,
    /// Project models shared by every node of the same project
    projects: HashMap<PathBuf, Arc<ProjectFile>>,
}

impl Tree {
    pub fn new(ignored: Vec<String>) -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            ignored,
            projects: HashMap::new(),
        }
    }

    /// Drops every node. Ids handed out so far stay dead.
    pub fn clear(&mut self, ignored: Vec<String>) {
        self.nodes.clear();
        self.projects.clear();
        self.ignored = ignored;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn item(&self, id: NodeId) -> Option<&TreeItem> {
        self.nodes.get(&id).map(|node| &node.item)
    }

    pub(crate) fn insert_root(&mut self, new_item: NewItem) -> TreeItem {
        self.insert(None, new_item)
    }

    fn insert(&mut self, parent: Option<NodeId>, new_item: NewItem) -> TreeItem {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let item = new_item.into_item(id, parent);
        self.nodes.insert(
            id,
            Node {
                item: item.clone(),
                children: None,
            },
        );
        item
    }

    pub fn parent(&self, id: NodeId) -> Option<TreeItem> {
        let parent = self.item(id)?.parent?;
        self.item(parent).cloned()
    }

    /// Children of `id`, computed on first call. `None` when `id` is not
    /// (or no longer) part of the tree.
    pub async fn children(&mut self, id: NodeId) -> Option<Arc<Vec<TreeItem>>> {
        let node = self.nodes.get(&id)?;
        if let Some(children) = &node.children {
            return Some(children.clone());
        }

        let item = node.item.clone();
        let mut children = Vec::new();
        for new_item in self.expand(&item).await {
            children.push(self.insert(Some(id), new_item));
        }
        let children = Arc::new(children);

        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = Some(children.clone());
        }
        Some(children)
    }

    /// Forgets the children of `id` (and everything below them). Project
    /// nodes also forget their loaded item lists so the next expansion sees
    /// the current directory contents.
    pub fn clear_descendants(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };

        if matches!(
            node.item.kind,
            TreeItemKind::Project | TreeItemKind::ProjectFolder
        ) {
            if let Some(project) = node.item.model.project() {
                project.reset();
            }
        }

        if let Some(children) = node.children.take() {
            for child in children.iter() {
                self.remove_subtree(child.id);
            }
        }
        true
    }

    fn remove_subtree(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children.iter().flat_map(|c| c.iter()) {
                self.remove_subtree(child.id);
            }
        }
    }

    /// Depth-first search for the node whose path equals `path`, starting
    /// from `roots`. Expands children on the way down, but only into
    /// projects and project folders that contain `path`.
    pub async fn search(&mut self, roots: &[TreeItem], path: &Path) -> Option<TreeItem> {
        let path = normalize(path);
        let mut stack: Vec<TreeItem> = roots.iter().rev().cloned().collect();

        while let Some(item) = stack.pop() {
            if item.path == path {
                return Some(item);
            }
            if !should_descend(&item, &path) {
                continue;
            }
            if let Some(children) = self.children(item.id).await {
                stack.extend(children.iter().rev().cloned());
            }
        }

        None
    }

    async fn expand(&mut self, item: &TreeItem) -> Vec<NewItem> {
        match (&item.model, item.kind) {
            (ItemModel::Solution { solution, folder_id }, _) => {
                let solution = solution.clone();
                let mut items = Vec::new();
                for entry in solution.children_of(*folder_id) {
                    items.push(self.solution_entry(&solution, entry));
                }
                items
            }
            (ItemModel::Project { project, .. }, TreeItemKind::Project) => {
                let dir = project.directory().to_path_buf();
                project_items(&item.model, project, &dir).await
            }
            (ItemModel::Project { project, .. }, TreeItemKind::ProjectFolder) => {
                project_items(&item.model, project, &item.path).await
            }
            _ => Vec::new(),
        }
    }

    fn solution_entry(&mut self, solution: &Arc<Solution>, entry: SolutionEntry<'_>) -> NewItem {
        match entry {
            SolutionEntry::Folder(folder) => {
                let mut path = solution.full_path.clone();
                for name in solution.folder_chain(&folder.id) {
                    path.push(name);
                }
                NewItem {
                    label: folder.name.clone(),
                    path,
                    kind: TreeItemKind::SolutionFolder,
                    collapsible: Collapsible::Collapsed,
                    model: ItemModel::Solution {
                        solution: solution.clone(),
                        folder_id: Some(folder.id),
                    },
                }
            }
            SolutionEntry::Project(project) => NewItem {
                label: project.name.clone(),
                path: project.full_path.clone(),
                kind: TreeItemKind::Project,
                collapsible: Collapsible::Collapsed,
                model: ItemModel::Project {
                    solution: solution.clone(),
                    project_id: project.id,
                    project: self.project_file(&project.full_path),
                },
            },
        }
    }

    fn project_file(&mut self, full_path: &Path) -> Arc<ProjectFile> {
        if let Some(project) = self.projects.get(full_path) {
            return project.clone();
        }
        debug!("Creating project model for {}", full_path.display());
        let project = Arc::new(ProjectFile::new(
            full_path.to_path_buf(),
            self.ignored.clone(),
        ));
        self.projects
            .insert(full_path.to_path_buf(), project.clone());
        project
    }
}

fn should_descend(item: &TreeItem, path: &Path) -> bool {
    match item.kind {
        TreeItemKind::SolutionRoot | TreeItemKind::SolutionFolder => true,
        TreeItemKind::Project => item
            .model
            .project()
            .is_some_and(|project| is_within(path, project.directory())),
        TreeItemKind::ProjectFolder => is_within(path, &item.path),
        TreeItemKind::ProjectFile | TreeItemKind::NoSolution => false,
    }
}

async fn project_items(model: &ItemModel, project: &ProjectFile, dir: &Path) -> Vec<NewItem> {
    project
        .items_in(dir)
        .await
        .into_iter()
        .map(|project_item| {
            let (kind, collapsible) = match project_item.kind {
                ProjectItemKind::Folder => (TreeItemKind::ProjectFolder, Collapsible::Collapsed),
                ProjectItemKind::File => (TreeItemKind::ProjectFile, Collapsible::None),
            };
            NewItem {
                label: project_item
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                path: project_item.path,
                kind,
                collapsible,
                model: model.clone(),
            }
        })
        .collect()
}
