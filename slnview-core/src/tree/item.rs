use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::project::ProjectFile;
use crate::solution::{ProjectInSolution, Solution};

/// Arena handle of a tree node. Ids are never reused, so an id kept across
/// a rebuild simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum TreeItemKind {
    SolutionRoot,
    SolutionFolder,
    Project,
    ProjectFolder,
    ProjectFile,
    NoSolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collapsible {
    None,
    Collapsed,
    Expanded,
}

/// What a node was built from. Commands reach the solution or the project
/// through it; the node itself holds no data of its own.
#[derive(Debug, Clone, Default)]
pub enum ItemModel {
    #[default]
    None,
    /// Solution root (`folder_id` unset) or a solution folder.
    Solution {
        solution: Arc<Solution>,
        folder_id: Option<Uuid>,
    },
    /// A project node, or a folder/file inside a project.
    Project {
        solution: Arc<Solution>,
        project_id: Uuid,
        project: Arc<ProjectFile>,
    },
}

impl ItemModel {
    pub fn solution(&self) -> Option<&Arc<Solution>> {
        match self {
            ItemModel::None => None,
            ItemModel::Solution { solution, .. } | ItemModel::Project { solution, .. } => {
                Some(solution)
            }
        }
    }

    pub fn project(&self) -> Option<&Arc<ProjectFile>> {
        match self {
            ItemModel::Project { project, .. } => Some(project),
            _ => None,
        }
    }

    pub fn project_in_solution(&self) -> Option<&ProjectInSolution> {
        match self {
            ItemModel::Project {
                solution,
                project_id,
                ..
            } => solution.project(project_id),
            _ => None,
        }
    }

    pub fn folder_id(&self) -> Option<Uuid> {
        match self {
            ItemModel::Solution { folder_id, .. } => *folder_id,
            _ => None,
        }
    }
}

/// A node as handed out to consumers. Cloning it is cheap; `model` is
/// shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeItem {
    pub id: NodeId,
    pub label: String,
    pub path: PathBuf,
    pub kind: TreeItemKind,
    /// Menu key for the host shell, e.g. `project-file` or `project-c-sharp`
    pub context_value: String,
    pub collapsible: Collapsible,
    pub parent: Option<NodeId>,
    #[serde(skip)]
    pub model: ItemModel,
}

/// Node contents before an id is assigned.
#[derive(Debug, Clone)]
pub(crate) struct NewItem {
    pub label: String,
    pub path: PathBuf,
    pub kind: TreeItemKind,
    pub collapsible: Collapsible,
    pub model: ItemModel,
}

impl NewItem {
    pub fn solution_root(solution: Arc<Solution>) -> Self {
        Self {
            label: solution.name(),
            path: solution.full_path.clone(),
            kind: TreeItemKind::SolutionRoot,
            collapsible: Collapsible::Expanded,
            model: ItemModel::Solution {
                solution,
                folder_id: None,
            },
        }
    }

    pub fn no_solution(root_path: PathBuf) -> Self {
        Self {
            label: "No solution found".to_string(),
            path: root_path,
            kind: TreeItemKind::NoSolution,
            collapsible: Collapsible::None,
            model: ItemModel::None,
        }
    }

    pub(crate) fn into_item(self, id: NodeId, parent: Option<NodeId>) -> TreeItem {
        let context_value = match &self.model {
            ItemModel::Project { .. } if self.kind == TreeItemKind::Project => self
                .model
                .project_in_solution()
                .map(|p| format!("project-{}", p.project_type))
                .unwrap_or_else(|| self.kind.to_string()),
            _ => self.kind.to_string(),
        };

        TreeItem {
            id,
            label: self.label,
            path: self.path,
            kind: self.kind,
            context_value,
            collapsible: self.collapsible,
            parent,
            model: self.model,
        }
    }
}
