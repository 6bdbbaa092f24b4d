use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::{uuid, Uuid};

/// Type guid used by solution folders.
pub const SOLUTION_FOLDER_TYPE: Uuid = uuid!("2150E333-8FDC-42A3-9474-1A3956D46DE8");

const CSHARP_TYPES: [Uuid; 2] = [
    uuid!("FAE04EC0-301F-11D3-BF4B-00C04F79EFBC"),
    uuid!("9A19103F-16F7-4668-BE54-9A1E7A4F7556"),
];
const VISUAL_BASIC_TYPES: [Uuid; 2] = [
    uuid!("F184B08F-C81C-45F6-A57F-5ABD9991F28F"),
    uuid!("778DAE3C-4631-46EA-AA77-85C1314464D9"),
];
const FSHARP_TYPES: [Uuid; 2] = [
    uuid!("F2A71F9B-5D33-465A-A702-920D77279786"),
    uuid!("6EC3EE1D-3C4E-46DD-8F32-0CC8E7565705"),
];
const CPP_TYPE: Uuid = uuid!("8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942");
const WEB_SITE_TYPE: Uuid = uuid!("E24C65DC-7377-472B-9ABA-BC803B73C61A");

/// Well-known project type guids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum ProjectType {
    CSharp,
    VisualBasic,
    FSharp,
    Cpp,
    WebSite,
    SolutionFolder,
    Unknown,
}

impl ProjectType {
    pub fn from_type_id(type_id: &Uuid) -> Self {
        if *type_id == SOLUTION_FOLDER_TYPE {
            ProjectType::SolutionFolder
        } else if CSHARP_TYPES.contains(type_id) {
            ProjectType::CSharp
        } else if VISUAL_BASIC_TYPES.contains(type_id) {
            ProjectType::VisualBasic
        } else if FSHARP_TYPES.contains(type_id) {
            ProjectType::FSharp
        } else if *type_id == CPP_TYPE {
            ProjectType::Cpp
        } else if *type_id == WEB_SITE_TYPE {
            ProjectType::WebSite
        } else {
            ProjectType::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInSolution {
    pub id: Uuid,
    pub name: String,
    /// As written in the solution file
    pub relative_path: String,
    /// Solution directory joined with `relative_path`, host separators
    pub full_path: PathBuf,
    pub project_type_id: Uuid,
    pub project_type: ProjectType,
    pub parent_folder_id: Option<Uuid>,
    /// Declaration order among all projects and folders of the solution
    pub position: usize,
}

/// Virtual grouping node that only exists inside the solution file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionFolder {
    pub id: Uuid,
    pub name: String,
    pub parent_folder_id: Option<Uuid>,
    pub position: usize,
    /// Entries of the folder's `SolutionItems` section
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseWarning {
    UnknownNestedGuid { line: usize, child: Uuid, parent: Uuid },
    ParentNotAFolder { line: usize, child: Uuid, parent: Uuid },
    NestingCycle { line: usize, child: Uuid, parent: Uuid },
    DuplicateGuid { line: usize, id: Uuid },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::UnknownNestedGuid {
                line,
                child,
                parent,
            } => write!(
                f,
                "line {line}: nesting {{{child}}} = {{{parent}}} references an undeclared guid"
            ),
            ParseWarning::ParentNotAFolder {
                line,
                child,
                parent,
            } => write!(
                f,
                "line {line}: {{{child}}} cannot be nested under {{{parent}}}, which is not a solution folder"
            ),
            ParseWarning::NestingCycle {
                line,
                child,
                parent,
            } => write!(
                f,
                "line {line}: nesting {{{child}}} under {{{parent}}} would create a cycle"
            ),
            ParseWarning::DuplicateGuid { line, id } => {
                write!(f, "line {line}: {{{id}}} is declared more than once")
            }
        }
    }
}

/// Parsed solution file. Never mutated after parsing; a change on disk
/// produces a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub full_path: PathBuf,
    pub format_version: String,
    pub visual_studio_version: Option<String>,
    pub minimum_visual_studio_version: Option<String>,
    pub projects: Vec<ProjectInSolution>,
    pub folders: Vec<SolutionFolder>,
    pub warnings: Vec<ParseWarning>,
}

/// A direct child of the solution root or of a solution folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionEntry<'a> {
    Folder(&'a SolutionFolder),
    Project(&'a ProjectInSolution),
}

impl SolutionEntry<'_> {
    pub fn position(&self) -> usize {
        match self {
            SolutionEntry::Folder(folder) => folder.position,
            SolutionEntry::Project(project) => project.position,
        }
    }
}

impl Solution {
    pub fn name(&self) -> String {
        self.full_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn directory(&self) -> &Path {
        self.full_path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn project(&self, id: &Uuid) -> Option<&ProjectInSolution> {
        self.projects.iter().find(|p| p.id == *id)
    }

    pub fn folder(&self, id: &Uuid) -> Option<&SolutionFolder> {
        self.folders.iter().find(|f| f.id == *id)
    }

    /// Folders and projects whose parent is `parent` (`None` for the
    /// solution root), in declaration order.
    pub fn children_of(&self, parent: Option<Uuid>) -> Vec<SolutionEntry<'_>> {
        let mut entries: Vec<SolutionEntry<'_>> = self
            .folders
            .iter()
            .filter(|f| f.parent_folder_id == parent)
            .map(SolutionEntry::Folder)
            .chain(
                self.projects
                    .iter()
                    .filter(|p| p.parent_folder_id == parent)
                    .map(SolutionEntry::Project),
            )
            .collect();
        entries.sort_by_key(|e| e.position());
        entries
    }

    /// Names of the folders from the root down to `folder_id`, inclusive.
    pub fn folder_chain(&self, folder_id: &Uuid) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.folder(folder_id);
        while let Some(folder) = current {
            chain.push(folder.name.as_str());
            // Cycles are rejected while parsing; the bound keeps a broken
            // hand-built model from looping forever.
            if chain.len() > self.folders.len() {
                break;
            }
            current = folder.parent_folder_id.and_then(|id| self.folder(&id));
        }
        chain.reverse();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_type_from_guid() {
        assert_eq!(
            ProjectType::from_type_id(&uuid!("FAE04EC0-301F-11D3-BF4B-00C04F79EFBC")),
            ProjectType::CSharp
        );
        assert_eq!(
            ProjectType::from_type_id(&uuid!("2150e333-8fdc-42a3-9474-1a3956d46de8")),
            ProjectType::SolutionFolder
        );
        assert_eq!(
            ProjectType::from_type_id(&Uuid::nil()),
            ProjectType::Unknown
        );
        assert_eq!(ProjectType::VisualBasic.to_string(), "visual-basic");
    }
}
