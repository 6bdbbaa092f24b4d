use std::path::PathBuf;

use thiserror::Error;

/// A workspace directory could not be searched for solutions.
#[derive(Error, Debug)]
#[error("Failed to search {path:?} for solutions: {source}")]
pub struct DiscoveryError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A solution file is missing one of its structural markers or contains an
/// unreadable declaration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedSolutionError {
    #[error("Missing solution file header")]
    MissingHeader,

    #[error("Line {line}: {message}")]
    InvalidLine { line: usize, message: String },

    #[error("Line {line}: '{marker}' is never closed")]
    Unterminated { line: usize, marker: &'static str },

    #[error("Failed to read solution file: {0}")]
    Unreadable(String),
}

/// Failure of a project file/folder operation. The disk and the project's
/// item list are untouched when one of these is returned.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("{path:?} is outside of project directory {project_dir:?}")]
    OutsideProject { path: PathBuf, project_dir: PathBuf },

    #[error("Not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Not a file: {0:?}")]
    NotAFile(PathBuf),

    #[error("Not a folder: {0:?}")]
    NotAFolder(PathBuf),

    #[error("Already exists: {0:?}")]
    AlreadyExists(PathBuf),

    #[error("Invalid name: '{0}'")]
    InvalidName(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MutationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of an explorer command. Nothing is refreshed when a command
/// returns one of these.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Tree item {0} no longer exists")]
    StaleItem(crate::tree::NodeId),

    #[error("Command '{command}' does not apply to {kind} items")]
    NotApplicable {
        command: &'static str,
        kind: crate::tree::TreeItemKind,
    },

    #[error("Missing answer for prompt {0}")]
    MissingAnswer(usize),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0} is not declared in its solution")]
    NotInSolution(uuid::Uuid),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Malformed(#[from] MalformedSolutionError),
}
