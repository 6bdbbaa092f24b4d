//! Project model: a project's item list and the only operations allowed to
//! change project files on disk.

pub mod model;

pub use model::{ProjectFile, ProjectItem, ProjectItemKind};
