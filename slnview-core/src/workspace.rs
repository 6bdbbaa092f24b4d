use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

/// The set of directories the explorer indexes. Roots keep the order they
/// were given in since tree root ordering follows it.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceRoots {
    roots: Vec<PathBuf>,
}

impl WorkspaceRoots {
    /// Non-existent directories are skipped with a warning (editors can keep
    /// folder references around after the folder was deleted on disk).
    pub fn new(workspace_roots: Vec<PathBuf>) -> Self {
        let mut roots: Vec<PathBuf> = Vec::new();
        for workspace_root in workspace_roots {
            if !workspace_root.is_dir() {
                tracing::warn!(
                    "Workspace root does not exist, skipping: {}",
                    workspace_root.display()
                );
                continue;
            }

            let workspace_root = workspace_root
                .canonicalize()
                .unwrap_or_else(|_| normalize(&workspace_root));
            if !roots.contains(&workspace_root) {
                roots.push(workspace_root);
            }
        }
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// True when `path` sits directly inside one of the roots (not nested
    /// deeper).
    pub fn is_direct_child(&self, path: &Path) -> bool {
        let path = normalize(path);
        let Some(parent) = path.parent() else {
            return false;
        };
        self.roots.iter().any(|root| root == parent)
    }
}

/// Lexically normalizes a path: drops `.` components and resolves `..`
/// against the preceding component. Does not touch the filesystem so it
/// works for paths that do not exist (yet).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Converts a path written with either separator into the host convention
/// and normalizes it.
pub fn to_host_path(raw: &str) -> PathBuf {
    let converted: String = raw
        .chars()
        .map(|c| if c == '\\' || c == '/' { MAIN_SEPARATOR } else { c })
        .collect();
    normalize(Path::new(&converted))
}

/// True when `path` is `dir` or lies beneath it, after normalization.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    normalize(path).starts_with(normalize(dir))
}

/// A valid new name is a single, non-empty path component.
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && trimmed == name
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
