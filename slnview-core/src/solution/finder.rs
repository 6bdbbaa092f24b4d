use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::DiscoveryError;
use crate::settings::Settings;

pub const SOLUTION_EXTENSION: &str = "sln";

/// A solution file and the directory that should be treated as its root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionLocation {
    pub solution_path: PathBuf,
    pub root_path: PathBuf,
}

/// Locates solution files below the workspace roots.
///
/// Per root, the strategies enabled in `open_solutions` run in this order:
/// 1. the root itself
/// 2. each alternative solution folder (e.g. `src/`) directly below the root
/// 3. every folder below the root (off by default)
///
/// Results come back in root order, then alphabetical within a root, so the
/// tree's root ordering is stable across rebuilds. A file found by more than
/// one strategy is reported once.
#[derive(Debug, Clone)]
pub struct SolutionFinder {
    settings: Settings,
}

impl SolutionFinder {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub async fn find_solutions(&self, roots: &[PathBuf]) -> Vec<SolutionLocation> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        for root in roots {
            for location in self.find_in_root(root).await {
                if seen.insert(location.solution_path.clone()) {
                    found.push(location);
                }
            }
        }

        debug!("Found {} solution(s) in {} root(s)", found.len(), roots.len());
        found
    }

    async fn find_in_root(&self, root: &Path) -> Vec<SolutionLocation> {
        let open = &self.settings.open_solutions;
        let mut locations = Vec::new();

        if open.in_root_folder {
            locations.extend(
                solutions_in(root)
                    .await
                    .into_iter()
                    .map(|solution_path| SolutionLocation {
                        solution_path,
                        root_path: root.to_path_buf(),
                    }),
            );
        }

        if open.in_alt_folders {
            for alt in &self.settings.alt_solution_folders {
                let alt_root = root.join(alt);
                if !tokio::fs::metadata(&alt_root)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false)
                {
                    continue;
                }
                locations.extend(solutions_in(&alt_root).await.into_iter().map(
                    |solution_path| SolutionLocation {
                        solution_path,
                        root_path: alt_root.clone(),
                    },
                ));
            }
        }

        if open.in_folders_and_subfolders {
            let root = root.to_path_buf();
            let settings = self.settings.clone();
            match tokio::task::spawn_blocking(move || solutions_below(&root, &settings)).await {
                Ok(found) => locations.extend(found.into_iter().map(|solution_path| {
                    let root_path = solution_path
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    SolutionLocation {
                        solution_path,
                        root_path,
                    }
                })),
                Err(e) => warn!("Recursive solution search failed: {e}"),
            }
        }

        locations.sort_by_cached_key(|l| {
            (display_order(&l.solution_path), l.solution_path.clone())
        });
        locations
    }
}

/// Case-insensitive ordering key: the containing directory first, so a
/// folder's own solutions come before those of its sub-folders, then the
/// file name.
fn display_order(path: &Path) -> (Vec<String>, String) {
    let lower = |s: &std::ffi::OsStr| s.to_string_lossy().to_lowercase();
    let directory = path
        .parent()
        .map(|p| p.iter().map(lower).collect())
        .unwrap_or_default();
    let name = path.file_name().map(lower).unwrap_or_default();
    (directory, name)
}

fn is_solution_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SOLUTION_EXTENSION))
}

/// Solution files directly inside `dir`. An unreadable directory counts as
/// holding none.
async fn solutions_in(dir: &Path) -> Vec<PathBuf> {
    match read_solutions(dir).await {
        Ok(found) => found,
        Err(e) => {
            warn!("{e}");
            Vec::new()
        }
    }
}

async fn read_solutions(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let discovery_error = |source| DiscoveryError {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(discovery_error)?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(discovery_error)? {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file && is_solution_file(&path) {
            found.push(path);
        }
    }
    Ok(found)
}

/// Recursive search, skipping ignored and hidden directories.
fn solutions_below(root: &Path, settings: &Settings) -> Vec<PathBuf> {
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    let mut found = Vec::new();

    for entry in walker.filter_entry(|e| {
        if e.depth() == 0 || !e.file_type().is_dir() {
            return true;
        }
        let name = e.file_name().to_string_lossy();
        !name.starts_with('.') && !settings.is_ignored_name(&name)
    }) {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_solution_file(entry.path()) => {
                found.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable path during solution search: {e}"),
        }
    }

    found
}
