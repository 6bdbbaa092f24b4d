use serde::{Deserialize, Serialize};

/// Where the host shell should show the solution tree. `None` disables the
/// explorer's event subscriptions altogether.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShowMode {
    #[default]
    ActivityBar,
    Explorer,
    None,
}

/// Which strategies the solution finder uses to locate `.sln` files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenSolutions {
    /// Look for solutions directly in each workspace root
    #[serde(default = "default_true")]
    pub in_root_folder: bool,

    /// Look for solutions directly in each alternative solution folder
    #[serde(default = "default_true")]
    pub in_alt_folders: bool,

    /// Search every folder below the workspace roots
    #[serde(default)]
    pub in_folders_and_subfolders: bool,
}

impl Default for OpenSolutions {
    fn default() -> Self {
        Self {
            in_root_folder: true,
            in_alt_folders: true,
            in_folders_and_subfolders: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub show_mode: ShowMode,

    /// Reveal the active editor's file in the tree
    #[serde(default)]
    pub track_active_item: bool,

    /// Sub-folders of a workspace root that are searched for solutions too
    #[serde(default = "default_alt_solution_folders")]
    pub alt_solution_folders: Vec<String>,

    /// File and folder names hidden from project item lists
    #[serde(default = "default_netcore_ignore")]
    pub netcore_ignore: Vec<String>,

    #[serde(default)]
    pub open_solutions: OpenSolutions,

    /// Ask before creating the per-root template folder
    #[serde(default = "default_true")]
    pub create_template_folder_question: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_mode: ShowMode::default(),
            track_active_item: false,
            alt_solution_folders: default_alt_solution_folders(),
            netcore_ignore: default_netcore_ignore(),
            open_solutions: OpenSolutions::default(),
            create_template_folder_question: true,
        }
    }
}

impl Settings {
    /// Case-insensitive match against `netcore_ignore`.
    pub fn is_ignored_name(&self, name: &str) -> bool {
        self.netcore_ignore
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(name))
    }
}

fn default_true() -> bool {
    true
}

fn default_alt_solution_folders() -> Vec<String> {
    vec!["src".to_string()]
}

fn default_netcore_ignore() -> Vec<String> {
    ["bin", "node_modules", "obj", ".ds_store"]
        .into_iter()
        .map(String::from)
        .collect()
}
