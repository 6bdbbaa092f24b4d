use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    Create,
    Modify,
    Delete,
}

/// One filesystem notification. The watcher does not batch or deduplicate
/// these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
    pub timestamp: u64,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now().timestamp_millis() as u64,
        }
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension))
    }
}

/// Solution-level domain events. Every one of them makes the current tree
/// stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "data")]
pub enum SolutionEvent {
    SolutionsChanged,
    ConfigurationChanged,
    ProjectChanged { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    File,
    Solution,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    File(FileEvent),
    Solution(SolutionEvent),
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::File(_) => EventType::File,
            Event::Solution(_) => EventType::Solution,
        }
    }

    pub fn as_file(&self) -> Option<&FileEvent> {
        match self {
            Event::File(event) => Some(event),
            Event::Solution(_) => None,
        }
    }
}

impl From<FileEvent> for Event {
    fn from(event: FileEvent) -> Self {
        Event::File(event)
    }
}

impl From<SolutionEvent> for Event {
    fn from(event: SolutionEvent) -> Self {
        Event::Solution(event)
    }
}
