use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{EventAggregator, EventType, Subscription};
use crate::settings::{Settings, ShowMode};
use crate::solution::{parse_file, Solution, SolutionFinder, SOLUTION_EXTENSION};
use crate::workspace::WorkspaceRoots;

use super::{NewItem, NodeId, Tree, TreeItem};

/// Per-root folder the host shell keeps its item templates in.
pub const TEMPLATE_FOLDER: [&str; 2] = [".vscode", "solution-explorer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Unloaded,
    Loaded,
    Invalidated,
}

/// Sent whenever consumers should re-query: `node` unset means the whole
/// tree, otherwise only below that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeChange {
    pub node: Option<NodeId>,
}

/// A solution found during the last rebuild that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub solution_path: PathBuf,
    pub message: String,
}

/// What the synchronizer knows about one solution root.
#[derive(Debug, Clone)]
pub struct RootContext {
    pub root_path: PathBuf,
    pub solutions: Vec<Arc<Solution>>,
    pub template_folder: PathBuf,
    pub has_templates: bool,
}

impl RootContext {
    fn new(root_path: PathBuf) -> Self {
        let template_folder = TEMPLATE_FOLDER
            .iter()
            .fold(root_path.clone(), |path, part| path.join(part));
        Self {
            root_path,
            solutions: Vec::new(),
            template_folder,
            has_templates: false,
        }
    }
}

/// Owns the tree's root set and keeps it in step with the filesystem.
///
/// Bus handlers never touch the tree. They bump an invalidation epoch and
/// announce a [`TreeChange`]; the next `get_children(None)` compares the
/// epoch its roots were built at with the current one and rebuilds when they
/// differ. A rebuild records the epoch before it starts discovering, so an
/// event that lands while it runs leaves the result `Invalidated` and the
/// following query rebuilds once more.
pub struct TreeSynchronizer {
    workspace: WorkspaceRoots,
    settings: Settings,
    bus: EventAggregator,
    tree: Tree,
    roots: Option<Arc<Vec<TreeItem>>>,
    built_at: Option<u64>,
    epoch: Arc<AtomicU64>,
    registry: BTreeMap<PathBuf, RootContext>,
    failures: Vec<LoadFailure>,
    rebuilds: u64,
    subscriptions: Vec<Subscription>,
    changes: ChangeNotifier,
}

impl TreeSynchronizer {
    pub fn new(workspace: WorkspaceRoots, settings: Settings, bus: EventAggregator) -> Self {
        Self {
            workspace,
            tree: Tree::new(settings.netcore_ignore.clone()),
            settings,
            bus,
            roots: None,
            built_at: None,
            epoch: Arc::new(AtomicU64::new(0)),
            registry: BTreeMap::new(),
            failures: Vec::new(),
            rebuilds: 0,
            subscriptions: Vec::new(),
            changes: ChangeNotifier::default(),
        }
    }

    /// Receiver of [`TreeChange`] notifications. Can be taken once; changes
    /// made before it is taken are not queued.
    pub fn take_changes(&mut self) -> Option<mpsc::UnboundedReceiver<TreeChange>> {
        self.changes.subscribe()
    }

    /// Subscribes to file and solution events unless the explorer is hidden
    /// (`show_mode = none`). Calling it again while registered is a no-op.
    pub fn register(&mut self) {
        if self.settings.show_mode == ShowMode::None {
            debug!("Explorer hidden, not subscribing to events");
            return;
        }
        if !self.subscriptions.is_empty() {
            return;
        }

        let epoch = self.epoch.clone();
        let changes = self.changes.clone();
        let solution_subscription = self.bus.subscribe(EventType::Solution, move |event| {
            debug!("Solution event: {event:?}");
            invalidate(&epoch, &changes);
        });

        let epoch = self.epoch.clone();
        let changes = self.changes.clone();
        let workspace = self.workspace.clone();
        let file_subscription = self.bus.subscribe(EventType::File, move |event| {
            let Some(file_event) = event.as_file() else {
                return;
            };
            // Only solution files sitting directly in a workspace root.
            if workspace.is_direct_child(&file_event.path)
                && file_event.has_extension(SOLUTION_EXTENSION)
            {
                debug!(
                    "Solution file {:?}: {}",
                    file_event.kind,
                    file_event.path.display()
                );
                invalidate(&epoch, &changes);
            }
        });

        self.subscriptions = vec![solution_subscription, file_subscription];
    }

    /// Drops both bus subscriptions. A delivery already running on another
    /// thread may still finish; nothing published afterwards reaches them.
    pub fn dispose(&mut self) {
        for mut subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
    }

    pub fn is_registered(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn state(&self) -> SyncState {
        match self.built_at {
            None => SyncState::Unloaded,
            Some(built_at) if built_at == self.epoch.load(Ordering::Acquire) => {
                SyncState::Loaded
            }
            Some(_) => SyncState::Invalidated,
        }
    }

    /// Children of `node`, or the root set when `node` is `None`.
    ///
    /// The root set is rebuilt when the tree is not `Loaded`. For a node id
    /// that did not survive a rebuild the result is `None`; for `None` it is
    /// always `Some`.
    pub async fn get_children(&mut self, node: Option<NodeId>) -> Option<Arc<Vec<TreeItem>>> {
        match node {
            Some(id) => self.tree.children(id).await,
            None => Some(self.root_items().await),
        }
    }

    pub fn get_parent(&self, node: NodeId) -> Option<TreeItem> {
        self.tree.parent(node)
    }

    pub fn item(&self, node: NodeId) -> Option<&TreeItem> {
        self.tree.item(node)
    }

    /// Finds the node for `path`, loading the root set if needed.
    pub async fn search(&mut self, path: &Path) -> Option<TreeItem> {
        let roots = self.root_items().await;
        self.tree.search(&roots, path).await
    }

    /// `None` invalidates everything; `Some(node)` only forgets that node's
    /// descendants. Returns false for a node that is no longer in the tree.
    pub fn refresh(&mut self, node: Option<NodeId>) -> bool {
        match node {
            None => {
                invalidate(&self.epoch, &self.changes);
                true
            }
            Some(id) => {
                if !self.tree.clear_descendants(id) {
                    return false;
                }
                self.changes.notify(TreeChange { node: Some(id) });
                true
            }
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Applies new settings: re-registers according to `show_mode` and
    /// invalidates the tree, since discovery options may have changed.
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
        if self.settings.show_mode == ShowMode::None {
            self.dispose();
        } else {
            self.register();
        }
        invalidate(&self.epoch, &self.changes);
    }

    pub fn workspace(&self) -> &WorkspaceRoots {
        &self.workspace
    }

    pub fn root_contexts(&self) -> impl Iterator<Item = &RootContext> {
        self.registry.values()
    }

    pub fn root_context(&self, root_path: &Path) -> Option<&RootContext> {
        self.registry.get(root_path)
    }

    /// Number of root rebuilds so far. Callers compare it across a query to
    /// learn whether `load_failures` and the registry were just refreshed.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub fn load_failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    /// Template folders that do not exist yet, if the user wants to be
    /// asked about creating them.
    pub fn missing_template_folders(&self) -> Vec<PathBuf> {
        if !self.settings.create_template_folder_question {
            return Vec::new();
        }
        self.registry
            .values()
            .filter(|context| !context.has_templates)
            .map(|context| context.template_folder.clone())
            .collect()
    }

    async fn root_items(&mut self) -> Arc<Vec<TreeItem>> {
        if let (SyncState::Loaded, Some(roots)) = (self.state(), &self.roots) {
            return roots.clone();
        }
        self.rebuild().await
    }

    async fn rebuild(&mut self) -> Arc<Vec<TreeItem>> {
        let epoch = self.epoch.load(Ordering::Acquire);
        debug!("Rebuilding solution tree (epoch {epoch})");

        self.tree.clear(self.settings.netcore_ignore.clone());
        self.roots = None;
        self.failures.clear();
        self.rebuilds += 1;

        let finder = SolutionFinder::new(self.settings.clone());
        let locations = finder.find_solutions(self.workspace.roots()).await;

        let mut groups: Vec<(PathBuf, Vec<PathBuf>)> = Vec::new();
        for location in locations {
            match groups.iter_mut().find(|(root, _)| *root == location.root_path) {
                Some((_, solutions)) => solutions.push(location.solution_path),
                None => groups.push((location.root_path, vec![location.solution_path])),
            }
        }

        let mut previous = std::mem::take(&mut self.registry);
        let mut items = Vec::new();

        for (root_path, solution_paths) in groups {
            let mut parsed = Vec::new();
            for solution_path in solution_paths {
                match parse_file(&solution_path).await {
                    Ok(solution) => {
                        let solution = Arc::new(solution);
                        items.push(self.tree.insert_root(NewItem::solution_root(solution.clone())));
                        parsed.push(solution);
                    }
                    Err(e) => {
                        warn!("Skipping solution {}: {e}", solution_path.display());
                        self.failures.push(LoadFailure {
                            solution_path,
                            message: e.to_string(),
                        });
                    }
                }
            }

            if parsed.is_empty() {
                items.push(self.tree.insert_root(NewItem::no_solution(root_path)));
                continue;
            }

            let mut context = previous
                .remove(&root_path)
                .unwrap_or_else(|| RootContext::new(root_path.clone()));
            context.solutions = parsed;
            context.has_templates = tokio::fs::metadata(&context.template_folder)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            self.registry.insert(root_path, context);
        }

        info!(
            "Loaded {} solution root(s), {} failed",
            self.registry
                .values()
                .map(|context| context.solutions.len())
                .sum::<usize>(),
            self.failures.len()
        );

        let roots = Arc::new(items);
        self.roots = Some(roots.clone());
        self.built_at = Some(epoch);
        roots
    }
}

impl Drop for TreeSynchronizer {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Sender side of [`TreeSynchronizer::take_changes`]. Holds no channel
/// until a receiver is taken.
#[derive(Clone, Default)]
struct ChangeNotifier {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<TreeChange>>>>,
    taken: Arc<AtomicBool>,
}

impl ChangeNotifier {
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<TreeChange>> {
        if self.taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock() = Some(tx);
        Some(rx)
    }

    fn notify(&self, change: TreeChange) {
        let mut tx = self.lock();
        // A dropped receiver releases the channel for good
        if tx.as_ref().is_some_and(|tx| tx.send(change).is_err()) {
            *tx = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<TreeChange>>> {
        self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn invalidate(epoch: &AtomicU64, changes: &ChangeNotifier) {
    epoch.fetch_add(1, Ordering::AcqRel);
    changes.notify(TreeChange { node: None });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FileEvent, FileEventKind, SolutionEvent};
    use crate::tree::TreeItemKind;
    use std::fs;
    use std::future::Future;
    use std::task::Poll;

    const APP: &str = r#"
Microsoft Visual Studio Solution File, Format Version 12.00
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "App", "App\App.csproj", "{11111111-1111-1111-1111-111111111111}"
EndProject
"#;

    struct Workspace {
        _temp: tempfile::TempDir,
        ws: PathBuf,
        bus: EventAggregator,
        sync: TreeSynchronizer,
    }

    fn workspace(files: &[(&str, &str)]) -> Workspace {
        workspace_with(files, Settings::default())
    }

    fn workspace_with(files: &[(&str, &str)], settings: Settings) -> Workspace {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let temp = tempfile::tempdir().unwrap();
        let ws = temp.path().canonicalize().unwrap();
        for (path, content) in files {
            let path = ws.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let bus = EventAggregator::new();
        let mut sync = TreeSynchronizer::new(WorkspaceRoots::new(vec![ws.clone()]), settings, bus.clone());
        sync.register();
        Workspace {
            _temp: temp,
            ws,
            bus,
            sync,
        }
    }

    fn labels(items: &[TreeItem]) -> Vec<&str> {
        items.iter().map(|i| i.label.as_str()).collect()
    }

    #[tokio::test]
    async fn test_first_query_loads_alphabetically() {
        let mut w = workspace(&[("B.sln", APP), ("A.sln", APP)]);
        assert_eq!(w.sync.state(), SyncState::Unloaded);

        let roots = w.sync.get_children(None).await.unwrap();

        assert_eq!(labels(&roots), vec!["A", "B"]);
        assert_eq!(w.sync.state(), SyncState::Loaded);
        assert_eq!(w.sync.root_context(&w.ws).unwrap().solutions.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_query_returns_same_instance() {
        let mut w = workspace(&[("A.sln", APP)]);

        let first = w.sync.get_children(None).await.unwrap();
        let second = w.sync.get_children(None).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_no_solutions_is_empty() {
        let mut w = workspace(&[("readme.md", "")]);

        let roots = w.sync.get_children(None).await.unwrap();

        assert!(roots.is_empty());
        assert_eq!(w.sync.root_contexts().count(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_root_shows_no_solution() {
        let mut w = workspace(&[("Broken.sln", "not a solution")]);

        let roots = w.sync.get_children(None).await.unwrap();

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].kind, TreeItemKind::NoSolution);
        assert_eq!(roots[0].path, w.ws);
        assert_eq!(w.sync.load_failures().len(), 1);
        assert!(w.sync.root_context(&w.ws).is_none());
    }

    #[tokio::test]
    async fn test_one_bad_solution_does_not_hide_the_others() {
        let mut w = workspace(&[("A.sln", APP), ("Broken.sln", "garbage")]);

        let roots = w.sync.get_children(None).await.unwrap();

        assert_eq!(labels(&roots), vec!["A"]);
        assert_eq!(
            w.sync.load_failures()[0].solution_path,
            w.ws.join("Broken.sln")
        );
    }

    #[tokio::test]
    async fn test_unrelated_file_event_is_ignored() {
        let mut w = workspace(&[("A.sln", APP)]);
        let before = w.sync.get_children(None).await.unwrap();

        w.bus.publish(FileEvent::new(
            FileEventKind::Create,
            w.ws.join("other").join("Notes.txt"),
        ));
        w.bus.publish(FileEvent::new(
            FileEventKind::Create,
            w.ws.join("nested").join("C.sln"),
        ));

        assert_eq!(w.sync.state(), SyncState::Loaded);
        let after = w.sync.get_children(None).await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_root_solution_event_invalidates() {
        let mut w = workspace(&[("A.sln", APP)]);
        let mut changes = w.sync.take_changes().unwrap();
        let before = w.sync.get_children(None).await.unwrap();
        fs::write(w.ws.join("B.sln"), APP).unwrap();

        w.bus
            .publish(FileEvent::new(FileEventKind::Create, w.ws.join("B.sln")));

        assert_eq!(w.sync.state(), SyncState::Invalidated);
        assert_eq!(changes.try_recv().unwrap(), TreeChange { node: None });
        let after = w.sync.get_children(None).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(labels(&after), vec!["A", "B"]);
        assert_eq!(w.sync.state(), SyncState::Loaded);
    }

    #[tokio::test]
    async fn test_extension_match_is_case_insensitive() {
        let mut w = workspace(&[("A.sln", APP)]);
        w.sync.get_children(None).await;

        w.bus
            .publish(FileEvent::new(FileEventKind::Delete, w.ws.join("OLD.SLN")));

        assert_eq!(w.sync.state(), SyncState::Invalidated);
    }

    #[tokio::test]
    async fn test_solution_event_invalidates() {
        let mut w = workspace(&[("A.sln", APP)]);
        w.sync.get_children(None).await;

        w.bus.publish(SolutionEvent::ProjectChanged {
            path: w.ws.join("App").join("App.csproj"),
        });

        assert_eq!(w.sync.state(), SyncState::Invalidated);
    }

    #[tokio::test]
    async fn test_event_during_rebuild_leaves_tree_invalidated() {
        let mut w = workspace(&[("A.sln", APP)]);

        // First poll records the epoch and parks on directory I/O; bump the
        // epoch there, as a bus event would.
        let epoch = w.sync.epoch.clone();
        let mut rebuild = Box::pin(w.sync.rebuild());
        std::future::poll_fn(|cx| {
            assert!(rebuild.as_mut().poll(cx).is_pending());
            Poll::Ready(())
        })
        .await;
        epoch.fetch_add(1, Ordering::AcqRel);
        let roots = rebuild.await;

        assert_eq!(labels(&roots), vec!["A"]);
        assert_eq!(w.sync.state(), SyncState::Invalidated);
        let again = w.sync.get_children(None).await.unwrap();
        assert!(!Arc::ptr_eq(&roots, &again));
        assert_eq!(w.sync.state(), SyncState::Loaded);
    }

    #[tokio::test]
    async fn test_scoped_refresh_keeps_roots() {
        let mut w = workspace(&[("A.sln", APP), ("App/App.csproj", ""), ("App/Program.cs", "")]);
        let roots = w.sync.get_children(None).await.unwrap();
        let project = w.sync.get_children(Some(roots[0].id)).await.unwrap()[0].clone();
        let files = w.sync.get_children(Some(project.id)).await.unwrap();
        assert_eq!(labels(&files), vec!["Program.cs"]);
        fs::write(w.ws.join("App").join("Startup.cs"), "").unwrap();

        assert!(w.sync.refresh(Some(project.id)));

        assert_eq!(w.sync.state(), SyncState::Loaded);
        assert!(w.sync.get_parent(files[0].id).is_none());
        let files = w.sync.get_children(Some(project.id)).await.unwrap();
        assert_eq!(labels(&files), vec!["Program.cs", "Startup.cs"]);
        let same_roots = w.sync.get_children(None).await.unwrap();
        assert!(Arc::ptr_eq(&roots, &same_roots));
    }

    #[tokio::test]
    async fn test_stale_ids_resolve_to_nothing() {
        let mut w = workspace(&[("A.sln", APP)]);
        let roots = w.sync.get_children(None).await.unwrap();
        let project = w.sync.get_children(Some(roots[0].id)).await.unwrap()[0].clone();

        w.sync.refresh(None);
        w.sync.get_children(None).await;

        assert!(w.sync.get_parent(project.id).is_none());
        assert!(w.sync.get_children(Some(project.id)).await.is_none());
        assert!(!w.sync.refresh(Some(project.id)));
    }

    #[tokio::test]
    async fn test_show_mode_none_does_not_subscribe() {
        let settings = Settings {
            show_mode: ShowMode::None,
            ..Settings::default()
        };
        let mut w = workspace_with(&[("A.sln", APP)], settings);
        assert!(!w.sync.is_registered());
        assert_eq!(w.bus.subscriber_count(), 0);

        let roots = w.sync.get_children(None).await.unwrap();
        w.bus.publish(SolutionEvent::SolutionsChanged);

        assert_eq!(roots.len(), 1);
        assert_eq!(w.sync.state(), SyncState::Loaded);
    }

    #[tokio::test]
    async fn test_dispose_drops_subscriptions() {
        let mut w = workspace(&[("A.sln", APP)]);
        assert_eq!(w.bus.subscriber_count(), 2);
        w.sync.get_children(None).await;

        w.sync.dispose();
        w.bus.publish(SolutionEvent::SolutionsChanged);

        assert_eq!(w.bus.subscriber_count(), 0);
        assert_eq!(w.sync.state(), SyncState::Loaded);
    }

    #[tokio::test]
    async fn test_changes_before_take_are_not_queued() {
        let mut w = workspace(&[("A.sln", APP)]);
        w.sync.get_children(None).await;
        w.bus.publish(SolutionEvent::SolutionsChanged);
        w.sync.refresh(None);

        let mut changes = w.sync.take_changes().unwrap();
        assert!(changes.try_recv().is_err());
        assert!(w.sync.take_changes().is_none());

        w.sync.refresh(None);
        assert_eq!(changes.try_recv().unwrap(), TreeChange { node: None });
    }

    #[tokio::test]
    async fn test_rebuild_count_tracks_root_rebuilds() {
        let mut w = workspace(&[("A.sln", APP)]);
        assert_eq!(w.sync.rebuild_count(), 0);

        w.sync.get_children(None).await;
        w.sync.get_children(None).await;
        assert_eq!(w.sync.rebuild_count(), 1);

        w.sync.refresh(None);
        w.sync.search(&w.ws.join("A.sln")).await;
        assert_eq!(w.sync.rebuild_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_template_folders() {
        let mut w = workspace(&[("A.sln", APP)]);
        w.sync.get_children(None).await;

        let expected = w.ws.join(".vscode").join("solution-explorer");
        assert_eq!(w.sync.missing_template_folders(), vec![expected.clone()]);

        fs::create_dir_all(&expected).unwrap();
        w.sync.refresh(None);
        w.sync.get_children(None).await;
        assert!(w.sync.missing_template_folders().is_empty());
        assert!(w.sync.root_context(&w.ws).unwrap().has_templates);
    }

    #[tokio::test]
    async fn test_search_loads_tree() {
        let mut w = workspace(&[("A.sln", APP), ("App/App.csproj", ""), ("App/Program.cs", "")]);

        let found = w
            .sync
            .search(&w.ws.join("App").join("Program.cs"))
            .await
            .unwrap();

        assert_eq!(found.kind, TreeItemKind::ProjectFile);
        assert!(w.sync.search(&w.ws.join("other").join("x.cs")).await.is_none());
    }
}
