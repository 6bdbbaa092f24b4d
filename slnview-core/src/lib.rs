pub mod commands;
pub mod error;
pub mod events;
pub mod explorer;
pub mod project;
pub mod settings;
pub mod solution;
pub mod tree;
pub mod watch;
pub mod workspace;

// Public library API. Front-ends only need the actor and its message types;
// the rest is public for embedding the synchronizer directly.
pub use commands::{Answer, Command, CommandRegistry, Prompt};
pub use error::{CommandError, DiscoveryError, MalformedSolutionError, MutationError};
pub use events::{EventAggregator, FileEvent, SolutionEvent};
pub use explorer::{ExplorerActor, ExplorerEvent, ExplorerMessage};
pub use settings::{Settings, SettingsManager};
pub use solution::{Solution, SolutionFinder};
pub use tree::{NodeId, TreeItem, TreeItemKind, TreeSynchronizer};
