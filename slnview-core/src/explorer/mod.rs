pub mod actor;
pub mod events;

pub use actor::{ExplorerActor, ExplorerMessage};
pub use events::ExplorerEvent;
