pub mod bus;
pub mod types;

pub use bus::{EventAggregator, Subscription};
pub use types::{Event, EventType, FileEvent, FileEventKind, SolutionEvent};
