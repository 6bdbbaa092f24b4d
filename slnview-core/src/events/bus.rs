use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::types::{Event, EventType};

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

struct HandlerEntry {
    event_type: EventType,
    active: AtomicBool,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<u64, Arc<HandlerEntry>>>,
}

/// Typed publish/subscribe channel between the watcher, the finder and the
/// tree synchronizer.
///
/// Handlers run synchronously on the publishing task, in subscription order.
/// `publish` snapshots the handler list before delivering, so subscribing or
/// disposing from inside a handler is allowed.
#[derive(Clone, Default)]
pub struct EventAggregator {
    inner: Arc<BusInner>,
}

impl EventAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event_type: EventType, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(HandlerEntry {
            event_type,
            active: AtomicBool::new(true),
            handler: Box::new(handler),
        });
        self.lock_handlers().insert(id, entry.clone());

        Subscription {
            id,
            entry: Some(entry),
            bus: Arc::downgrade(&self.inner),
        }
    }

    pub fn publish(&self, event: impl Into<Event>) {
        let event = event.into();
        let event_type = event.event_type();

        let mut targets: Vec<(u64, Arc<HandlerEntry>)> = self
            .lock_handlers()
            .iter()
            .filter(|(_, entry)| entry.event_type == event_type)
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();
        targets.sort_by_key(|(id, _)| *id);

        for (_, entry) in targets {
            // A subscription disposed by an earlier handler of this same
            // publish must not be called.
            if entry.active.load(Ordering::Acquire) {
                (entry.handler)(&event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_handlers().len()
    }

    fn lock_handlers(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<HandlerEntry>>> {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle returned by [`EventAggregator::subscribe`]. Disposing or dropping it
/// stops delivery to the handler for every later `publish`; a delivery that
/// already started on another thread still runs to completion.
pub struct Subscription {
    id: u64,
    entry: Option<Arc<HandlerEntry>>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn dispose(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        entry.active.store(false, Ordering::Release);

        if let Some(bus) = self.bus.upgrade() {
            bus.handlers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&self.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.entry.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{FileEvent, FileEventKind, SolutionEvent};
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Event) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler_count = count.clone();
        (count, move |_: &Event| {
            handler_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_delivers_by_event_type() {
        let bus = EventAggregator::new();
        let (files, file_handler) = counter();
        let (solutions, solution_handler) = counter();
        let _file_sub = bus.subscribe(EventType::File, file_handler);
        let _solution_sub = bus.subscribe(EventType::Solution, solution_handler);

        bus.publish(FileEvent::new(FileEventKind::Create, "/ws/A.sln"));
        bus.publish(SolutionEvent::SolutionsChanged);
        bus.publish(FileEvent::new(FileEventKind::Delete, "/ws/A.sln"));

        assert_eq!(files.load(Ordering::SeqCst), 2);
        assert_eq!(solutions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_stops_delivery() {
        let bus = EventAggregator::new();
        let (count, handler) = counter();
        let mut sub = bus.subscribe(EventType::File, handler);

        bus.publish(FileEvent::new(FileEventKind::Modify, "/ws/a.txt"));
        sub.dispose();
        bus.publish(FileEvent::new(FileEventKind::Modify, "/ws/a.txt"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(sub.is_disposed());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_disposes() {
        let bus = EventAggregator::new();
        let (count, handler) = counter();
        {
            let _sub = bus.subscribe(EventType::Solution, handler);
            assert_eq!(bus.subscriber_count(), 1);
        }
        bus.publish(SolutionEvent::ConfigurationChanged);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_dispose_during_publish_skips_pending_handler() {
        let bus = EventAggregator::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let victim_slot = slot.clone();
        let _killer = bus.subscribe(EventType::File, move |_| {
            if let Some(mut sub) = victim_slot.lock().unwrap().take() {
                sub.dispose();
            }
        });

        let (count, handler) = counter();
        *slot.lock().unwrap() = Some(bus.subscribe(EventType::File, handler));

        bus.publish(FileEvent::new(FileEventKind::Create, "/ws/A.sln"));

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
