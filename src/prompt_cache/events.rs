//! Event bus seam used for tier-2 invalidation.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const BUILDING_COMPLETE: &str = "building:complete";
pub const BUILDING_DESTROYED: &str = "building:destroyed";

pub type EventHandler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Handle returned by [`EventBus::on`]. Calling [`unsubscribe`](Self::unsubscribe)
/// detaches the handler; dropping the handle leaves it attached.
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// A handle that does nothing, for buses without removal.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn unsubscribe(self) {
        (self.0)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

pub trait EventBus: Send + Sync {
    fn on(&self, event: &str, handler: EventHandler) -> Unsubscribe;
}

type HandlerMap = HashMap<String, Vec<(u64, EventHandler)>>;

/// Synchronous in-process bus.
#[derive(Clone, Default)]
pub struct LocalEventBus {
    handlers: Arc<Mutex<HandlerMap>>,
    next_id: Arc<AtomicU64>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls every handler registered for `event`, returning how many ran.
    pub fn emit(&self, event: &str, payload: &serde_json::Value) -> usize {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .map_or(0, Vec::len)
    }
}

impl EventBus for LocalEventBus {
    fn on(&self, event: &str, handler: EventHandler) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event.to_string())
            .or_default()
            .push((id, handler));

        let handlers = Arc::clone(&self.handlers);
        let event = event.to_string();
        Unsubscribe::new(move || {
            let mut map = handlers.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(list) = map.get_mut(&event) {
                list.retain(|(handler_id, _)| *handler_id != id);
                if list.is_empty() {
                    map.remove(&event);
                }
            }
        })
    }
}

impl fmt::Debug for LocalEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("LocalEventBus")
            .field("events", &map.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_and_unsubscribe() {
        let bus = LocalEventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let handle = bus.on(
            BUILDING_COMPLETE,
            Arc::new(move |_: &serde_json::Value| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(bus.emit(BUILDING_COMPLETE, &serde_json::Value::Null), 1);
        assert_eq!(bus.emit(BUILDING_DESTROYED, &serde_json::Value::Null), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        handle.unsubscribe();
        assert_eq!(bus.handler_count(BUILDING_COMPLETE), 0);
        assert_eq!(bus.emit(BUILDING_COMPLETE, &serde_json::Value::Null), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_only_removes_own_handler() {
        let bus = LocalEventBus::new();
        let first = bus.on(BUILDING_COMPLETE, Arc::new(|_: &serde_json::Value| {}));
        let _second = bus.on(BUILDING_COMPLETE, Arc::new(|_: &serde_json::Value| {}));

        first.unsubscribe();
        assert_eq!(bus.handler_count(BUILDING_COMPLETE), 1);
    }
}
