//! Publish/subscribe messaging scoped to a single host.
//!
//! Every `HostEntity` owns one `EventBus`; features receive a clone of the
//! handle when they are installed. There is no process-wide bus.
//!
//! Emission is synchronous and runs over a snapshot of the listeners that were
//! registered when `emit` was called, so listeners may subscribe or
//! unsubscribe (themselves included) while an event is being delivered. A
//! listener that returns `Err` or panics is reported through
//! [`LISTENER_ERROR_EVENT`] and does not prevent the remaining listeners from
//! running.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use hashbrown::HashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::HostError;

/// Emitted when a listener fails; payload is `{event, emitter, error}`.
pub const LISTENER_ERROR_EVENT: &str = "bus.listener_error";

/// One delivered message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub name: String,
    /// Identity of whoever emitted the event (a feature name or host id).
    pub emitter: String,
    pub payload: JsonValue,
}

/// Returned by `subscribe`; pass back to `unsubscribe`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    event: String,
}

impl SubscriptionHandle {
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Delivery summary for one `emit` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub delivered: usize,
    pub failed: usize,
}

type ListenerFn = dyn FnMut(&BusEvent) -> Result<(), HostError>;
type SharedListener = Rc<RefCell<Box<ListenerFn>>>;

struct Listener {
    id: u64,
    emitter: Option<String>,
    callback: SharedListener,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: HashMap<String, Vec<Listener>>,
}

/// Cheap, cloneable handle to a host's event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let listeners: usize = inner.listeners.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("events", &inner.listeners.len())
            .field("listeners", &listeners)
            .finish()
    }
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to every emission of `event`, regardless of emitter.
    pub fn subscribe<F>(&self, event: &str, listener: F) -> SubscriptionHandle
    where
        F: FnMut(&BusEvent) -> Result<(), HostError> + 'static,
    {
        self.insert(event, None, Box::new(listener))
    }

    /// Listen to `event` only when emitted by `emitter`.
    pub fn subscribe_from<F>(&self, event: &str, emitter: &str, listener: F) -> SubscriptionHandle
    where
        F: FnMut(&BusEvent) -> Result<(), HostError> + 'static,
    {
        self.insert(event, Some(emitter.to_string()), Box::new(listener))
    }

    fn insert(
        &self,
        event: &str,
        emitter: Option<String>,
        callback: Box<ListenerFn>,
    ) -> SubscriptionHandle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id = inner.next_id.wrapping_add(1);
        inner
            .listeners
            .entry(event.to_string())
            .or_default()
            .push(Listener {
                id,
                emitter,
                callback: Rc::new(RefCell::new(callback)),
            });
        SubscriptionHandle {
            id,
            event: event.to_string(),
        }
    }

    /// Remove a subscription. Returns false when the handle was already removed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(list) = inner.listeners.get_mut(&handle.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != handle.id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.listeners.remove(&handle.event);
        }
        removed
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Deliver `payload` to the listeners of `event` in subscription order.
    pub fn emit(&self, emitter: &str, event: &str, payload: JsonValue) -> EmitReport {
        let snapshot: Vec<SharedListener> = {
            let inner = self.inner.borrow();
            match inner.listeners.get(event) {
                Some(list) => list
                    .iter()
                    .filter(|l| l.emitter.as_deref().map_or(true, |e| e == emitter))
                    .map(|l| Rc::clone(&l.callback))
                    .collect(),
                None => Vec::new(),
            }
        };

        let message = BusEvent {
            name: event.to_string(),
            emitter: emitter.to_string(),
            payload,
        };

        let mut report = EmitReport::default();
        let mut failures = Vec::new();
        for callback in snapshot {
            let result = match callback.try_borrow_mut() {
                Ok(mut guard) => {
                    match panic::catch_unwind(AssertUnwindSafe(|| {
                        let listener: &mut ListenerFn = &mut **guard;
                        listener(&message)
                    })) {
                        Ok(result) => result,
                        Err(payload) => Err(HostError::Listener {
                            reason: panic_reason(payload),
                        }),
                    }
                }
                Err(_) => Err(HostError::Listener {
                    reason: format!("listener for '{event}' re-entered while running"),
                }),
            };
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    failures.push(err);
                }
            }
        }

        for err in failures {
            warn!("listener for '{}' from '{}' failed: {}", event, emitter, err);
            if event != LISTENER_ERROR_EVENT {
                self.emit(
                    emitter,
                    LISTENER_ERROR_EVENT,
                    json!({ "event": event, "emitter": emitter, "error": err }),
                );
            }
        }

        if report.delivered + report.failed > 0 {
            debug!(
                "emit '{}' from '{}': delivered={} failed={}",
                event, emitter, report.delivered, report.failed
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn unsubscribe_twice_reports_false() {
        let bus = EventBus::new();
        let handle = bus.subscribe("a", |_| Ok(()));
        assert_eq!(bus.listener_count("a"), 1);
        assert!(bus.unsubscribe(&handle));
        assert!(!bus.unsubscribe(&handle));
        assert_eq!(bus.listener_count("a"), 0);
    }

    #[test]
    fn emitter_filter_skips_other_emitters() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bus.subscribe_from("speech.stop", "tts", move |_| {
            h.set(h.get() + 1);
            Ok(())
        });
        bus.emit("other", "speech.stop", JsonValue::Null);
        bus.emit("tts", "speech.stop", JsonValue::Null);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn panic_message_is_captured() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::<JsonValue>::new()));
        let s = Rc::clone(&seen);
        bus.subscribe(LISTENER_ERROR_EVENT, move |ev| {
            s.borrow_mut().push(ev.payload.clone());
            Ok(())
        });
        bus.subscribe("boom", |_| panic!("kaboom"));
        let report = bus.emit("test", "boom", JsonValue::Null);
        assert_eq!(report.failed, 1);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["event"], "boom");
        assert_eq!(seen[0]["error"]["Listener"]["reason"], "kaboom");
    }
}
