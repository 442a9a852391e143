//! Cancellable, resolvable completion handle for the single-threaded tick loop.
//!
//! A `Deferred` starts Pending and settles exactly once. Continuations are
//! plain callbacks invoked synchronously by whoever settles it (normally a
//! feature during `update`), in registration order. Registering a
//! continuation on an already-settled Deferred runs it immediately.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::HostError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeferredState {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

impl DeferredState {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Terminal result of a Deferred.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Outcome<T> {
    Resolved(T),
    Rejected(HostError),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn state(&self) -> DeferredState {
        match self {
            Self::Resolved(_) => DeferredState::Resolved,
            Self::Rejected(_) => DeferredState::Rejected,
            Self::Cancelled => DeferredState::Cancelled,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Resolved(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&HostError> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

type Continuation<T> = Box<dyn FnOnce(&Outcome<T>)>;

struct Inner<T> {
    outcome: Option<Outcome<T>>,
    continuations: Vec<Continuation<T>>,
}

/// Shared handle; clones observe and settle the same task.
pub struct Deferred<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Deferred")
            .field("outcome", &inner.outcome)
            .field("continuations", &inner.continuations.len())
            .finish()
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Deferred<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                outcome: None,
                continuations: Vec::new(),
            })),
        }
    }

    pub fn resolved(value: T) -> Self {
        let d = Self::new();
        d.resolve(value);
        d
    }

    pub fn rejected(error: HostError) -> Self {
        let d = Self::new();
        d.reject(error);
        d
    }

    pub fn state(&self) -> DeferredState {
        self.inner
            .borrow()
            .outcome
            .as_ref()
            .map_or(DeferredState::Pending, Outcome::state)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.inner.borrow().outcome.is_none()
    }

    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.inner.borrow().outcome.clone()
    }

    /// Pending → Resolved. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Outcome::Resolved(value))
    }

    /// Pending → Rejected. Returns false if already settled.
    pub fn reject(&self, error: HostError) -> bool {
        self.settle(Outcome::Rejected(error))
    }

    /// Pending → Cancelled. Later resolve/reject calls have no effect.
    pub fn cancel(&self) -> bool {
        self.settle(Outcome::Cancelled)
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        let continuations = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return false;
            }
            inner.outcome = Some(outcome.clone());
            std::mem::take(&mut inner.continuations)
        };
        for continuation in continuations {
            continuation(&outcome);
        }
        true
    }

    /// Run `f` once this Deferred settles (immediately if it already has).
    pub fn then<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&Outcome<T>) + 'static,
    {
        let settled = self.inner.borrow().outcome.clone();
        match settled {
            Some(outcome) => f(&outcome),
            None => self.inner.borrow_mut().continuations.push(Box::new(f)),
        }
        self
    }
}
