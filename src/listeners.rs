//! Callback registry shared by the sanity and inventory stores
//!
//! Callbacks run in registration order. A failing callback (an `Err` return or
//! a panic) is logged and counted; the rest of the fan-out still runs.
//! Emission walks a snapshot, so callbacks are free to subscribe, unsubscribe
//! or call back into the owning store.

use std::cell::RefCell;
use std::error::Error;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

/// Error returned by a listener callback
pub type ListenerError = Box<dyn Error>;

/// Result type every listener callback returns
pub type ListenerResult = Result<(), ListenerError>;

type Callback<T> = Rc<RefCell<dyn FnMut(&T) -> ListenerResult>>;

struct Registry<T: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Ordered list of callbacks receiving `&T`
pub struct Listeners<T: ?Sized> {
    registry: Rc<RefCell<Registry<T>>>,
}

impl<T: ?Sized + 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().entries.is_empty()
    }

    /// Register a callback
    pub fn add<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&T) -> ListenerResult + 'static,
    {
        let callback: Callback<T> = Rc::new(RefCell::new(callback));
        self.insert(callback).0
    }

    /// Register a callback and invoke it once with `payload`
    pub fn add_primed<F>(&self, label: &str, callback: F, payload: &T) -> Subscription
    where
        F: FnMut(&T) -> ListenerResult + 'static,
    {
        let callback: Callback<T> = Rc::new(RefCell::new(callback));
        let (subscription, id) = self.insert(Rc::clone(&callback));
        invoke(label, id, &callback, payload);
        subscription
    }

    /// Invoke every callback with `payload`
    ///
    /// Returns how many callbacks failed.
    pub fn emit(&self, label: &str, payload: &T) -> usize {
        let snapshot: Vec<(u64, Callback<T>)> = self
            .registry
            .borrow()
            .entries
            .iter()
            .map(|(id, cb)| (*id, Rc::clone(cb)))
            .collect();

        snapshot
            .iter()
            .filter(|(id, cb)| !invoke(label, *id, cb, payload))
            .count()
    }

    fn insert(&self, callback: Callback<T>) -> (Subscription, u64) {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, callback));
            id
        };

        let weak: Weak<RefCell<Registry<T>>> = Rc::downgrade(&self.registry);
        let subscription = Subscription {
            detach: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.borrow_mut().entries.retain(|(entry, _)| *entry != id);
                }
            })),
        };
        (subscription, id)
    }
}

/// Run one callback, returning `true` on success
fn invoke<T: ?Sized>(label: &str, id: u64, callback: &Callback<T>, payload: &T) -> bool {
    let Ok(mut callback) = callback.try_borrow_mut() else {
        log::warn!("{label}: listener #{id} re-entered during its own call, skipped");
        return false;
    };

    match catch_unwind(AssertUnwindSafe(|| (*callback)(payload))) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            log::warn!("{label}: listener #{id} failed: {err}");
            false
        }
        Err(_) => {
            log::warn!("{label}: listener #{id} panicked");
            false
        }
    }
}

/// Handle returned by every subscribe-style call
///
/// Dropping the handle leaves the callback registered; call
/// [`Subscription::unsubscribe`] to detach it.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// A handle that detaches nothing
    pub fn noop() -> Self {
        Self { detach: None }
    }

    /// Whether this handle refers to a registered callback
    pub fn is_noop(&self) -> bool {
        self.detach.is_none()
    }

    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}
