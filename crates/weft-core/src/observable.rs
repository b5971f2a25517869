#![forbid(unsafe_code)]

//! Change-notification primitives.
//!
//! - [`Listeners`]: an ordered list of callbacks with RAII removal.
//! - [`Subscription`]: guard that runs an unsubscribe action on drop.
//! - [`Observable`]: a shared, version-tracked value with change
//!   notification.
//!
//! # Architecture
//!
//! Everything here is single-threaded: `Rc<RefCell<..>>` for shared
//! ownership, callbacks stored as `Rc<dyn Fn>`. Notification clones the
//! callback list and releases every borrow before calling out, so a
//! callback may freely subscribe, unsubscribe or set the value it observes.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle. A callback removed while a cycle is in flight is
//!    skipped for the rest of that cycle.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard for a registered callback.
///
/// Dropping the guard (or calling [`Subscription::cancel`]) runs the
/// unsubscribe action exactly once.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Create a subscription that runs `cancel` when released.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Release now instead of on drop.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Listeners<T>
// ---------------------------------------------------------------------------

struct Entry<T: ?Sized> {
    id: u64,
    live: Rc<Cell<bool>>,
    callback: Rc<dyn Fn(&T)>,
}

struct ListenerState<T: ?Sized> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

/// Ordered callback list with RAII removal.
pub struct Listeners<T: ?Sized> {
    state: Rc<RefCell<ListenerState<T>>>,
}

impl<T: ?Sized + 'static> Listeners<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ListenerState {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register `callback`; it stays registered while the returned
    /// subscription lives.
    pub fn add(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.add_rc(Rc::new(callback))
    }

    /// Register an already shared callback.
    pub fn add_rc(&self, callback: Rc<dyn Fn(&T)>) -> Subscription {
        let live = Rc::new(Cell::new(true));
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(Entry {
                id,
                live: Rc::clone(&live),
                callback,
            });
            id
        };
        let weak: Weak<RefCell<ListenerState<T>>> = Rc::downgrade(&self.state);
        Subscription::new(move || {
            live.set(false);
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().entries.retain(|entry| entry.id != id);
            }
        })
    }

    /// Call every registered callback in registration order.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<(Rc<Cell<bool>>, Rc<dyn Fn(&T)>)> = self
            .state
            .borrow()
            .entries
            .iter()
            .map(|entry| (Rc::clone(&entry.live), Rc::clone(&entry.callback)))
            .collect();
        for (live, callback) in snapshot {
            if live.get() {
                callback(value);
            }
        }
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every callback. Outstanding subscriptions become no-ops.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut self.state.borrow_mut().entries);
        for entry in &entries {
            entry.live.set(false);
        }
    }
}

impl<T: ?Sized + 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.state.borrow().entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Observable<T>
// ---------------------------------------------------------------------------

struct ObservableInner<T> {
    value: T,
    version: u64,
}

/// A shared, version-tracked value with change notification.
///
/// Cloning an `Observable` yields another handle to the same value.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
    listeners: Listeners<T>,
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner { value, version: 0 })),
            listeners: Listeners::new(),
        }
    }

    /// Current value (cloned).
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value. Returns `true` when the value changed and
    /// subscribers were notified.
    pub fn set(&self, value: T) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return false;
            }
            inner.value = value.clone();
            inner.version += 1;
        }
        self.listeners.notify(&value);
        true
    }

    /// Subscribe to changes. The callback receives the new value.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.listeners.add(callback)
    }

    /// Number of mutations that changed the value.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            listeners: self.listeners.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_notifies_in_registration_order() {
        let obs = Observable::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let _a = obs.subscribe(move |v| l1.borrow_mut().push(("a", *v)));
        let l2 = Rc::clone(&log);
        let _b = obs.subscribe(move |v| l2.borrow_mut().push(("b", *v)));

        obs.set(3);
        assert_eq!(*log.borrow(), vec![("a", 3), ("b", 3)]);
    }

    #[test]
    fn equal_set_is_noop() {
        let obs = Observable::new(5);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = obs.subscribe(move |_| h.set(h.get() + 1));

        assert!(!obs.set(5));
        assert_eq!(obs.version(), 0);
        assert_eq!(hits.get(), 0);
        assert!(obs.set(6));
        assert_eq!(obs.version(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn drop_unsubscribes() {
        let obs = Observable::new(0);
        let sub = obs.subscribe(|_| {});
        assert_eq!(obs.subscriber_count(), 1);
        drop(sub);
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn callback_may_set_same_observable() {
        let obs = Observable::new(0);
        let handle = obs.clone();
        let _sub = obs.subscribe(move |v| {
            if *v < 3 {
                handle.set(v + 1);
            }
        });
        obs.set(1);
        assert_eq!(obs.get(), 3);
    }

    #[test]
    fn removal_during_cycle_skips_callback() {
        let listeners: Listeners<i32> = Listeners::new();
        let hits = Rc::new(Cell::new(0));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let v = Rc::clone(&victim);
        let _killer = listeners.add(move |_| {
            v.borrow_mut().take();
        });
        let h = Rc::clone(&hits);
        *victim.borrow_mut() = Some(listeners.add(move |_| h.set(h.get() + 1)));

        listeners.notify(&1);
        assert_eq!(hits.get(), 0);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn clear_disarms_outstanding_subscriptions() {
        let listeners: Listeners<str> = Listeners::new();
        let sub = listeners.add(|_| {});
        listeners.clear();
        assert!(listeners.is_empty());
        drop(sub);
        assert!(listeners.is_empty());
    }

    #[test]
    fn subscription_outlives_listeners() {
        let sub = {
            let listeners: Listeners<i32> = Listeners::new();
            listeners.add(|_| {})
        };
        drop(sub);
    }
}
