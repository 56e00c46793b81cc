use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    value: T,
    subscribers: Vec<(u64, Callback<T>)>,
    next_id: u64,
}

/// A single-threaded reactive cell.
///
/// Cloning a `Signal` produces another handle to the same cell. Writes only
/// notify subscribers when the value actually changed (`PartialEq` identity).
/// Notification runs synchronously inside `set`; subscribers may read any
/// signal but must not write back into the one currently notifying.
pub struct Signal<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_tuple("Signal").field(&inner.value).finish()
    }
}

impl<T> Signal<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }
}

impl<T: Clone> Signal<T> {
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }
}

impl<T: Clone + PartialEq> Signal<T> {
    /// Store `value` and notify subscribers if it differs from the current one.
    pub fn set(&self, value: T) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            if inner.value != value {
                inner.value = value;
                true
            } else {
                false
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Mutate the value in place, notifying subscribers if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.value.clone();
            f(&mut inner.value);
            inner.value != before
        };
        if changed {
            self.notify();
        }
    }

    fn notify(&self) {
        // Snapshot subscribers and value so callbacks may subscribe/unsubscribe
        // or read this signal without holding the borrow.
        let (value, subscribers) = {
            let inner = self.inner.borrow();
            (inner.value.clone(), inner.subscribers.clone())
        };
        for (_, callback) in subscribers {
            callback(&value);
        }
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Register `f`, invoking it immediately with the current value and again
    /// on every future change. Dropping the returned [`Subscription`] (or
    /// calling `unsubscribe`) removes the registration.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let f = Rc::new(f);
        let sub = {
            let f = Rc::clone(&f);
            self.on_change(move |v| f(v))
        };
        f(&self.get());
        sub
    }

    /// Register `f` for future changes only.
    pub fn on_change(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Rc::new(f)));
            id
        };
        let weak = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = Weak::upgrade(&weak) {
                    inner.borrow_mut().subscribers.retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }

    /// Type-erased dependency handle for [`crate::Computed`].
    pub fn dep(&self) -> Dep {
        let signal = self.clone();
        Dep {
            subscribe: Box::new(move |f| signal.on_change(move |_| f())),
        }
    }
}

/// Registration guard returned by `subscribe`/`on_change`.
///
/// Dropping the guard removes the subscription; `unsubscribe` does the same
/// explicitly. Both are idempotent. Call [`Subscription::detach`] to keep the
/// subscription alive for the signal's lifetime without holding the guard.
#[must_use]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Leave the subscription registered forever.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// A type-erased dependency edge: "run this thunk whenever the source changes".
pub struct Dep {
    pub(crate) subscribe: Box<dyn Fn(Rc<dyn Fn()>) -> Subscription>,
}
