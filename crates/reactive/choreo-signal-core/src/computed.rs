use std::rc::Rc;

use crate::signal::{Dep, Signal, Subscription};

/// A derived cell recomputed whenever one of its dependencies changes.
///
/// Dependencies are declared up front via [`Signal::dep`] and never change
/// afterwards, so the dependency graph is acyclic by construction. A
/// `Computed` exposes `get`/`subscribe` but no `set`; derived values can only
/// change through their dependencies.
pub struct Computed<T> {
    out: Signal<T>,
    _subs: Vec<Subscription>,
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    pub fn new(deps: Vec<Dep>, compute: impl Fn() -> T + 'static) -> Self {
        let out = Signal::new(compute());
        let compute = Rc::new(compute);
        let subs = deps
            .iter()
            .map(|dep| {
                let out = out.clone();
                let compute = Rc::clone(&compute);
                (dep.subscribe)(Rc::new(move || out.set(compute())))
            })
            .collect();
        Self { out, _subs: subs }
    }

    pub fn get(&self) -> T {
        self.out.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.out.with(f)
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.out.subscribe(f)
    }

    pub fn on_change(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.out.on_change(f)
    }

    /// Dependency handle so other computed cells can derive from this one.
    pub fn dep(&self) -> Dep {
        self.out.dep()
    }
}
