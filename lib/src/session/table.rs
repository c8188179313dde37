//! A single, internally synchronized handle table.

use {
    cranelift_entity::EntityRef,
    std::{
        collections::HashMap,
        hash::Hash,
        sync::{Mutex, MutexGuard, PoisonError},
    },
};

/// The largest index a handle can take. `u32::MAX` is the entity sentinel.
const MAX_INDEX: usize = u32::MAX as usize - 1;

/// A handle map for one kind of resource.
///
/// Handles come from a counter that starts at 1, so `0` stays free to mean "no value" at the guest
/// boundary. Retiring a handle frees its entry, and the counter is not rewound, so a stale handle
/// fails its lookup. Only once the counter wraps can an index be handed out again, and never
/// while it is still live.
///
/// Every operation takes the table's lock for its own duration only; callers never observe a
/// guard, so a drop racing a lookup on the same handle is serialized here.
pub struct Table<H, T> {
    inner: Mutex<Inner<H, T>>,
}

struct Inner<H, T> {
    entries: HashMap<H, T>,
    next: usize,
}

impl<H: EntityRef + Hash, T> Default for Table<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: EntityRef + Hash, T> Table<H, T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next: 1,
            }),
        }
    }

    // A panic while holding the lock cannot leave a half-written entry behind: every critical
    // section is a single insert, remove, or closure call on one entry.
    fn lock(&self) -> MutexGuard<'_, Inner<H, T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a value, returning its new handle. Never returns the reserved handle.
    pub fn allocate(&self, value: T) -> H {
        let mut inner = self.lock();
        let handle = loop {
            let candidate = H::new(inner.next);
            inner.next = if inner.next == MAX_INDEX {
                1
            } else {
                inner.next + 1
            };
            if !inner.entries.contains_key(&candidate) {
                break candidate;
            }
        };
        inner.entries.insert(handle, value);
        handle
    }

    /// Whether `handle` currently refers to a live entry.
    pub fn contains(&self, handle: H) -> bool {
        self.lock().entries.contains_key(&handle)
    }

    /// Run `f` against the entry for `handle`, if it is live.
    pub fn with<R>(&self, handle: H, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.lock().entries.get(&handle).map(f)
    }

    /// Run `f` against a mutable reference to the entry for `handle`, if it is live.
    pub fn with_mut<R>(&self, handle: H, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.lock().entries.get_mut(&handle).map(f)
    }

    /// Take ownership of the entry for `handle`, retiring the handle.
    pub fn take(&self, handle: H) -> Option<T> {
        self.lock().entries.remove(&handle)
    }

    /// Take the entry for `handle` only if `pred` accepts it. A rejected entry stays live.
    pub fn take_if(&self, handle: H, pred: impl FnOnce(&T) -> bool) -> Option<T> {
        let mut inner = self.lock();
        if inner.entries.get(&handle).is_some_and(pred) {
            inner.entries.remove(&handle)
        } else {
            None
        }
    }

    /// Retire `handle`, dropping its entry. Returns whether anything was removed.
    pub fn remove(&self, handle: H) -> bool {
        self.take(handle).is_some()
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: EntityRef + Hash, T: Clone> Table<H, T> {
    /// Get a copy of the entry for `handle`, if it is live.
    pub fn get(&self, handle: H) -> Option<T> {
        self.with(handle, T::clone)
    }
}
