use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Opaque `u64` handles for values owned on the Rust side. Handle 0 is never
/// issued so callers can use it as the failure value.
pub struct HandleStore<T> {
    items: HashMap<u64, T>,
    next_id: u64,
}

impl<T> HandleStore<T> {
    pub fn new() -> Self {
        Self { items: HashMap::new(), next_id: 1 }
    }

    pub fn insert(&mut self, item: T) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.items.insert(id, item);
        id
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<T> {
        self.items.remove(&id)
    }
}

/// Lock `mutex`, recovering the guard if a previous holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` on the entry behind `id`.
///
/// The store lock is released before the entry is locked, so a long call on
/// one entry does not block lookups, inserts or calls on other entries.
pub fn with_entry<T, R>(
    store: &Mutex<HandleStore<Arc<Mutex<T>>>>,
    id: u64,
    f: impl FnOnce(&mut T) -> R,
) -> Option<R> {
    let entry = lock(store).get(id).cloned()?;
    let mut guard = lock(&entry);
    Some(f(&mut *guard))
}

impl<T> Default for HandleStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
