// Deferred attribute groups
//
// Several remote attributes arrive in one reply (a method's first/last
// location and line table, a class's method list and indexes). A group is a
// fixed-shape struct of optional members; the first read of an absent member
// runs the group's loader once and stores every member it returns.

use crate::poison::lock;
use crate::protocol::{JdwpError, JdwpResult};
use std::future::Future;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

struct Store<G> {
    state: LoadState,
    values: G,
}

struct LoadGuard<'a, G> {
    store: &'a Mutex<Store<G>>,
    name: &'static str,
    armed: bool,
}

impl<G> Drop for LoadGuard<'_, G> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.store, self.name).state = LoadState::Unloaded;
        }
    }
}

pub struct Deferred<G> {
    store: Mutex<Store<G>>,
}

impl<G: Default> Default for Deferred<G> {
    fn default() -> Self {
        Self {
            store: Mutex::new(Store {
                state: LoadState::Unloaded,
                values: G::default(),
            }),
        }
    }
}

impl<G: Default> Deferred<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one member, loading the whole group if that member is absent.
    ///
    /// While the loader is in flight every absent member of the group reads as
    /// a placeholder, reported as `JdwpError::Loading(name)`. That includes
    /// reads made by the loader itself and by concurrent callers. A failed or
    /// abandoned load leaves the group unloaded so a later read retries.
    pub async fn read<T, P, F, Fut>(&self, name: &'static str, project: P, load: F) -> JdwpResult<T>
    where
        P: Fn(&G) -> Option<T>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = JdwpResult<G>>,
    {
        {
            let mut store = lock(&self.store, name);
            if let Some(value) = project(&store.values) {
                return Ok(value);
            }
            if store.state == LoadState::Loading {
                return Err(JdwpError::Loading(name));
            }
            store.state = LoadState::Loading;
        }

        // Resets the group if the loader fails or the caller stops polling
        let mut guard = LoadGuard {
            store: &self.store,
            name,
            armed: true,
        };
        let loaded = load().await?;

        let mut store = lock(&self.store, name);
        store.values = loaded;
        store.state = LoadState::Loaded;
        guard.armed = false;
        project(&store.values).ok_or(JdwpError::Loading(name))
    }

    /// Store members directly, bypassing the loader for them
    pub fn write(&self, update: impl FnOnce(&mut G)) {
        let mut store = lock(&self.store, "deferred write");
        update(&mut store.values);
    }

    /// Read whatever is cached without triggering a load
    pub fn peek<T>(&self, project: impl Fn(&G) -> Option<T>) -> Option<T> {
        project(&lock(&self.store, "deferred peek").values)
    }

    /// Copy of the whole group as currently stored
    pub fn snapshot(&self) -> G
    where
        G: Clone,
    {
        lock(&self.store, "deferred snapshot").values.clone()
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.store, "deferred state").state == LoadState::Loaded
    }
}
