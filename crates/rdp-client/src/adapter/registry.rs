use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::adapter::ObjectGripAdapter;

#[derive(Default)]
struct Providers {
    last_id: u32,
    by_id: HashMap<u32, Arc<ObjectGripAdapter>>,
}

/// Numeric handles for objects whose children a host may ask for later.
///
/// Ids start at 1 and are never reused within a session, so a host holding a
/// stale id gets `None` instead of some other object.
#[derive(Default)]
pub struct VariablesProviders {
    inner: Mutex<Providers>,
}

impl VariablesProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id, build the provider for it and store it.
    pub(crate) fn register(
        &self,
        build: impl FnOnce(u32) -> Arc<ObjectGripAdapter>,
    ) -> Arc<ObjectGripAdapter> {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = inner.last_id;
        let provider = build(id);
        inner.by_id.insert(id, provider.clone());
        provider
    }

    pub fn get(&self, id: u32) -> Option<Arc<ObjectGripAdapter>> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    pub fn unregister(&self, id: u32) -> bool {
        self.inner.lock().by_id.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
