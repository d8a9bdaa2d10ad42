
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::registry::remotable::AbstractObject;

/// Bidirectional map of local object ids to hosted objects.
///
/// Ids are allocated monotonically from zero; explicit ids advance the
/// allocation cursor past themselves. An id identifies at most one object
/// for the lifetime of the runtime. Hosting the same object (by `Arc`
/// identity) again returns its prior id.
#[derive(Default)]
pub struct HostTable {
    inner: Mutex<HostInner>,
}

#[derive(Default)]
struct HostInner {
    by_id: HashMap<i64, Arc<dyn AbstractObject>>,
    by_object: HashMap<usize, i64>,
    next_id: i64,
}

fn object_key(object: &Arc<dyn AbstractObject>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

impl HostTable {
    pub fn new() -> Self {
        HostTable::default()
    }

    /// Makes a local object addressable and returns its id.
    pub fn host(&self, object: Arc<dyn AbstractObject>) -> i64 {
        let mut inner = self.inner.lock();
        let key = object_key(&object);
        if let Some(existing) = inner.by_object.get(&key) {
            return *existing;
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.by_object.insert(key, id);
        inner.by_id.insert(id, object);
        log::trace!("hosted object at id {id}");
        id
    }

    /// Hosts an object under an explicit id and advances the allocation
    /// cursor past it.
    pub fn host_with_id(&self, id: i64, object: Arc<dyn AbstractObject>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.by_id.contains_key(&id) {
            return Err(Error::ErrDuplicateObjectId(id));
        }
        let key = object_key(&object);
        if let Some(existing) = inner.by_object.get(&key) {
            if *existing != id {
                return Err(Error::ErrDuplicateObjectId(*existing));
            }
        }

        inner.next_id = inner.next_id.max(id + 1);
        inner.by_object.insert(key, id);
        inner.by_id.insert(id, object);
        log::trace!("hosted object at explicit id {id}");
        Ok(())
    }

    pub fn get(&self, id: i64) -> Option<Arc<dyn AbstractObject>> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    pub fn id_of(&self, object: &Arc<dyn AbstractObject>) -> Option<i64> {
        self.inner.lock().by_object.get(&object_key(object)).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
