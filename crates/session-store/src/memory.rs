//! In-memory session store.

use crate::{SessionStore, StoreResult};
use session_model::SessionRecord;
use std::sync::RwLock;

/// Ephemeral store holding the record in process memory.
///
/// Used by tests and by embeddings that do not want a session to outlive
/// the process.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Option<SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store that already contains `record`.
    pub fn with_record(record: SessionRecord) -> Self {
        Self {
            inner: RwLock::new(Some(record)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn put(&self, record: &SessionRecord) -> StoreResult<()> {
        let mut guard = self.inner.write().unwrap();
        *guard = Some(record.clone());
        Ok(())
    }

    fn get(&self) -> StoreResult<Option<SessionRecord>> {
        let guard = self.inner.read().unwrap();
        Ok(guard.clone())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut guard = self.inner.write().unwrap();
        *guard = None;
        Ok(())
    }
}
