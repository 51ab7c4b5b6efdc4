use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Entries kept before dead weak references are swept.
const SWEEP_THRESHOLD: usize = 256;

/// Per-transfer reader/writer locks.
///
/// Chunk uploads take the shared side so different indices proceed in
/// parallel; finalize and abort take the exclusive side. Entries are held
/// through weak references and disappear once no caller holds them.
#[derive(Debug, Default)]
pub struct TransferLocks {
    inner: Mutex<HashMap<String, Weak<RwLock<()>>>>,
}

/// Handle to one transfer's lock; lock it with [`shared`](Self::shared) or
/// [`exclusive`](Self::exclusive).
#[derive(Debug, Clone)]
pub struct TransferLock(Arc<RwLock<()>>);

impl TransferLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `transfer_id`, creating it if needed.
    pub fn get(&self, transfer_id: &str) -> TransferLock {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = map.get(transfer_id).and_then(Weak::upgrade) {
            return TransferLock(lock);
        }

        if map.len() >= SWEEP_THRESHOLD {
            map.retain(|_, weak| weak.strong_count() > 0);
        }

        let lock = Arc::new(RwLock::new(()));
        map.insert(transfer_id.to_string(), Arc::downgrade(&lock));
        TransferLock(lock)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.values().filter(|weak| weak.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransferLock {
    /// Acquires the shared side. The lock guards no data, so poisoning is
    /// ignored.
    pub fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the exclusive side.
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
