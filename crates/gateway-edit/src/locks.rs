use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-URI async locks, acquired in sorted order across a whole transaction
/// so two transactions touching overlapping URI sets can never deadlock.
#[derive(Default)]
pub struct UriLocks {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UriLocks {
    pub fn new() -> Self {
        UriLocks::default()
    }

    fn lock_for(&self, uri: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(uri.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquires every distinct URI's lock, in sorted order, holding all of
    /// them for the life of the returned guard set.
    pub async fn acquire_sorted(&self, uris: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<String> = uris.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for uri in &sorted {
            let mutex = self.lock_for(uri);
            guards.push(mutex.lock_owned().await);
        }
        guards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_distinct_uris_without_blocking_each_other() {
        let locks = UriLocks::new();
        let a = locks
            .acquire_sorted(&["file:///a.rs".to_string()])
            .await;
        let b = locks
            .acquire_sorted(&["file:///b.rs".to_string()])
            .await;
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn dedupes_repeated_uris_in_one_acquisition() {
        let locks = UriLocks::new();
        let guards = locks
            .acquire_sorted(&["file:///a.rs".to_string(), "file:///a.rs".to_string()])
            .await;
        assert_eq!(guards.len(), 1);
    }
}
