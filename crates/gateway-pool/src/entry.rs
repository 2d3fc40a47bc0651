use std::sync::Arc;

use gateway_lsp::client::LanguageServerConfig;
use gateway_lsp::Client;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::health::HealthRecord;
use crate::PoolKey;

/// One `(language, workspace)` slot. `client` is `None` before first use and
/// briefly during a restart; `single_flight` serializes the one genuinely
/// async critical section per key (create, restart, dispose) so concurrent
/// callers for the same key share a single in-flight operation instead of
/// racing to spawn duplicate processes.
pub struct PoolEntry {
    pub key: PoolKey,
    pub config: LanguageServerConfig,
    pub client: RwLock<Option<Arc<Client>>>,
    pub health: Mutex<HealthRecord>,
    pub last_access: Mutex<Instant>,
    pub single_flight: tokio::sync::Mutex<()>,
}

impl PoolEntry {
    pub fn new(key: PoolKey, config: LanguageServerConfig) -> Self {
        PoolEntry {
            key,
            config,
            client: RwLock::new(None),
            health: Mutex::new(HealthRecord::new()),
            last_access: Mutex::new(Instant::now()),
            single_flight: tokio::sync::Mutex::new(()),
        }
    }
}
