//! Keyed pool of LSP clients: lazy creation, health polling, crash-restart,
//! idle eviction, and graceful bulk disposal (C4).
//!
//! `helix_lsp::Registry` (`helix-lsp/src/lib.rs`) has no direct analogue for
//! this: it maps a document to an already-known client and never creates or
//! restarts one; an editor's LSP servers are started once by `helix-view`'s
//! editor setup and live for the process lifetime. This component is new
//! core logic, grounded instead in the same codebase's concurrency
//! *idioms*: `parking_lot::Mutex` for short critical sections (as
//! `helix_lsp::Client::workspace_folders` uses it) and `tokio::sync::Mutex`
//! as the single-flight guard for the one genuinely async critical section
//! per key (client creation/restart/dispose).

mod entry;
mod error;
mod health;

pub use entry::PoolEntry;
pub use error::PoolError;
pub use health::{HealthRecord, HealthStatus};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_lsp::client::{ClientEvent, ClientTimeouts, LanguageServerConfig};
use gateway_lsp::{Client, RoutedEvent};
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::time::Instant;

pub type PoolKey = (String, PathBuf);

/// Resolves the [`LanguageServerConfig`] for a pool key. Implemented by the
/// embedding program (typically backed by `gateway-providers`), injected as
/// a trait object so the pool never depends on the closed provider enum
/// directly.
pub trait ConfigResolver: Send + Sync {
    fn resolve(&self, language: &str, workspace: &Path) -> Option<LanguageServerConfig>;
}

/// Resolves a document URI's language id, used by `getForFile`.
pub trait UriLanguageResolver: Send + Sync {
    fn language_for_uri(&self, uri: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub health_check_interval: Duration,
    pub idle_timeout: Duration,
    pub max_restarts: u32,
    pub restart_window: Duration,
    pub start_timeout: Duration,
    pub ping_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub kill_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            health_check_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_restarts: 3,
            restart_window: Duration::from_secs(300),
            start_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            kill_grace: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    fn client_timeouts(&self) -> ClientTimeouts {
        ClientTimeouts {
            start: self.start_timeout,
            shutdown: self.shutdown_timeout,
            kill_grace: self.kill_grace,
        }
    }
}

pub struct Pool {
    entries: RwLock<HashMap<PoolKey, Arc<PoolEntry>>>,
    resolver: Arc<dyn ConfigResolver>,
    uri_resolver: Arc<dyn UriLanguageResolver>,
    config: PoolConfig,
    disposed: AtomicBool,
    health_loop_stop: Notify,
}

impl Pool {
    pub fn new(
        resolver: Arc<dyn ConfigResolver>,
        uri_resolver: Arc<dyn UriLanguageResolver>,
        config: PoolConfig,
    ) -> Arc<Pool> {
        let pool = Arc::new(Pool {
            entries: RwLock::new(HashMap::new()),
            resolver,
            uri_resolver,
            config,
            disposed: AtomicBool::new(false),
            health_loop_stop: Notify::new(),
        });
        pool.clone().spawn_health_loop();
        pool
    }

    fn spawn_health_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.health_check_interval) => {
                        self.run_health_check().await;
                    }
                    _ = self.health_loop_stop.notified() => break,
                }
            }
        });
    }

    async fn run_health_check(&self) {
        let snapshot: Vec<Arc<PoolEntry>> = self.entries.read().values().cloned().collect();
        for entry in snapshot {
            self.check_one(&entry).await;
            self.maybe_evict_idle(&entry).await;
        }
    }

    async fn check_one(&self, entry: &PoolEntry) {
        let client = entry.client.read().clone();
        let Some(client) = client else { return };
        if !client.is_connected() {
            if client.state() == gateway_lsp::client::ClientState::Crashed {
                self.handle_crash(entry).await;
            }
            return;
        }

        let alive = client.ping(self.config.ping_timeout).await;
        entry.health.lock().last_check = Instant::now();
        if alive {
            entry.health.lock().status = HealthStatus::Healthy;
        } else {
            log::warn!(
                "health check failed for ({}, {:?}): ping returned no reply",
                entry.key.0,
                entry.key.1
            );
            self.handle_crash(entry).await;
        }
    }

    async fn handle_crash(&self, entry: &PoolEntry) {
        let _guard = entry.single_flight.lock().await;
        // re-check: someone else may have already restarted or evicted.
        {
            let mut health = entry.health.lock();
            let status = health.record_crash(Instant::now(), self.config.restart_window, self.config.max_restarts);
            if status == HealthStatus::Unhealthy {
                health.last_error = Some(format!(
                    "exceeded {} restarts within {:?}",
                    self.config.max_restarts, self.config.restart_window
                ));
                log::error!(
                    "language server ({}, {:?}) unhealthy after {} crashes; giving up",
                    entry.key.0,
                    entry.key.1,
                    health.crash_count
                );
                return;
            }
        }

        log::warn!(
            "restarting language server ({}, {:?}) after a crash",
            entry.key.0,
            entry.key.1
        );
        if let Some(old) = entry.client.read().clone() {
            let _ = tokio::time::timeout(self.config.shutdown_timeout, old.stop()).await;
        }
        match self.spawn_client(entry).await {
            Ok(client) => {
                *entry.client.write() = Some(client);
                entry.health.lock().status = HealthStatus::Healthy;
            }
            Err(err) => {
                let mut health = entry.health.lock();
                health.status = HealthStatus::Unhealthy;
                health.last_error = Some(err.to_string());
                log::error!(
                    "failed to restart language server ({}, {:?}): {err}",
                    entry.key.0,
                    entry.key.1
                );
            }
        }
    }

    async fn maybe_evict_idle(&self, entry: &PoolEntry) {
        let age = Instant::now().duration_since(*entry.last_access.lock());
        if age < self.config.idle_timeout {
            return;
        }
        let Some(client) = entry.client.read().clone() else { return };
        if client.pending_request_count() > 0 {
            return;
        }
        let _guard = entry.single_flight.lock().await;
        // re-check under the lock in case a concurrent `get` just bumped access time.
        let age = Instant::now().duration_since(*entry.last_access.lock());
        if age < self.config.idle_timeout {
            return;
        }
        log::info!("evicting idle language server ({}, {:?})", entry.key.0, entry.key.1);
        client.stop().await;
        self.entries.write().remove(&entry.key);
    }

    async fn spawn_client(&self, entry: &PoolEntry) -> Result<Arc<Client>, PoolError> {
        let (client, mut events) = Client::start(
            entry.key.0.clone(),
            entry.key.1.clone(),
            entry.config.clone(),
            self.config.client_timeouts(),
        )
        .await
        .map_err(PoolError::from)?;

        // Drain stderr/crash events so the channel doesn't back up; crash
        // detection itself happens via the health loop observing client
        // state through this one-way pool<->client event channel.
        let key = entry.key.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let ClientEvent::Crash { exit_code, signal } = event {
                    log::error!(
                        "({}, {:?}) crash event: exit_code={exit_code:?} signal={signal:?}",
                        key.0,
                        key.1
                    );
                }
            }
        });

        // Drains server-initiated requests and non-diagnostic notifications
        // this client routed up but didn't answer itself: replies to the
        // former with a conservative default so a server awaiting the
        // answer isn't left hanging, forwards the latter to the logger.
        {
            let client = client.clone();
            tokio::spawn(async move {
                while let Some(event) = client.next_unhandled().await {
                    match event {
                        RoutedEvent::MethodCall(call) => client.reply_default(&call),
                        RoutedEvent::Notification(notification) => {
                            client.log_notification(&notification)
                        }
                    }
                }
            });
        }

        Ok(client)
    }

    fn entry_for_key(&self, key: &PoolKey, config: &LanguageServerConfig) -> Arc<PoolEntry> {
        if let Some(entry) = self.entries.read().get(key) {
            return entry.clone();
        }
        let mut entries = self.entries.write();
        entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(PoolEntry::new(key.clone(), config.clone())))
            .clone()
    }

    /// Returns an `initialized` client for `(language, workspace)`, creating
    /// it if absent. Concurrent callers for the same key share one create
    /// operation via the entry's single-flight mutex.
    pub async fn get(&self, language: &str, workspace: &Path) -> Result<Arc<Client>, PoolError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(PoolError::Disposed);
        }
        let language = language.to_ascii_lowercase();
        let canonical = gateway_stdx::path::canonicalize_workspace(workspace)
            .map_err(|err| PoolError::InvalidWorkspace(format!("{}: {err}", workspace.display())))?;
        let key: PoolKey = (language.clone(), canonical);

        let config = self
            .resolver
            .resolve(&language, workspace)
            .ok_or_else(|| PoolError::NoProvider(language.clone()))?;

        let entry = self.entry_for_key(&key, &config);
        *entry.last_access.lock() = Instant::now();

        {
            let health = entry.health.lock();
            if health.status == HealthStatus::Unhealthy {
                return Err(PoolError::Exhausted {
                    language: key.0.clone(),
                    workspace: key.1.clone(),
                    max_restarts: self.config.max_restarts,
                });
            }
        }

        if let Some(client) = entry.client.read().clone() {
            if client.is_connected() {
                return Ok(client);
            }
        }

        let _guard = entry.single_flight.lock().await;
        if let Some(client) = entry.client.read().clone() {
            if client.is_connected() {
                return Ok(client);
            }
        }

        entry.health.lock().status = HealthStatus::Starting;
        let client = self.spawn_client(&entry).await?;
        *entry.client.write() = Some(client.clone());
        let mut health = entry.health.lock();
        health.status = HealthStatus::Healthy;
        health.started_at = Some(Instant::now());
        drop(health);
        Ok(client)
    }

    /// Resolves `fileUri`'s language via the injected URI resolver, then
    /// delegates to [`Pool::get`]. Returns `None` if the extension is
    /// unmapped.
    pub async fn get_for_file(
        &self,
        file_uri: &str,
        workspace: &Path,
    ) -> Option<Result<Arc<Client>, PoolError>> {
        let language = self.uri_resolver.language_for_uri(file_uri)?;
        Some(self.get(&language, workspace).await)
    }

    /// Snapshot of every key whose client is currently `initialized`.
    pub fn get_all_active(&self) -> Vec<(String, Arc<Client>)> {
        self.entries
            .read()
            .values()
            .filter_map(|entry| {
                entry
                    .client
                    .read()
                    .clone()
                    .filter(|c| c.is_connected())
                    .map(|c| (entry.key.0.clone(), c))
            })
            .collect()
    }

    /// Snapshot of every entry's health record.
    pub fn get_health(&self) -> HashMap<PoolKey, HealthRecord> {
        self.entries
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.health.lock().clone()))
            .collect()
    }

    /// Disposes and removes a single entry regardless of health or idle
    /// state; the operator's recovery path for a `PoolExhaustedError`.
    pub async fn evict(&self, language: &str, workspace: &Path) {
        let language = language.to_ascii_lowercase();
        let Ok(canonical) = gateway_stdx::path::canonicalize_workspace(workspace) else {
            return;
        };
        let key: PoolKey = (language, canonical);
        let entry = { self.entries.write().remove(&key) };
        if let Some(entry) = entry {
            let _guard = entry.single_flight.lock().await;
            if let Some(client) = entry.client.write().take() {
                client.stop().await;
            }
        }
    }

    /// Halts the health loop, then disposes every client concurrently and
    /// blocks until each has reached `stopped`. Idempotent.
    pub async fn dispose_all(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.health_loop_stop.notify_waiters();

        let entries: Vec<Arc<PoolEntry>> = self.entries.write().drain().map(|(_, v)| v).collect();
        let stops = entries.into_iter().map(|entry| async move {
            let _guard = entry.single_flight.lock().await;
            if let Some(client) = entry.client.write().take() {
                client.stop().await;
            }
        });
        futures_util::future::join_all(stops).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoProviders;
    impl ConfigResolver for NoProviders {
        fn resolve(&self, _language: &str, _workspace: &Path) -> Option<LanguageServerConfig> {
            None
        }
    }
    struct ExtensionResolver;
    impl UriLanguageResolver for ExtensionResolver {
        fn language_for_uri(&self, uri: &str) -> Option<String> {
            if uri.ends_with(".rs") {
                Some("rust".to_string())
            } else {
                None
            }
        }
    }

    fn test_pool() -> Arc<Pool> {
        Pool::new(Arc::new(NoProviders), Arc::new(ExtensionResolver), PoolConfig::default())
    }

    #[tokio::test]
    async fn get_surfaces_no_provider_error() {
        let pool = test_pool();
        let dir = tempfile::tempdir().unwrap();
        let err = pool.get("cobol", dir.path()).await.unwrap_err();
        assert!(matches!(err, PoolError::NoProvider(lang) if lang == "cobol"));
    }

    #[tokio::test]
    async fn get_rejects_a_nonexistent_workspace() {
        let pool = test_pool();
        let err = pool.get("rust", Path::new("/no/such/workspace")).await.unwrap_err();
        assert!(matches!(err, PoolError::InvalidWorkspace(_)));
    }

    #[tokio::test]
    async fn get_for_file_returns_none_for_an_unmapped_extension() {
        let pool = test_pool();
        let dir = tempfile::tempdir().unwrap();
        let result = pool.get_for_file("file:///tmp/foo.xyz", dir.path()).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn dispose_all_on_an_empty_pool_is_a_harmless_no_op() {
        let pool = test_pool();
        pool.dispose_all().await;
        pool.dispose_all().await;
        assert!(pool.get_all_active().is_empty());
    }

    #[tokio::test]
    async fn evict_on_an_unknown_key_does_not_panic() {
        let pool = test_pool();
        let dir = tempfile::tempdir().unwrap();
        pool.evict("rust", dir.path()).await;
    }
}
