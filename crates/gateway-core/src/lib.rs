//! The outer tool surface: the handful of operations an embedding program
//! exposes to its own callers — code intelligence, rename, workspace
//! diagnostics, edit application, and command execution — built entirely on
//! top of [`gateway_pool::Pool`] and [`gateway_edit::TransactionManager`].
//!
//! Grounded in `helix-term/src/commands/lsp.rs`: that module plays exactly
//! this role for the editor, the thin business logic sitting between a UI
//! event and `helix_lsp::Client`'s typed request methods.

mod apply_edit;
mod code_intelligence;
mod diagnostics;
mod error;
mod execute_command;
mod rename;
mod resolve;

pub use apply_edit::*;
pub use code_intelligence::*;
pub use diagnostics::*;
pub use error::{GatewayError, Result};
pub use execute_command::*;
pub use gateway_edit::{ApplyOptions, ApplyResult};
pub use rename::*;
pub use resolve::{UriLanguageResolver, WorkspaceLanguageDetector, WorkspaceResolver};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gateway_edit::TransactionManager;
use gateway_pool::Pool;
use parking_lot::Mutex;

/// Ties the connection pool, the edit-transaction layer, and the injected
/// URI/workspace/language collaborators together behind the outer tool
/// operations.
///
/// One `Gateway` is meant to live for the lifetime of the embedding program;
/// it owns no background tasks of its own beyond what [`Pool`] already runs.
pub struct Gateway {
    pool: Arc<Pool>,
    uri_resolver: Arc<dyn UriLanguageResolver>,
    workspace_resolver: Arc<dyn WorkspaceResolver>,
    language_detector: Arc<dyn WorkspaceLanguageDetector>,
    transactions: Mutex<HashMap<PathBuf, Arc<TransactionManager>>>,
}

impl Gateway {
    pub fn new(
        pool: Arc<Pool>,
        uri_resolver: Arc<dyn UriLanguageResolver>,
        workspace_resolver: Arc<dyn WorkspaceResolver>,
        language_detector: Arc<dyn WorkspaceLanguageDetector>,
    ) -> Self {
        Self {
            pool,
            uri_resolver,
            workspace_resolver,
            language_detector,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    pub(crate) fn resolve_uri(&self, uri: &str) -> Result<(PathBuf, String)> {
        Ok(resolve::resolve_uri(
            uri,
            self.uri_resolver.as_ref(),
            self.workspace_resolver.as_ref(),
        )?)
    }

    pub(crate) fn detect_language(&self, workspace: &Path) -> Option<String> {
        self.language_detector.detect(workspace)
    }

    /// Returns the (lazily created, cached) transaction manager rooted at
    /// `workspace`. One manager per workspace root keeps the per-URI lock
    /// table scoped correctly: two workspaces never contend over
    /// the same `UriLocks` map even if they happen to share a relative path.
    pub(crate) fn transaction_manager(&self, workspace: &Path) -> Arc<TransactionManager> {
        let mut transactions = self.transactions.lock();
        transactions
            .entry(workspace.to_path_buf())
            .or_insert_with(|| Arc::new(TransactionManager::new(workspace.to_path_buf())))
            .clone()
    }
}
