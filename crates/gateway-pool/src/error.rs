use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no language server provider is configured for '{0}'")]
    NoProvider(String),
    #[error("workspace path is invalid: {0}")]
    InvalidWorkspace(String),
    #[error(transparent)]
    Lsp(#[from] gateway_lsp::Error),
    #[error(
        "language server for ({language}, {workspace:?}) exceeded {max_restarts} restarts and is unhealthy"
    )]
    Exhausted {
        language: String,
        workspace: PathBuf,
        max_restarts: u32,
    },
    #[error("pool has been disposed")]
    Disposed,
}
