use thiserror::Error;

/// Errors the outer tool surface can return. `PoolExhaustedError` and
/// the connection/crash/timeout/protocol taxonomy live in [`gateway_pool`]
/// and [`gateway_lsp`]; this enum adds only the surface-level
/// `InvalidParamsError` plus thin wrappers so one error type can cross every
/// tool entry point.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("no language server is available for this request")]
    NoServer,
    #[error("the language server declined the rename (no edit returned)")]
    RenameRejected,
    #[error(transparent)]
    Pool(#[from] gateway_pool::PoolError),
    #[error(transparent)]
    Lsp(#[from] gateway_lsp::Error),
    #[error(transparent)]
    Edit(#[from] gateway_edit::Error),
    #[error("malformed server response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error(transparent)]
    Uri(#[from] gateway_stdx::uri::FilePathError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, GatewayError>;
