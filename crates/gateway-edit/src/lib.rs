//! Applies a `WorkspaceEdit` to the filesystem with at-most-once semantics
//! per transaction, rolling back on failure when atomic mode is requested
//! (C5).
//!
//! Grounded in `helix-term/src/commands/lsp.rs`'s `apply_workspace_edit` and
//! `apply_document_resource_op`: the same `DocumentChanges::{Edits,
//! Operations}` split and the same `ResourceOp::{Create,Rename,Delete}`
//! handling, but targeting plain files on disk through temp-file-and-rename
//! commits instead of an editor's in-memory rope buffers, since this
//! gateway has no open-document model of its own.

mod canonical;
mod locks;
mod transaction;

pub use canonical::canonicalize_edit;
pub use transaction::{ApplyOptions, ApplyResult, FileChange, TransactionManager};

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid edit: {0}")]
    InvalidEdit(String),
    #[error("path escapes workspace: {0}")]
    PathEscape(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("transaction failed ({trigger}) and rollback also failed: {cause}")]
    Rollback { trigger: String, cause: String },
}
