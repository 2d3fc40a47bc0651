//! `applyEdit(workspace, edit, [dryRun])`: applies a `WorkspaceEdit` through
//! the workspace's [`gateway_edit::TransactionManager`].
//!
//! Unlike the per-file operations, a `WorkspaceEdit` can touch any number of
//! documents across a workspace with no single URI to resolve a pool key
//! from, so the workspace root is an explicit parameter here rather than
//! derived from the edit itself.

use std::path::Path;

use lsp_types::WorkspaceEdit;

use crate::error::Result;
use crate::Gateway;
use gateway_edit::ApplyOptions;

impl Gateway {
    pub async fn apply_edit(
        &self,
        workspace: &Path,
        edit: &WorkspaceEdit,
        options: ApplyOptions,
    ) -> Result<gateway_edit::ApplyResult> {
        let manager = self.transaction_manager(workspace);
        Ok(manager.apply(edit, options).await?)
    }
}
