//! `executeCommand(workspace, [language], command, [arguments])`: forwards
//! to `workspace/executeCommand`, grounded in
//! `helix_lsp::Client::command`/`helix-term/src/commands/lsp.rs`'s
//! `execute_lsp_command`.
//!
//! Like `applyEdit`, a bare command name and argument list carry no file URI
//! to resolve a pool key from, so the workspace is explicit and the language
//! is either given by the caller or guessed by the injected
//! [`crate::WorkspaceLanguageDetector`].

use std::path::Path;

use lsp_types::{ExecuteCommandParams, WorkDoneProgressParams};
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::Gateway;

impl Gateway {
    pub async fn execute_command(
        &self,
        workspace: &Path,
        language: Option<&str>,
        command: &str,
        arguments: Vec<Value>,
    ) -> Result<Value> {
        let language = match language {
            Some(language) => language.to_string(),
            None => self.detect_language(workspace).ok_or_else(|| {
                GatewayError::InvalidParams(
                    "no language given and none could be detected for this workspace".to_string(),
                )
            })?,
        };

        let client = self.pool.get(&language, workspace).await?;

        let params = ExecuteCommandParams {
            command: command.to_string(),
            arguments,
            work_done_progress_params: WorkDoneProgressParams::default(),
        };

        let value = client
            .send_request("workspace/executeCommand", serde_json::to_value(params)?)
            .await?;
        Ok(value)
    }
}
