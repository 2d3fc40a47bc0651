//! `codeIntelligence(uri, position, kind, [context], [maxResults])`: hover,
//! signature help, and completion collapsed behind one entry point since all
//! three are a single `(client, text_document, position)` request away from
//! each other, grounded in `helix-term/src/commands/lsp.rs`'s
//! `hover`/`signature_help_impl`/completion-trigger handlers and
//! `helix_lsp::Client::{text_document_hover, text_document_signature_help,
//! completion}`.

use std::path::Path;

use lsp_types::{
    CompletionContext, CompletionItem, CompletionParams, CompletionResponse, Hover, HoverParams,
    PartialResultParams, Position, SignatureHelp, SignatureHelpParams, TextDocumentIdentifier,
    TextDocumentPositionParams, WorkDoneProgressParams,
};
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::Gateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeIntelligenceKind {
    Hover,
    Signature,
    Completion,
}

#[derive(Debug, Clone)]
pub struct CodeIntelligenceRequest {
    pub uri: String,
    pub position: Position,
    pub kind: CodeIntelligenceKind,
    /// Opaque completion context (`triggerKind`/`triggerCharacter`); ignored
    /// for hover/signature requests.
    pub context: Option<Value>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum CodeIntelligenceResult {
    Hover(Option<Hover>),
    Signature(Option<SignatureHelp>),
    Completion(Vec<CompletionItem>),
}

impl Gateway {
    pub async fn code_intelligence(
        &self,
        request: CodeIntelligenceRequest,
    ) -> Result<CodeIntelligenceResult> {
        let (workspace, language) = self.resolve_uri(&request.uri)?;
        let client = self.pool.get(&language, &workspace).await?;

        self.ensure_opened(&client, &request.uri, &language, &workspace)?;

        let text_document = TextDocumentIdentifier {
            uri: request.uri.parse().map_err(|_| {
                GatewayError::InvalidParams(format!("not a valid URI: {}", request.uri))
            })?,
        };

        match request.kind {
            CodeIntelligenceKind::Hover => {
                let params = HoverParams {
                    text_document_position_params: TextDocumentPositionParams {
                        text_document,
                        position: request.position,
                    },
                    work_done_progress_params: WorkDoneProgressParams::default(),
                };
                let value = client
                    .send_request("textDocument/hover", serde_json::to_value(params)?)
                    .await?;
                let hover: Option<Hover> = serde_json::from_value(value)?;
                Ok(CodeIntelligenceResult::Hover(hover))
            }
            CodeIntelligenceKind::Signature => {
                let params = SignatureHelpParams {
                    text_document_position_params: TextDocumentPositionParams {
                        text_document,
                        position: request.position,
                    },
                    work_done_progress_params: WorkDoneProgressParams::default(),
                    context: None,
                };
                let value = client
                    .send_request("textDocument/signatureHelp", serde_json::to_value(params)?)
                    .await?;
                let help: Option<SignatureHelp> = serde_json::from_value(value)?;
                Ok(CodeIntelligenceResult::Signature(help))
            }
            CodeIntelligenceKind::Completion => {
                let context: CompletionContext = match request.context {
                    Some(value) => serde_json::from_value(value)?,
                    None => CompletionContext {
                        trigger_kind: lsp_types::CompletionTriggerKind::INVOKED,
                        trigger_character: None,
                    },
                };
                let params = CompletionParams {
                    text_document_position: TextDocumentPositionParams {
                        text_document,
                        position: request.position,
                    },
                    work_done_progress_params: WorkDoneProgressParams::default(),
                    partial_result_params: PartialResultParams::default(),
                    context: Some(context),
                };
                let value = client
                    .send_request("textDocument/completion", serde_json::to_value(params)?)
                    .await?;
                let response: Option<CompletionResponse> = serde_json::from_value(value)?;
                let mut items = match response {
                    Some(CompletionResponse::Array(items)) => items,
                    Some(CompletionResponse::List(list)) => list.items,
                    None => Vec::new(),
                };
                if let Some(max) = request.max_results {
                    items.truncate(max);
                }
                Ok(CodeIntelligenceResult::Completion(items))
            }
        }
    }

    /// Reads `uri`'s current contents off disk and ensures the client has
    /// seen a `textDocument/didOpen` for it before any semantic request.
    pub(crate) fn ensure_opened(
        &self,
        client: &gateway_lsp::Client,
        uri: &str,
        language_id: &str,
        workspace: &Path,
    ) -> Result<()> {
        let path = gateway_stdx::uri::uri_to_file_path(&uri.parse().map_err(|_| {
            GatewayError::InvalidParams(format!("not a valid URI: {uri}"))
        })?)?;
        let _ = workspace;
        let text = std::fs::read_to_string(&path)?;
        client.ensure_opened(uri, language_id, &text)?;
        Ok(())
    }
}
