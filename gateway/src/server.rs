//! The gateway's own wire surface: a framed JSON-RPC loop over stdin/stdout
//! that exposes the outer tool operations (`codeIntelligence`,
//! `renameSymbol`, `getDiagnostics`, `applyEdit`, `executeCommand`) plus a
//! `health` read.
//!
//! The outer tool-routing/registration layer is deliberately kept out of
//! `gateway-core` — this module is that layer's embedding-program-side half:
//! a loop that frames requests the same way `gateway-jsonrpc` frames them to
//! a backend (an editor has no analogue for this, since `helix-term` talks
//! to a terminal, not a caller process), so this reuses the same framing
//! module verbatim rather than inventing a second wire format.

use std::path::PathBuf;
use std::sync::Arc;

use gateway_core::{
    ApplyOptions, CodeIntelligenceKind, CodeIntelligenceRequest, CodeIntelligenceResult,
    DiagnosticsQuery, Gateway, GatewayError, SymbolLocator,
};
use gateway_jsonrpc::framing;
use gateway_jsonrpc::jsonrpc::{Error as RpcError, ErrorCode, Failure, Id, MethodCall, Success, Version};
use lsp_types::{DiagnosticSeverity, Position, WorkspaceEdit};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{BufReader, BufWriter};

/// Routes parsed requests to [`Gateway`] operations and shapes their
/// replies to a stable JSON form per tool.
pub struct Router {
    gateway: Arc<Gateway>,
}

impl Router {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Router { gateway }
    }

    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "codeIntelligence" => self.code_intelligence(params).await,
            "renameSymbol" => self.rename_symbol(params).await,
            "getDiagnostics" => self.get_diagnostics(params).await,
            "applyEdit" => self.apply_edit(params).await,
            "executeCommand" => self.execute_command(params).await,
            "health" => Ok(self.health()),
            other => Err(RpcError {
                code: ErrorCode::MethodNotFound,
                message: format!("unknown method '{other}'"),
                data: None,
            }),
        }
    }

    async fn code_intelligence(&self, params: Value) -> Result<Value, RpcError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            uri: String,
            position: PositionDto,
            kind: String,
            #[serde(default)]
            context: Option<Value>,
            #[serde(default)]
            max_results: Option<usize>,
        }
        let params: Params = parse_params(params)?;
        let kind = match params.kind.as_str() {
            "hover" => CodeIntelligenceKind::Hover,
            "signature" => CodeIntelligenceKind::Signature,
            "completion" => CodeIntelligenceKind::Completion,
            other => return Err(invalid_params(format!("unknown kind '{other}'"))),
        };
        let request = CodeIntelligenceRequest {
            uri: params.uri,
            position: params.position.into(),
            kind,
            context: params.context,
            max_results: params.max_results,
        };
        let result = self
            .gateway
            .code_intelligence(request)
            .await
            .map_err(to_rpc_error)?;
        Ok(match result {
            CodeIntelligenceResult::Hover(hover) => json!({ "hover": hover }),
            CodeIntelligenceResult::Signature(help) => json!({ "signatureHelp": help }),
            CodeIntelligenceResult::Completion(items) => json!({ "completionItems": items }),
        })
    }

    async fn rename_symbol(&self, params: Value) -> Result<Value, RpcError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            #[serde(default)]
            location: Option<lsp_types::Location>,
            #[serde(default)]
            uri: Option<String>,
            #[serde(default)]
            position: Option<PositionDto>,
            new_name: String,
        }
        let params: Params = parse_params(params)?;
        let symbol = match (params.location, params.uri, params.position) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(invalid_params(
                    "supply either `location` or `uri`+`position`, not both",
                ))
            }
            (Some(location), None, None) => SymbolLocator::Location(location),
            (None, Some(uri), Some(position)) => SymbolLocator::UriPosition {
                uri,
                position: position.into(),
            },
            _ => {
                return Err(invalid_params(
                    "rename requires either `location` or both `uri` and `position`",
                ))
            }
        };

        let outcome = self
            .gateway
            .rename_symbol(symbol, &params.new_name)
            .await
            .map_err(to_rpc_error)?;
        let applied = outcome.applied;
        Ok(json!({
            "summary": format!(
                "renamed {} occurrence(s) across {} file(s)",
                applied.total_changes,
                applied.files_modified.len()
            ),
            "filesModified": applied.files_modified,
            "occurrencesReplaced": applied.total_changes,
            "rollbackPerformed": applied.rollback_performed,
            "edit": outcome.edit,
        }))
    }

    async fn get_diagnostics(&self, params: Value) -> Result<Value, RpcError> {
        #[derive(Deserialize, Default)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            #[serde(default)]
            uri: Option<String>,
            #[serde(default)]
            severity: Option<String>,
            #[serde(default)]
            include_related: bool,
            #[serde(default)]
            max_results: Option<usize>,
        }
        let params: Params = parse_params(params)?;
        let min_severity = match params.severity.as_deref() {
            None => None,
            Some("error") => Some(DiagnosticSeverity::ERROR),
            Some("warning") => Some(DiagnosticSeverity::WARNING),
            Some("info") => Some(DiagnosticSeverity::INFORMATION),
            Some("hint") => Some(DiagnosticSeverity::HINT),
            Some(other) => return Err(invalid_params(format!("unknown severity '{other}'"))),
        };

        let summary = self
            .gateway
            .get_diagnostics(DiagnosticsQuery {
                uri: params.uri,
                min_severity,
                max_results: params.max_results,
                include_related: params.include_related,
            })
            .await
            .map_err(to_rpc_error)?;

        let files: Vec<Value> = summary
            .files
            .iter()
            .map(|f| json!({ "uri": f.uri, "diagnostics": f.diagnostics }))
            .collect();
        Ok(json!({ "files": files, "truncated": summary.truncated }))
    }

    async fn apply_edit(&self, params: Value) -> Result<Value, RpcError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            workspace: PathBuf,
            edit: WorkspaceEdit,
            #[serde(default)]
            atomic: Option<bool>,
            #[serde(default)]
            dry_run: Option<bool>,
        }
        let params: Params = parse_params(params)?;
        let options = ApplyOptions {
            atomic: params.atomic.unwrap_or(true),
            dry_run: params.dry_run.unwrap_or(false),
        };
        let result = self
            .gateway
            .apply_edit(&params.workspace, &params.edit, options)
            .await
            .map_err(to_rpc_error)?;

        let changes: Vec<Value> = result
            .changes
            .iter()
            .map(|c| json!({ "uri": c.uri, "editsApplied": c.edits_applied, "preview": c.preview }))
            .collect();
        Ok(json!({
            "success": result.success,
            "transactionId": result.transaction_id,
            "filesModified": result.files_modified,
            "totalChanges": result.total_changes,
            "changes": changes,
            "rollbackPerformed": result.rollback_performed,
            "rollbackIncomplete": result.rollback_incomplete,
        }))
    }

    async fn execute_command(&self, params: Value) -> Result<Value, RpcError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            workspace: PathBuf,
            #[serde(default)]
            language: Option<String>,
            command: String,
            #[serde(default)]
            arguments: Vec<Value>,
        }
        let params: Params = parse_params(params)?;
        let value = self
            .gateway
            .execute_command(&params.workspace, params.language.as_deref(), &params.command, params.arguments)
            .await
            .map_err(to_rpc_error)?;
        Ok(value)
    }

    fn health(&self) -> Value {
        let records: Vec<Value> = self
            .gateway
            .pool()
            .get_health()
            .into_iter()
            .map(|((language, workspace), record)| {
                json!({
                    "language": language,
                    "workspace": workspace,
                    "status": format!("{:?}", record.status),
                    "crashCount": record.crash_count,
                    "lastError": record.last_error,
                })
            })
            .collect();
        json!({ "entries": records })
    }
}

#[derive(Deserialize)]
struct PositionDto {
    line: u32,
    character: u32,
}

impl From<PositionDto> for Position {
    fn from(dto: PositionDto) -> Self {
        Position {
            line: dto.line,
            character: dto.character,
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|err| invalid_params(err.to_string()))
}

fn invalid_params(message: impl Into<String>) -> RpcError {
    RpcError {
        code: ErrorCode::InvalidParams,
        message: message.into(),
        data: None,
    }
}

/// Maps the gateway's error taxonomy onto a JSON-RPC error envelope: standard
/// codes where JSON-RPC 2.0 defines one (invalid params), an
/// application-range `ServerError` with a `kind` tag otherwise so a caller
/// can match on the gateway-specific taxonomy without parsing messages.
fn to_rpc_error(err: GatewayError) -> RpcError {
    let kind = match &err {
        GatewayError::InvalidParams(_) => {
            return invalid_params(err.to_string());
        }
        GatewayError::NoServer => "NoServerError",
        GatewayError::RenameRejected => "RenameRejectedError",
        GatewayError::Pool(gateway_pool::PoolError::Exhausted { .. }) => "PoolExhaustedError",
        GatewayError::Pool(_) => "ConnectionError",
        GatewayError::Lsp(gateway_lsp::Error::ServerCrash { .. }) => "ServerCrashError",
        GatewayError::Lsp(gateway_lsp::Error::Registry(gateway_jsonrpc::RegistryError::Timeout {
            ..
        })) => "TimeoutError",
        GatewayError::Lsp(gateway_lsp::Error::Registry(gateway_jsonrpc::RegistryError::Remote {
            ..
        })) => "JsonRpcError",
        GatewayError::Lsp(gateway_lsp::Error::JsonRpc(_)) => "JsonRpcError",
        GatewayError::Lsp(gateway_lsp::Error::Parse(_)) => "ProtocolError",
        GatewayError::Lsp(_) => "ConnectionError",
        GatewayError::Edit(gateway_edit::Error::InvalidEdit(_)) => "InvalidEditError",
        GatewayError::Edit(gateway_edit::Error::PathEscape(_)) => "InvalidEditError",
        GatewayError::Edit(gateway_edit::Error::Rollback { .. }) => "RollbackError",
        GatewayError::Edit(_) => "InvalidEditError",
        GatewayError::MalformedResponse(_) => "ProtocolError",
        GatewayError::Uri(_) => "InvalidParamsError",
        GatewayError::Io(_) => "InternalError",
    };
    RpcError {
        code: ErrorCode::ServerError(-32000),
        message: err.to_string(),
        data: Some(json!({ "kind": kind })),
    }
}

/// Reads framed `MethodCall`s off stdin and writes framed `Success`/
/// `Failure` responses to stdout, one request processed at a time, until
/// stdin hits clean EOF.
pub async fn serve_stdio(gateway: Arc<Gateway>) -> anyhow::Result<()> {
    let router = Router::new(gateway);
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut writer = BufWriter::new(stdout);
    let mut line_buf = String::new();

    loop {
        let payload = match framing::read_frame(&mut reader, &mut line_buf).await {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(err) => {
                log::warn!("malformed request frame: {err}");
                continue;
            }
        };

        let call: MethodCall = match serde_json::from_slice(&payload) {
            Ok(call) => call,
            Err(err) => {
                log::warn!("dropping unparseable request: {err}");
                continue;
            }
        };

        let result = router.dispatch(&call.method, call.params.clone().into()).await;
        let response = match result {
            Ok(value) => serde_json::to_vec(&Success {
                jsonrpc: Some(Version::V2),
                result: value,
                id: call.id,
            })?,
            Err(error) => serde_json::to_vec(&Failure {
                jsonrpc: Some(Version::V2),
                error,
                id: call.id,
            })?,
        };

        if let Err(err) = framing::write_frame(&mut writer, &response).await {
            log::error!("failed to write response frame: {err}");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_dto_converts_fields_verbatim() {
        let position: Position = PositionDto { line: 3, character: 7 }.into();
        assert_eq!(position, Position::new(3, 7));
    }

    #[test]
    fn invalid_kind_is_reported_as_invalid_params() {
        let err = invalid_params("bad kind");
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }
}
