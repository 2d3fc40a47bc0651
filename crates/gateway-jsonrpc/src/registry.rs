//! Request/response correlation, deadlines and notification routing (C2).
//!
//! Grounded in the callback-table pattern of `helix-lsp::Client::call`/
//! `Client::handle_response` (the `Arc<Mutex<HashMap<jsonrpc::Id, Callback>>>`
//! kept on `Client`), generalized here into its own type so it can be unit
//! tested without spawning a real child process, with explicit deadline and
//! cancellation handling a headless gateway needs and an editor's own event
//! loop does not.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::jsonrpc::{
    Call, Error as RpcError, Failure, Id, MethodCall, Notification, Output, Params,
    ServerMessage, Success, Version,
};
use lsp_types::PublishDiagnosticsParams;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("request {method:?} timed out after {elapsed:?}")]
    Timeout { method: String, elapsed: Duration },
    #[error("server returned an error for {method:?}: {source}")]
    Remote { method: String, source: RpcError },
    #[error("transport closed: {0}")]
    TransportClosed(String),
    #[error("language server crashed: exit_code={exit_code:?} signal={signal:?}")]
    ServerCrashed {
        exit_code: Option<i32>,
        signal: Option<i32>,
    },
    #[error("client disposed")]
    Disposed,
    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write to transport")]
    WriteFailed,
}

/// Per-document-URI diagnostic lists last pushed by the server.
///
/// Owned by [`gateway_lsp::Client`](../../gateway_lsp/struct.Client.html) and
/// shared with the [`Registry`] so the notification router can update it
/// directly on `textDocument/publishDiagnostics`.
#[derive(Debug, Default)]
pub struct DiagnosticStore {
    by_uri: Mutex<HashMap<String, Vec<lsp_types::Diagnostic>>>,
}

impl DiagnosticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Vec<lsp_types::Diagnostic> {
        self.by_uri.lock().get(uri).cloned().unwrap_or_default()
    }

    pub fn get_all(&self) -> HashMap<String, Vec<lsp_types::Diagnostic>> {
        self.by_uri.lock().clone()
    }

    /// Overwrites (never merges) the entry for `uri`.
    fn replace(&self, uri: String, diagnostics: Vec<lsp_types::Diagnostic>) {
        self.by_uri.lock().insert(uri, diagnostics);
    }

    pub fn clear(&self) {
        self.by_uri.lock().clear();
    }
}

struct PendingRequest {
    method: String,
    started: Instant,
    responder: oneshot::Sender<Result<Value, RegistryError>>,
}

/// Anything the registry cannot route itself — a server-originated
/// `MethodCall`, or a `Notification` other than the one it hardcodes
/// (`textDocument/publishDiagnostics`) — is handed up here for the owning
/// client to decide what, if anything, to do with it.
pub enum RoutedEvent {
    Notification(Notification),
    MethodCall(MethodCall),
}

/// Owns id assignment, the in-flight request table, and notification
/// dispatch for one client connection.
pub struct Registry {
    next_id: AtomicU64,
    pending: Mutex<HashMap<Id, PendingRequest>>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    diagnostics: Arc<DiagnosticStore>,
    unhandled: mpsc::UnboundedSender<RoutedEvent>,
}

impl Registry {
    /// `outgoing` is the raw-bytes sink feeding C1's writer half; `unhandled`
    /// receives every routed event the registry doesn't special-case itself.
    pub fn new(
        outgoing: mpsc::UnboundedSender<Vec<u8>>,
        diagnostics: Arc<DiagnosticStore>,
        unhandled: mpsc::UnboundedSender<RoutedEvent>,
    ) -> Self {
        Registry {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outgoing,
            diagnostics,
            unhandled,
        }
    }

    fn next_id(&self) -> Id {
        Id::Num(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Sends `method`/`params` as a request and awaits its response, failing
    /// with [`RegistryError::Timeout`] if `deadline` elapses first. A
    /// deadline of zero is treated as 1ms, per spec.
    pub async fn call(
        &self,
        method: &str,
        params: Params,
        deadline: Duration,
    ) -> Result<Value, RegistryError> {
        let deadline = if deadline.is_zero() {
            Duration::from_millis(1)
        } else {
            deadline
        };

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id.clone(),
            PendingRequest {
                method: method.to_string(),
                started: Instant::now(),
                responder: tx,
            },
        );

        let request = crate::jsonrpc::MethodCall {
            jsonrpc: Some(Version::V2),
            method: method.to_string(),
            params,
            id: id.clone(),
        };
        let bytes = serde_json::to_vec(&request)?;
        if self.outgoing.send(bytes).is_err() {
            self.pending.lock().remove(&id);
            return Err(RegistryError::WriteFailed);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RegistryError::TransportClosed(method.to_string())),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(RegistryError::Timeout {
                    method: method.to_string(),
                    elapsed: deadline,
                })
            }
        }
    }

    /// Sends a one-way notification; no registry entry, no response.
    pub fn notify(&self, method: &str, params: Params) -> Result<(), RegistryError> {
        let notification = Notification {
            jsonrpc: Some(Version::V2),
            method: method.to_string(),
            params,
        };
        let bytes = serde_json::to_vec(&notification)?;
        self.outgoing
            .send(bytes)
            .map_err(|_| RegistryError::WriteFailed)
    }

    /// Feeds one freshly-parsed incoming payload through the registry.
    pub fn on_incoming(&self, raw: &[u8]) {
        let message: ServerMessage = match serde_json::from_slice(raw) {
            Ok(m) => m,
            Err(err) => {
                warn!("dropping unparseable server message: {err}");
                return;
            }
        };

        match message {
            ServerMessage::Output(output) => self.resolve(output),
            ServerMessage::Call(Call::Notification(notification)) => {
                self.route_notification(notification)
            }
            ServerMessage::Call(Call::MethodCall(call)) => {
                let _ = self.unhandled.send(RoutedEvent::MethodCall(call));
            }
        }
    }

    fn resolve(&self, output: Output) {
        let id = output.id().clone();
        let Some(pending) = self.pending.lock().remove(&id) else {
            warn!("dropping response for unknown or already-resolved id {id:?}");
            return;
        };
        let result: Result<Value, RpcError> = output.into();
        let result = result.map_err(|err| RegistryError::Remote {
            method: pending.method.clone(),
            source: err,
        });
        let _ = pending.responder.send(result);
    }

    fn route_notification(&self, notification: Notification) {
        if notification.method == "textDocument/publishDiagnostics" {
            let value: Value = notification.params.clone().into();
            match serde_json::from_value::<PublishDiagnosticsParams>(value) {
                Ok(params) => self
                    .diagnostics
                    .replace(params.uri.to_string(), params.diagnostics),
                Err(err) => warn!("malformed publishDiagnostics params: {err}"),
            }
            return;
        }
        let _ = self.unhandled.send(RoutedEvent::Notification(notification));
    }

    /// Answers a server-initiated `MethodCall` directly, bypassing the
    /// pending table entirely since this id was never ours to assign. Used
    /// to send a conservative default reply so a server blocked awaiting an
    /// answer to its own request isn't left hanging.
    pub fn reply(&self, id: Id, result: Result<Value, RpcError>) -> Result<(), RegistryError> {
        let output = match result {
            Ok(result) => Output::Success(Success {
                jsonrpc: Some(Version::V2),
                result,
                id,
            }),
            Err(error) => Output::Failure(Failure {
                jsonrpc: Some(Version::V2),
                error,
                id,
            }),
        };
        let bytes = serde_json::to_vec(&output)?;
        self.outgoing
            .send(bytes)
            .map_err(|_| RegistryError::WriteFailed)
    }

    /// Fails every in-flight request with `reason`; used on transport close
    /// and client disposal.
    pub fn cancel_all(&self, reason: RegistryError) {
        let mut pending = self.pending.lock();
        for (_, entry) in pending.drain() {
            let reason = match &reason {
                RegistryError::Disposed => RegistryError::Disposed,
                RegistryError::TransportClosed(m) => RegistryError::TransportClosed(m.clone()),
                RegistryError::ServerCrashed { exit_code, signal } => RegistryError::ServerCrashed {
                    exit_code: *exit_code,
                    signal: *signal,
                },
                other => RegistryError::TransportClosed(other.to_string()),
            };
            let _ = entry.responder.send(Err(reason));
        }
    }

    /// Number of requests currently awaiting a response; exposed for tests
    /// and health diagnostics.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> (
        Arc<Registry>,
        mpsc::UnboundedReceiver<Vec<u8>>,
        mpsc::UnboundedReceiver<RoutedEvent>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (unhandled_tx, unhandled_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Registry::new(out_tx, Arc::new(DiagnosticStore::new()), unhandled_tx));
        (registry, out_rx, unhandled_rx)
    }

    #[tokio::test]
    async fn call_resolves_on_matching_response() {
        let (registry, mut out_rx, _unhandled) = registry();
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .call("foo", Params::None, Duration::from_secs(5))
                    .await
            })
        };

        let sent = out_rx.recv().await.unwrap();
        let parsed: MethodCall = serde_json::from_slice(&sent).unwrap();
        assert_eq!(parsed.method, "foo");

        registry.on_incoming(
            json!({"jsonrpc": "2.0", "result": {"ok": true}, "id": parsed.id})
                .to_string()
                .as_bytes(),
        );

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result, json!({"ok": true}));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn call_times_out_and_a_late_response_is_dropped() {
        let (registry, mut out_rx, _unhandled) = registry();
        let result = registry
            .call("slow", Params::None, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(RegistryError::Timeout { .. })));
        assert_eq!(registry.pending_count(), 0);

        let sent = out_rx.recv().await.unwrap();
        let parsed: MethodCall = serde_json::from_slice(&sent).unwrap();
        // the late response arrives after the timeout already fired; it must
        // be dropped silently rather than panic or resurrect the request.
        registry.on_incoming(
            json!({"jsonrpc": "2.0", "result": null, "id": parsed.id})
                .to_string()
                .as_bytes(),
        );
    }

    #[tokio::test]
    async fn zero_deadline_is_treated_as_one_millisecond() {
        let (registry, _out_rx, _unhandled) = registry();
        let result = registry.call("foo", Params::None, Duration::ZERO).await;
        assert!(matches!(result, Err(RegistryError::Timeout { .. })));
    }

    #[tokio::test]
    async fn remote_error_response_resolves_as_remote_error() {
        let (registry, mut out_rx, _unhandled) = registry();
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .call("foo", Params::None, Duration::from_secs(5))
                    .await
            })
        };
        let sent = out_rx.recv().await.unwrap();
        let parsed: MethodCall = serde_json::from_slice(&sent).unwrap();
        registry.on_incoming(
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32601, "message": "method not found"},
                "id": parsed.id,
            })
            .to_string()
            .as_bytes(),
        );
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(RegistryError::Remote { .. })));
    }

    #[tokio::test]
    async fn publish_diagnostics_replaces_not_merges() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (unhandled_tx, mut unhandled_rx) = mpsc::unbounded_channel();
        let diagnostics = Arc::new(DiagnosticStore::new());
        let registry = Registry::new(out_tx, diagnostics.clone(), unhandled_tx);

        let push = |diags: Value| {
            json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": {"uri": "file:///a.ts", "diagnostics": diags},
            })
            .to_string()
        };

        registry.on_incoming(
            push(json!([{
                "range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 3}},
                "message": "x",
                "severity": 1,
            }]))
            .as_bytes(),
        );
        assert_eq!(diagnostics.get("file:///a.ts").len(), 1);

        registry.on_incoming(push(json!([])).as_bytes());
        assert!(diagnostics.get("file:///a.ts").is_empty());
        assert!(unhandled_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_notifications_are_routed_to_unhandled() {
        let (registry, _out_rx, mut unhandled_rx) = registry();
        registry.on_incoming(
            json!({"jsonrpc": "2.0", "method": "window/logMessage", "params": {"type": 3, "message": "hi"}})
                .to_string()
                .as_bytes(),
        );
        match unhandled_rx.try_recv().unwrap() {
            RoutedEvent::Notification(n) => assert_eq!(n.method, "window/logMessage"),
            RoutedEvent::MethodCall(_) => panic!("expected a notification"),
        }
    }

    #[tokio::test]
    async fn server_initiated_calls_are_routed_to_unhandled() {
        let (registry, _out_rx, mut unhandled_rx) = registry();
        registry.on_incoming(
            json!({"jsonrpc": "2.0", "method": "workspace/configuration", "params": {}, "id": 7})
                .to_string()
                .as_bytes(),
        );
        match unhandled_rx.try_recv().unwrap() {
            RoutedEvent::MethodCall(c) => assert_eq!(c.method, "workspace/configuration"),
            RoutedEvent::Notification(_) => panic!("expected a method call"),
        }
    }

    #[tokio::test]
    async fn reply_sends_a_success_output_for_the_given_id() {
        let (registry, mut out_rx, _unhandled) = registry();
        registry.reply(Id::Num(7), Ok(json!([]))).unwrap();
        let sent = out_rx.recv().await.unwrap();
        let output: Output = serde_json::from_slice(&sent).unwrap();
        assert_eq!(output, Output::Success(Success {
            jsonrpc: Some(Version::V2),
            result: json!([]),
            id: Id::Num(7),
        }));
    }

    #[tokio::test]
    async fn reply_sends_a_failure_output_for_the_given_id() {
        let (registry, mut out_rx, _unhandled) = registry();
        registry
            .reply(Id::Num(9), Err(RpcError::method_not_found()))
            .unwrap();
        let sent = out_rx.recv().await.unwrap();
        let output: Output = serde_json::from_slice(&sent).unwrap();
        assert_eq!(output, Output::Failure(Failure {
            jsonrpc: Some(Version::V2),
            error: RpcError::method_not_found(),
            id: Id::Num(9),
        }));
    }

    #[tokio::test]
    async fn cancel_all_fails_every_pending_request() {
        let (registry, mut out_rx, _unhandled) = registry();
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .call("foo", Params::None, Duration::from_secs(30))
                    .await
            })
        };
        let _ = out_rx.recv().await.unwrap();
        registry.cancel_all(RegistryError::Disposed);
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(RegistryError::Disposed)));
    }

    #[tokio::test]
    async fn response_for_unknown_id_is_dropped_without_panic() {
        let (registry, _out_rx, _unhandled) = registry();
        registry.on_incoming(
            json!({"jsonrpc": "2.0", "result": null, "id": 999})
                .to_string()
                .as_bytes(),
        );
        assert_eq!(registry.pending_count(), 0);
    }
}
