//! The per-process LSP client state machine (C3).
//!
//! Grounded in `helix_lsp::Client`/`Transport::start` (`helix-lsp/src/{client,transport}.rs`):
//! a background task reads framed messages off the child's stdout and feeds
//! them to the registry, a second drains an outgoing channel onto stdin, a
//! third forwards stderr lines to the logger. This implementation folds
//! those three `tokio::spawn` loops into the same shape but adds the state
//! machine, startup deadline, and crash classification that an editor
//! embedding `helix_lsp::Client` instead leaves to its own
//! `Application::handle_language_server_message` loop
//! (`helix-term/src/application.rs`), which is out of scope here.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gateway_jsonrpc::jsonrpc::Params;
use gateway_jsonrpc::registry::RoutedEvent;
use gateway_jsonrpc::{framing, DiagnosticStore, Registry, RegistryError};
use lsp_types::ServerCapabilities;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::time::Instant;

use crate::process::ProcessHandle;
use crate::{Error, Result};

/// Immutable description of how to launch one backend.
#[derive(Debug, Clone)]
pub struct LanguageServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub environment: Vec<(String, String)>,
    pub initialization_options: Option<Value>,
    /// Per-call request timeout override, surfaced as `requestTimeout`.
    pub request_timeout: Duration,
}

/// Tunables that govern one client's lifecycle, not its requests.
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    pub start: Duration,
    pub shutdown: Duration,
    pub kill_grace: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        ClientTimeouts {
            start: Duration::from_secs(30),
            shutdown: Duration::from_secs(5),
            kill_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    New,
    Starting,
    Initializing,
    Initialized,
    Stopping,
    Crashed,
    Stopped,
}

/// Events a `Client` pushes upward to its owner (the pool); breaks the
/// pool<->client reference cycle at shutdown: the client only holds a
/// channel sender, dropped on dispose.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Stderr(String),
    Crash { exit_code: Option<i32>, signal: Option<i32> },
    Exited,
}

pub struct Client {
    language: String,
    workspace: PathBuf,
    registry: Arc<Registry>,
    diagnostics: Arc<DiagnosticStore>,
    capabilities: OnceCell<ServerCapabilities>,
    state: RwLock<ClientState>,
    initialized_at: Mutex<Option<Instant>>,
    opened: Mutex<HashSet<String>>,
    timeouts: ClientTimeouts,
    request_timeout: Duration,
    unhandled: Mutex<Option<mpsc::UnboundedReceiver<RoutedEvent>>>,
    stop_signal: Mutex<Option<oneshot::Sender<()>>>,
    /// Exit code/signal from the most recent crash; set by `on_exit` before
    /// `state` flips to `Crashed`, so a racing in-flight `call` can recover
    /// the real numbers even if it lost its own response to a timeout.
    crash_info: Mutex<Option<(Option<i32>, Option<i32>)>>,
}

impl Client {
    /// Spawns the child, wires the transport and registry, and drives the
    /// `initialize`/`initialized` handshake. Returns before the overall
    /// `timeouts.start` deadline or fails with
    /// [`Error::Connection`]; a child that exits mid-handshake instead fails
    /// with [`Error::ServerCrash`].
    pub async fn start(
        language: String,
        workspace: PathBuf,
        config: LanguageServerConfig,
        timeouts: ClientTimeouts,
    ) -> Result<(Arc<Client>, mpsc::UnboundedReceiver<ClientEvent>)> {
        let start_fut = Self::start_inner(language, workspace, config, timeouts);
        match tokio::time::timeout(timeouts.start, start_fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Connection("startup timed out".to_string())),
        }
    }

    async fn start_inner(
        language: String,
        workspace: PathBuf,
        config: LanguageServerConfig,
        timeouts: ClientTimeouts,
    ) -> Result<(Arc<Client>, mpsc::UnboundedReceiver<ClientEvent>)> {
        let mut process = ProcessHandle::spawn(
            &config.command,
            &config.args,
            config.environment.iter().map(|(k, v)| (k.clone(), v.clone())),
            &workspace,
        )?;

        let (stdout, stdin, stderr) = process.take_stdio();

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (unhandled_tx, unhandled_rx) = mpsc::unbounded_channel();
        let diagnostics = Arc::new(DiagnosticStore::new());
        let registry = Arc::new(Registry::new(outgoing_tx, diagnostics.clone(), unhandled_tx));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // writer task: drains the registry's outgoing queue onto stdin
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(payload) = outgoing_rx.recv().await {
                if framing::write_frame(&mut stdin, &payload).await.is_err() {
                    break;
                }
            }
        });

        // reader task: frames stdout and hands raw payloads to the registry
        {
            let registry = registry.clone();
            tokio::spawn(async move {
                let mut stdout = stdout;
                let mut line_buf = String::new();
                loop {
                    match framing::read_frame(&mut stdout, &mut line_buf).await {
                        Ok(Some(payload)) => registry.on_incoming(&payload),
                        Ok(None) => break,
                        Err(err) => {
                            log::warn!("framing error reading server message: {err}");
                            break;
                        }
                    }
                }
            });
        }

        // stderr task: forwarded to the logger, never interpreted as protocol
        {
            let event_tx = event_tx.clone();
            tokio::spawn(async move {
                use tokio::io::AsyncBufReadExt;
                let mut stderr = stderr;
                let mut line = String::new();
                loop {
                    line.clear();
                    match stderr.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let trimmed = line.trim_end().to_string();
                            if !trimmed.is_empty() {
                                log::warn!("[stderr] {trimmed}");
                                let _ = event_tx.send(ClientEvent::Stderr(trimmed));
                            }
                        }
                    }
                }
            });
        }

        let (stop_tx, stop_rx) = oneshot::channel();

        let client = Arc::new(Client {
            language,
            workspace: workspace.clone(),
            registry,
            diagnostics,
            capabilities: OnceCell::new(),
            state: RwLock::new(ClientState::Starting),
            initialized_at: Mutex::new(None),
            opened: Mutex::new(HashSet::new()),
            timeouts,
            request_timeout: config.request_timeout,
            unhandled: Mutex::new(Some(unhandled_rx)),
            stop_signal: Mutex::new(Some(stop_tx)),
            crash_info: Mutex::new(None),
        });

        // Exit-watcher: the single owner of `process` for its whole life.
        // Races the child exiting on its own against a graceful-stop signal
        // from `Client::stop`, so only one task ever calls `wait`/`terminate`.
        {
            let client = client.clone();
            let event_tx = event_tx.clone();
            let kill_grace = timeouts.kill_grace;
            tokio::spawn(async move {
                tokio::select! {
                    status = process.wait() => {
                        client.on_exit(status, &event_tx, false);
                    }
                    _ = stop_rx => {
                        let status = process.terminate(kill_grace).await;
                        client.on_exit(Ok(status), &event_tx, true);
                    }
                }
            });
        }

        *client.state.write() = ClientState::Initializing;

        let root_uri = gateway_stdx::uri::file_path_to_uri(&workspace).ok();
        let params = lsp_types::InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: root_uri.clone(),
            #[allow(deprecated)]
            root_path: workspace.to_str().map(|s| s.to_string()),
            initialization_options: config.initialization_options.clone(),
            capabilities: crate::capabilities::declared_capabilities(false),
            workspace_folders: root_uri.map(|uri| {
                vec![lsp_types::WorkspaceFolder {
                    name: workspace
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    uri,
                }]
            }),
            client_info: Some(lsp_types::ClientInfo {
                name: "lsp-gateway".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        };

        let result = client
            .registry
            .call("initialize", to_params(&params)?, timeouts.start)
            .await;

        let result = match result {
            Ok(value) => value,
            Err(err) => {
                if *client.state.read() != ClientState::Crashed {
                    *client.state.write() = ClientState::Crashed;
                }
                return Err(err.into());
            }
        };

        let capabilities: ServerCapabilities = serde_json::from_value(result)?;
        let _ = client.capabilities.set(capabilities);

        client
            .registry
            .notify("initialized", Params::Map(Default::default()))?;

        *client.state.write() = ClientState::Initialized;
        *client.initialized_at.lock() = Some(Instant::now());

        Ok((client, event_rx))
    }

    fn on_exit(
        &self,
        status: std::io::Result<crate::process::ExitStatus>,
        event_tx: &mpsc::UnboundedSender<ClientEvent>,
        was_graceful_stop: bool,
    ) {
        match status {
            Ok(status) if was_graceful_stop || status.is_clean_or_expected_sigterm() => {
                self.registry.cancel_all(RegistryError::TransportClosed(
                    "server process exited".to_string(),
                ));
                *self.state.write() = ClientState::Stopped;
                let _ = event_tx.send(ClientEvent::Exited);
            }
            Ok(status) => {
                self.registry.cancel_all(RegistryError::ServerCrashed {
                    exit_code: status.code,
                    signal: status.signal,
                });
                *self.state.write() = ClientState::Crashed;
                log::error!(
                    "language server '{}' crashed: exit_code={:?} signal={:?}",
                    self.language,
                    status.code,
                    status.signal
                );
                let _ = event_tx.send(ClientEvent::Crash {
                    exit_code: status.code,
                    signal: status.signal,
                });
            }
            Err(err) => {
                self.registry.cancel_all(RegistryError::ServerCrashed {
                    exit_code: None,
                    signal: None,
                });
                *self.state.write() = ClientState::Crashed;
                log::error!("failed to wait on language server '{}': {err}", self.language);
                let _ = event_tx.send(ClientEvent::Crash {
                    exit_code: None,
                    signal: None,
                });
            }
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Initialized
    }

    pub fn capabilities(&self) -> Option<&ServerCapabilities> {
        self.capabilities.get()
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.initialized_at.lock().map(|start| start.elapsed())
    }

    pub fn get_diagnostics(&self, uri: &str) -> Vec<lsp_types::Diagnostic> {
        self.diagnostics.get(uri)
    }

    pub fn get_all_diagnostics(&self) -> std::collections::HashMap<String, Vec<lsp_types::Diagnostic>> {
        self.diagnostics.get_all()
    }

    /// Number of requests awaiting a reply; used by idle eviction to avoid
    /// disposing a client with in-flight work.
    pub fn pending_request_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Pulls the next server-initiated notification or method call this
    /// client hasn't already special-cased. Returns `None` once the
    /// underlying channel has closed (client disposed).
    pub async fn next_unhandled(&self) -> Option<RoutedEvent> {
        // Held only for the duration of a single recv; no other caller polls
        // this concurrently in the gateway (one dispatcher task per client).
        let rx = self.unhandled.lock().take();
        match rx {
            Some(mut rx) => {
                let event = rx.recv().await;
                *self.unhandled.lock() = Some(rx);
                event
            }
            None => None,
        }
    }

    /// Answers a server-initiated `MethodCall` this client has no real
    /// handler for, so a server blocked awaiting the reply isn't left
    /// hanging. `workspace/configuration` gets an empty array (one entry per
    /// requested item would be more correct, but an empty list is what a
    /// server asking for configuration this gateway doesn't track should
    /// see), `client/registerCapability` and
    /// `window/workDoneProgress/create` both specify a `null` result on
    /// success, anything else gets `MethodNotFound` rather than a
    /// fabricated success.
    pub fn reply_default(&self, call: &gateway_jsonrpc::jsonrpc::MethodCall) {
        let result = match call.method.as_str() {
            "workspace/configuration" => Ok(Value::Array(Vec::new())),
            "client/registerCapability" | "window/workDoneProgress/create" => Ok(Value::Null),
            other => {
                log::debug!(
                    "language server '{}' sent unsupported request '{other}', replying with MethodNotFound",
                    self.language
                );
                Err(gateway_jsonrpc::jsonrpc::Error::method_not_found())
            }
        };
        if let Err(err) = self.registry.reply(call.id.clone(), result) {
            log::warn!(
                "failed to reply to language server '{}' request '{}': {err}",
                self.language,
                call.method
            );
        }
    }

    /// Surfaces a notification this client doesn't special-case on its own
    /// (everything but `textDocument/publishDiagnostics`, which the registry
    /// already folds into [`Client::get_diagnostics`]) through the `log`
    /// facade so an operator watching `RUST_LOG` sees it.
    pub fn log_notification(&self, notification: &gateway_jsonrpc::jsonrpc::Notification) {
        let params: Value = notification.params.clone().into();
        match notification.method.as_str() {
            "window/showMessage" => {
                log::warn!("'{}' window/showMessage: {params:?}", self.language)
            }
            "window/logMessage" => {
                log::info!("'{}' window/logMessage: {params:?}", self.language)
            }
            other => log::debug!(
                "dropping unhandled notification '{other}' from '{}'",
                self.language
            ),
        }
    }

    /// Sends a typed request with the client's configured default timeout.
    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
        self.send_request_with_deadline(method, params, self.request_timeout).await
    }

    pub async fn send_request_with_deadline(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::Disposed);
        }
        Ok(self.registry.call(method, Params::from(params), deadline).await?)
    }

    pub fn send_notification(&self, method: &str, params: Value) -> Result<()> {
        Ok(self.registry.notify(method, Params::from(params))?)
    }

    /// `$/ping`: not part of the LSP protocol. Any JSON-RPC-level reply —
    /// success or a "method not found" error — counts as alive; only a
    /// transport-level failure (timeout, disposed, closed channel) counts
    /// as dead.
    pub async fn ping(&self, deadline: Duration) -> bool {
        match self.registry.call("$/ping", Params::None, deadline).await {
            Ok(_) => true,
            Err(RegistryError::Remote { .. }) => true,
            Err(_) => false,
        }
    }

    /// Ensures `textDocument/didOpen` has been sent for `uri` before a
    /// semantic request that requires it. Idempotent per client lifetime.
    pub fn ensure_opened(&self, uri: &str, language_id: &str, text: &str) -> Result<()> {
        let mut opened = self.opened.lock();
        if opened.contains(uri) {
            return Ok(());
        }
        let params = lsp_types::DidOpenTextDocumentParams {
            text_document: lsp_types::TextDocumentItem {
                uri: uri
                    .parse()
                    .map_err(|_| Error::Other(anyhow::anyhow!("invalid document URI: {uri}")))?,
                language_id: language_id.to_string(),
                version: 1,
                text: text.to_string(),
            },
        };
        self.send_notification("textDocument/didOpen", serde_json::to_value(params)?)?;
        opened.insert(uri.to_string());
        Ok(())
    }

    /// Graceful stop: `shutdown` (5s budget), `exit`, then hands off to the
    /// exit-watcher task's SIGTERM/SIGKILL grace sequence.
    /// Idempotent — a second call on an already-stopped client is a no-op.
    pub async fn stop(&self) {
        if matches!(self.state(), ClientState::Stopped | ClientState::Stopping) {
            return;
        }
        *self.state.write() = ClientState::Stopping;

        let _ = tokio::time::timeout(
            self.timeouts.shutdown,
            self.registry.call("shutdown", Params::None, self.timeouts.shutdown),
        )
        .await;
        let _ = self.registry.notify("exit", Params::None);

        self.registry.cancel_all(RegistryError::Disposed);
        self.diagnostics.clear();

        if let Some(signal) = self.stop_signal.lock().take() {
            let _ = signal.send(());
        }

        // Wait for the exit-watcher to actually observe termination so
        // `disposeAll` can block until every client has reached `stopped`.
        let deadline = Instant::now() + self.timeouts.kill_grace * 2;
        while Instant::now() < deadline {
            if matches!(self.state(), ClientState::Stopped | ClientState::Crashed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn to_params<T: Serialize>(value: &T) -> Result<Params> {
    Ok(Params::from(serde_json::to_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_deadline_on_a_fresh_registry_times_out_without_panicking() {
        let (outgoing_tx, _rx) = mpsc::unbounded_channel();
        let (unhandled_tx, _unhandled_rx) = mpsc::unbounded_channel();
        let diagnostics = Arc::new(DiagnosticStore::new());
        let registry = Arc::new(Registry::new(outgoing_tx, diagnostics, unhandled_tx));
        let result = registry.call("$/ping", Params::None, Duration::ZERO).await;
        assert!(result.is_err());
    }

    fn bare_client(outgoing_tx: mpsc::UnboundedSender<Vec<u8>>) -> Client {
        let (unhandled_tx, unhandled_rx) = mpsc::unbounded_channel();
        let diagnostics = Arc::new(DiagnosticStore::new());
        let registry = Arc::new(Registry::new(outgoing_tx, diagnostics.clone(), unhandled_tx));
        Client {
            language: "rust".to_string(),
            workspace: PathBuf::from("/tmp/workspace"),
            registry,
            diagnostics,
            capabilities: OnceCell::new(),
            state: RwLock::new(ClientState::Initialized),
            initialized_at: Mutex::new(None),
            opened: Mutex::new(HashSet::new()),
            timeouts: ClientTimeouts::default(),
            request_timeout: Duration::from_secs(5),
            unhandled: Mutex::new(Some(unhandled_rx)),
            stop_signal: Mutex::new(None),
            crash_info: Mutex::new(None),
        }
    }

    fn call(method: &str) -> gateway_jsonrpc::jsonrpc::MethodCall {
        gateway_jsonrpc::jsonrpc::MethodCall {
            jsonrpc: None,
            method: method.to_string(),
            params: Params::None,
            id: gateway_jsonrpc::jsonrpc::Id::Num(1),
        }
    }

    #[tokio::test]
    async fn reply_default_answers_workspace_configuration_with_an_empty_array() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = bare_client(tx);
        client.reply_default(&call("workspace/configuration"));
        let sent = rx.recv().await.unwrap();
        let output: gateway_jsonrpc::jsonrpc::Output = serde_json::from_slice(&sent).unwrap();
        assert_eq!(output.id(), &gateway_jsonrpc::jsonrpc::Id::Num(1));
        assert!(matches!(
            output,
            gateway_jsonrpc::jsonrpc::Output::Success(s) if s.result == Value::Array(Vec::new())
        ));
    }

    #[tokio::test]
    async fn reply_default_answers_register_capability_with_null() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = bare_client(tx);
        client.reply_default(&call("client/registerCapability"));
        let sent = rx.recv().await.unwrap();
        let output: gateway_jsonrpc::jsonrpc::Output = serde_json::from_slice(&sent).unwrap();
        assert!(matches!(
            output,
            gateway_jsonrpc::jsonrpc::Output::Success(s) if s.result == Value::Null
        ));
    }

    #[test]
    fn log_notification_does_not_panic_on_any_known_or_unknown_method() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = bare_client(tx);
        for method in ["window/showMessage", "window/logMessage", "$/cancelRequest"] {
            client.log_notification(&gateway_jsonrpc::jsonrpc::Notification {
                jsonrpc: None,
                method: method.to_string(),
                params: Params::None,
            });
        }
    }

    #[tokio::test]
    async fn reply_default_answers_unknown_methods_with_method_not_found() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = bare_client(tx);
        client.reply_default(&call("workspace/applyEdit"));
        let sent = rx.recv().await.unwrap();
        let output: gateway_jsonrpc::jsonrpc::Output = serde_json::from_slice(&sent).unwrap();
        assert!(matches!(
            output,
            gateway_jsonrpc::jsonrpc::Output::Failure(f) if f.error.code.is_method_not_found()
        ));
    }
}
