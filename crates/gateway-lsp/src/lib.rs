//! Owns one child language-server process: the LSP handshake, typed
//! request/notification surface, diagnostics, and crash detection (C3).
//!
//! Grounded in `helix_lsp::Client`'s `Transport` split: a `Client` here owns
//! a [`process::ProcessHandle`] and a `gateway_jsonrpc::Registry` the same
//! way `helix_lsp::Client` owns a `Child` and a `Transport`. This client is
//! not shared behind an `Arc` with a document-buffer-aware caller; it is a
//! pooled resource whose only consumers are the outer tool surface and the
//! connection pool's health loop.

pub mod capabilities;
pub mod client;
pub mod process;

pub use client::{Client, ClientEvent, ClientState};
pub use gateway_jsonrpc::registry::RoutedEvent;
pub use process::ProcessHandle;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to language server: {0}")]
    Connection(String),
    #[error("language server crashed: exit_code={exit_code:?} signal={signal:?}")]
    ServerCrash {
        exit_code: Option<i32>,
        signal: Option<i32>,
    },
    #[error(transparent)]
    Registry(gateway_jsonrpc::RegistryError),
    #[error("server returned a JSON-RPC error: {0}")]
    JsonRpc(#[from] gateway_jsonrpc::jsonrpc::Error),
    #[error("malformed server response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("client has been disposed")]
    Disposed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Hand-written rather than `#[from]`-derived: a registry failure caused by
/// the server process crashing carries its exit code/signal and must surface
/// as [`Error::ServerCrash`], not a generic wrapped [`Error::Registry`].
impl From<gateway_jsonrpc::RegistryError> for Error {
    fn from(err: gateway_jsonrpc::RegistryError) -> Self {
        match err {
            gateway_jsonrpc::RegistryError::ServerCrashed { exit_code, signal } => {
                Error::ServerCrash { exit_code, signal }
            }
            other => Error::Registry(other),
        }
    }
}
