//! Framed JSON-RPC transport and request registry shared by every LSP
//! client the gateway spawns (components C1 and C2).

pub mod framing;
pub mod jsonrpc;
pub mod registry;

pub use framing::{read_frame, write_frame, FramingError, MAX_CONTENT_LENGTH};
pub use registry::{DiagnosticStore, Registry, RegistryError, RoutedEvent};
