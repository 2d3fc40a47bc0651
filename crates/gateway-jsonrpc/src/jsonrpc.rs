//! An implementation of the JSON-RPC 2.0 spec types used to wrap LSP traffic.
//!
//! Ported from the upstream `jsonrpc-core` crate types rather than taken as
//! an external dependency: `jsonrpc-core` itself pulls in a full JSON-RPC
//! server/client framework this gateway has no use for, we only need the
//! wire shapes.
//!
//! Differences from a strict reading of JSON-RPC 2.0, all required for
//! interoperating with real LSP servers in the wild:
//! * no `#[serde(deny_unknown_fields)]` on response types, since some
//!   servers send extra top-level fields alongside `result`/`id`.
//! * `Id` additionally accepts `Null`, which well-behaved servers should
//!   never send back but which is tolerated rather than rejected.

use serde::de::{self, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// https://www.jsonrpc.org/specification#error_object
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError(i64),
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match *self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError(code) => code,
        }
    }

    pub fn is_method_not_found(&self) -> bool {
        matches!(self, ErrorCode::MethodNotFound)
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            code => ErrorCode::ServerError(code),
        }
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code: i64 = Deserialize::deserialize(deserializer)?;
        Ok(ErrorCode::from(code))
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.code())
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Error {
    pub fn invalid_params<M: Into<String>>(message: M) -> Self {
        Error {
            code: ErrorCode::InvalidParams,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found() -> Self {
        Error {
            code: ErrorCode::MethodNotFound,
            message: "method not found".to_string(),
            data: None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

/// Request/response id. Assigned monotonically per-client starting at 1
/// (`gateway_lsp::Client`); never reused within a client's lifetime.
#[derive(Debug, PartialEq, Clone, Hash, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Id {
    Null,
    Num(u64),
    Str(String),
}

#[derive(Debug, PartialEq, Clone, Copy, Hash, Eq)]
pub enum Version {
    V2,
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match *self {
            Version::V2 => serializer.serialize_str("2.0"),
        }
    }
}

struct VersionVisitor;

impl<'v> Visitor<'v> for VersionVisitor {
    type Value = Version;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match value {
            "2.0" => Ok(Version::V2),
            _ => Err(de::Error::custom("invalid version")),
        }
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_identifier(VersionVisitor)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    None,
    Array(Vec<Value>),
    Map(serde_json::Map<String, Value>),
}

impl From<Params> for Value {
    fn from(params: Params) -> Value {
        match params {
            Params::Array(vec) => Value::Array(vec),
            Params::Map(map) => Value::Object(map),
            Params::None => Value::Null,
        }
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Params::None,
            Value::Array(vec) => Params::Array(vec),
            Value::Object(map) => Params::Map(map),
            other => Params::Array(vec![other]),
        }
    }
}

fn default_params() -> Params {
    Params::None
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MethodCall {
    pub jsonrpc: Option<Version>,
    pub method: String,
    #[serde(default = "default_params")]
    pub params: Params,
    pub id: Id,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Notification {
    pub jsonrpc: Option<Version>,
    pub method: String,
    #[serde(default = "default_params")]
    pub params: Params,
}

/// A message sent from the server to us that is not a response to one of
/// our own requests: either the server calling us back (`MethodCall`), or a
/// one-way notification.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
#[serde(untagged)]
pub enum Call {
    MethodCall(MethodCall),
    Notification(Notification),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Success {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<Version>,
    pub result: Value,
    pub id: Id,
}

#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct Failure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<Version>,
    pub error: Error,
    pub id: Id,
}

// Failure comes first: since neither type uses `deny_unknown_fields`, a
// payload carrying both `result` and `error` is treated as a Failure.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Output {
    Failure(Failure),
    Success(Success),
}

impl Output {
    pub fn id(&self) -> &Id {
        match self {
            Output::Success(s) => &s.id,
            Output::Failure(f) => &f.id,
        }
    }
}

impl From<Output> for Result<Value, Error> {
    fn from(output: Output) -> Self {
        match output {
            Output::Success(success) => Ok(success.result),
            Output::Failure(failure) => Err(failure.error),
        }
    }
}

/// Any incoming payload we might read off the wire: either the answer to a
/// request we sent (`Output`) or something the server originated itself
/// (`Call`).
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Output(Output),
    Call(Call),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_call_serialize() {
        let m = MethodCall {
            jsonrpc: Some(Version::V2),
            method: "update".to_owned(),
            params: Params::Array(vec![Value::from(1), Value::from(2)]),
            id: Id::Num(1),
        };

        let serialized = serde_json::to_string(&m).unwrap();
        assert_eq!(
            serialized,
            r#"{"jsonrpc":"2.0","method":"update","params":[1,2],"id":1}"#
        );
    }

    #[test]
    fn notification_serialize() {
        let n = Notification {
            jsonrpc: Some(Version::V2),
            method: "update".to_owned(),
            params: Params::Array(vec![Value::from(1), Value::from(2)]),
        };

        let serialized = serde_json::to_string(&n).unwrap();
        assert_eq!(
            serialized,
            r#"{"jsonrpc":"2.0","method":"update","params":[1,2]}"#
        );
    }

    #[test]
    fn success_output_deserialize() {
        let dso = r#"{"jsonrpc":"2.0","result":1,"id":1}"#;
        let deserialized: Output = serde_json::from_str(dso).unwrap();
        assert_eq!(
            deserialized,
            Output::Success(Success {
                jsonrpc: Some(Version::V2),
                result: Value::from(1),
                id: Id::Num(1)
            })
        );
    }

    #[test]
    fn success_output_deserialize_with_extra_fields() {
        // Some servers echo back the request method alongside the result.
        let dso = r#"{"jsonrpc":"2.0","result":1,"id":1,"requestMethod":"initialize"}"#;
        let deserialized: Output = serde_json::from_str(dso).unwrap();
        assert_eq!(
            deserialized,
            Output::Success(Success {
                jsonrpc: Some(Version::V2),
                result: Value::from(1),
                id: Id::Num(1)
            })
        );
    }

    #[test]
    fn server_message_classifies_call_vs_output() {
        let notif = r#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{}}"#;
        let msg: ServerMessage = serde_json::from_str(notif).unwrap();
        assert!(matches!(msg, ServerMessage::Call(Call::Notification(_))));

        let resp = r#"{"jsonrpc":"2.0","result":{},"id":2}"#;
        let msg: ServerMessage = serde_json::from_str(resp).unwrap();
        assert!(matches!(msg, ServerMessage::Output(Output::Success(_))));
    }
}
