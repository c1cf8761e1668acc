//! JSON-RPC 2.0 message model.
//!
//! Every line on the wire is exactly one [`Message`]. Classification is
//! tolerant where the protocol allows it (ids may be integers or strings,
//! `params` may be absent) and strict where it does not (the `jsonrpc`
//! version marker must be exactly `"2.0"`, responses must carry an id).

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON-RPC error codes used by this agent.
pub mod codes {
    /// Standard: request parameters failed validation.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Standard: the requested method is not part of the protocol surface.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Standard: a handler fault was caught at the dispatch boundary.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Domain-specific: a session operation arrived before `initialize`.
    pub const NOT_INITIALIZED: i64 = -32000;
}

/// Correlation id pairing a request to its eventual response.
///
/// Integers and strings are both legal; this agent allocates integers for
/// its own outbound requests and echoes whatever the host sent on inbound
/// ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Num(i64),
    /// String id.
    Str(String),
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// JSON-RPC error object carried by error responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Short human-readable summary.
    pub message: String,
    /// Optional detail payload; this agent emits a detail string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error object with no detail payload.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a detail string to the error object.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.data = Some(Value::String(detail.into()));
        self
    }

    /// `-32602` Invalid params, with a detail naming the offending field.
    #[must_use]
    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, "Invalid params").with_detail(detail)
    }

    /// `-32601` Method not found.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, "Method not found")
            .with_detail(format!("unknown method '{method}'"))
    }

    /// `-32000` Not initialized.
    #[must_use]
    pub fn not_initialized() -> Self {
        Self::new(codes::NOT_INITIALIZED, "Not initialized")
            .with_detail("initialize must be called before any session operation")
    }

    /// `-32603` Internal error, for faults caught at the dispatch boundary.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, "Internal error").with_detail(detail)
    }
}

/// A single JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call expecting a response, identified by `id`.
    Request {
        /// Correlation id, echoed on the response.
        id: RequestId,
        /// Method name.
        method: String,
        /// Method parameters; `Value::Null` when absent.
        params: Value,
    },
    /// A fire-and-forget call; no id, no response.
    Notification {
        /// Method name.
        method: String,
        /// Method parameters; `Value::Null` when absent.
        params: Value,
    },
    /// A successful reply to a request.
    Response {
        /// Id of the request being answered.
        id: RequestId,
        /// Result payload; an explicit JSON `null` is a valid result.
        result: Value,
    },
    /// An error reply to a request.
    Error {
        /// Id of the request being answered.
        id: RequestId,
        /// The error object.
        error: RpcError,
    },
}

/// Why a line failed to decode into a [`Message`].
///
/// Every variant is non-fatal: the offending line is logged and dropped,
/// and the read loop moves on to the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The line is not valid JSON.
    InvalidJson(String),
    /// The top-level JSON value is not an object.
    NotAnObject,
    /// The `jsonrpc` member is missing or not exactly `"2.0"`.
    BadVersion(Option<String>),
    /// The object is valid JSON-RPC framing but no recognizable message shape.
    Malformed(String),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "invalid json: {msg}"),
            Self::NotAnObject => write!(f, "top-level value is not an object"),
            Self::BadVersion(Some(v)) => write!(f, "unsupported jsonrpc version '{v}'"),
            Self::BadVersion(None) => write!(f, "missing jsonrpc version marker"),
            Self::Malformed(msg) => write!(f, "malformed message: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl Message {
    /// Classify a parsed JSON value into a message variant.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] naming the first violated framing rule:
    /// non-object top level, wrong/missing `jsonrpc` marker, or a shape
    /// that is neither request, notification, response, nor error.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let Some(obj) = value.as_object() else {
            return Err(DecodeError::NotAnObject);
        };

        match obj.get("jsonrpc") {
            Some(Value::String(v)) if v == "2.0" => {}
            Some(v) => {
                return Err(DecodeError::BadVersion(Some(v.to_string())));
            }
            None => return Err(DecodeError::BadVersion(None)),
        }

        let id = parse_id(obj)?;

        if let Some(method) = obj.get("method") {
            let Some(method) = method.as_str() else {
                return Err(DecodeError::Malformed("method is not a string".into()));
            };
            let params = obj.get("params").cloned().unwrap_or(Value::Null);
            return Ok(match id {
                Some(id) => Self::Request {
                    id,
                    method: method.to_owned(),
                    params,
                },
                None => Self::Notification {
                    method: method.to_owned(),
                    params,
                },
            });
        }

        // No method: this is a reply, which must carry an id.
        let Some(id) = id else {
            return Err(DecodeError::Malformed("reply without an id".into()));
        };

        if let Some(error) = obj.get("error") {
            let error: RpcError = serde_json::from_value(error.clone())
                .map_err(|err| DecodeError::Malformed(format!("bad error object: {err}")))?;
            return Ok(Self::Error { id, error });
        }

        if obj.contains_key("result") {
            let result = obj.get("result").cloned().unwrap_or(Value::Null);
            return Ok(Self::Response { id, result });
        }

        Err(DecodeError::Malformed(
            "object carries neither method, result, nor error".into(),
        ))
    }

    /// Render the message as a JSON value ready for serialization.
    ///
    /// Responses always include the `result` member, even when the value is
    /// `null` — a reply without `result` is a different, invalid shape.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Request { id, method, params } => {
                let mut obj = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": method,
                });
                if !params.is_null() {
                    obj["params"] = params.clone();
                }
                obj
            }
            Self::Notification { method, params } => {
                let mut obj = json!({
                    "jsonrpc": "2.0",
                    "method": method,
                });
                if !params.is_null() {
                    obj["params"] = params.clone();
                }
                obj
            }
            Self::Response { id, result } => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result,
            }),
            Self::Error { id, error } => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": error,
            }),
        }
    }

    /// Method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Correlation id, absent for notifications.
    #[must_use]
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } | Self::Error { id, .. } => {
                Some(id)
            }
            Self::Notification { .. } => None,
        }
    }
}

/// Extract and validate the optional `id` member.
fn parse_id(obj: &Map<String, Value>) -> Result<Option<RequestId>, DecodeError> {
    match obj.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::Str(s.clone()))),
        Some(Value::Number(n)) => n.as_i64().map(RequestId::Num).map(Some).ok_or_else(|| {
            DecodeError::Malformed(format!("id {n} is not an integer"))
        }),
        Some(other) => Err(DecodeError::Malformed(format!(
            "id has unsupported type: {other}"
        ))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
