//! Capability-gated helpers for host-provided methods.
//!
//! The host advertises optional operations (file access, terminal control)
//! as boolean capabilities during `initialize`. Each helper here checks the
//! corresponding flag before touching the wire: a missing capability or an
//! invalid argument is rejected locally, with zero wire traffic. Valid
//! calls are validate → build params → [`Router::request`], and the
//! router's result shape is returned unchanged.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::router::Router;
use crate::{AppError, Result};

// ── Capability document ───────────────────────────────────────────────────────

/// File-system capabilities advertised by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FsCapabilities {
    /// Host accepts `fs/read_text_file`.
    pub read_text_file: bool,
    /// Host accepts `fs/write_text_file`.
    pub write_text_file: bool,
}

/// Client capability document, normalized exactly once at `initialize`.
///
/// Absent members default to `false`: an operation the host never mentioned
/// is an operation the host does not support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientCapabilities {
    /// File-system access flags.
    pub fs: FsCapabilities,
    /// Host accepts the `terminal/*` method family.
    pub terminal: bool,
}

// ── Terminal environment normalization ────────────────────────────────────────

/// One environment variable in the wire shape of `terminal/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// Environment variables for `terminal/create`, in any accepted shape.
///
/// Callers hold environments in different forms; all of them normalize to
/// the wire's list of `{name, value}` objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEnv {
    /// No environment overrides.
    Empty,
    /// A name → value map.
    Map(BTreeMap<String, String>),
    /// A list of `(name, value)` pairs.
    Pairs(Vec<(String, String)>),
    /// Already in the wire shape.
    Entries(Vec<EnvEntry>),
}

impl TerminalEnv {
    /// Normalize to the wire shape.
    #[must_use]
    pub fn into_entries(self) -> Vec<EnvEntry> {
        match self {
            Self::Empty => Vec::new(),
            Self::Map(map) => map
                .into_iter()
                .map(|(name, value)| EnvEntry { name, value })
                .collect(),
            Self::Pairs(pairs) => pairs
                .into_iter()
                .map(|(name, value)| EnvEntry { name, value })
                .collect(),
            Self::Entries(entries) => entries,
        }
    }
}

// ── Permission prompts ────────────────────────────────────────────────────────

/// Reference to the tool call a permission request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRef {
    /// Tool call id; must be a non-empty string.
    pub id: String,
    /// Optional human-readable title shown by the host.
    pub title: Option<String>,
}

impl ToolCallRef {
    /// Build a reference from an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
        }
    }

    /// Attach a title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// One selectable option in a permission prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Stable identifier returned by the host with the outcome.
    pub option_id: String,
    /// Label shown to the operator.
    pub name: String,
    /// Option kind (e.g. `allow_once`, `reject_once`).
    pub kind: String,
}

impl PermissionOption {
    /// Build an option.
    #[must_use]
    pub fn new(
        option_id: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            option_id: option_id.into(),
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// Default option pair offered when the caller supplies none.
#[must_use]
pub fn default_permission_options() -> Vec<PermissionOption> {
    vec![
        PermissionOption::new("allow-once", "Allow once", "allow_once"),
        PermissionOption::new("reject-once", "Reject once", "reject_once"),
    ]
}

// ── HostClient ────────────────────────────────────────────────────────────────

/// Capability-checked handle for invoking host-provided methods.
///
/// Built once per negotiation, at `initialize` time, from the normalized
/// capability document. Cheap to clone; all helpers share the router.
#[derive(Debug, Clone)]
pub struct HostClient {
    router: Arc<Router>,
    caps: ClientCapabilities,
    timeout: Duration,
}

impl HostClient {
    /// Create a handle over `router` with the negotiated capabilities.
    #[must_use]
    pub fn new(router: Arc<Router>, caps: ClientCapabilities, timeout: Duration) -> Self {
        Self {
            router,
            caps,
            timeout,
        }
    }

    /// The negotiated capability document.
    #[must_use]
    pub fn capabilities(&self) -> &ClientCapabilities {
        &self.caps
    }

    /// Read a text file through the host (`fs/read_text_file`).
    ///
    /// # Errors
    ///
    /// [`AppError::Unsupported`] without wire traffic when the host did not
    /// advertise `fs.readTextFile`; [`AppError::InvalidPath`] for a
    /// relative path; otherwise the router's result.
    pub async fn read_text_file(
        &self,
        session_id: &str,
        path: &Path,
        line: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Value> {
        if !self.caps.fs.read_text_file {
            return Err(AppError::Unsupported("fs.readTextFile".into()));
        }
        let path = absolute_str(path)?;

        let mut params = Map::new();
        params.insert("sessionId".into(), json!(session_id));
        params.insert("path".into(), json!(path));
        if let Some(line) = line {
            params.insert("line".into(), json!(line));
        }
        if let Some(limit) = limit {
            params.insert("limit".into(), json!(limit));
        }

        self.call("fs/read_text_file", Value::Object(params)).await
    }

    /// Write a text file through the host (`fs/write_text_file`).
    ///
    /// # Errors
    ///
    /// [`AppError::Unsupported`] without wire traffic when the host did not
    /// advertise `fs.writeTextFile`; [`AppError::InvalidPath`] for a
    /// relative path; otherwise the router's result.
    pub async fn write_text_file(
        &self,
        session_id: &str,
        path: &Path,
        content: &str,
    ) -> Result<Value> {
        if !self.caps.fs.write_text_file {
            return Err(AppError::Unsupported("fs.writeTextFile".into()));
        }
        let path = absolute_str(path)?;

        let params = json!({
            "sessionId": session_id,
            "path": path,
            "content": content,
        });
        self.call("fs/write_text_file", params).await
    }

    /// Start a terminal command through the host (`terminal/create`).
    ///
    /// # Errors
    ///
    /// [`AppError::Unsupported`] without wire traffic when the host did not
    /// advertise `terminal`; [`AppError::InvalidPath`] for a relative
    /// `cwd`; otherwise the router's result.
    pub async fn create_terminal(
        &self,
        session_id: &str,
        command: &str,
        args: &[String],
        env: TerminalEnv,
        cwd: Option<&Path>,
    ) -> Result<Value> {
        if !self.caps.terminal {
            return Err(AppError::Unsupported("terminal".into()));
        }

        let mut params = Map::new();
        params.insert("sessionId".into(), json!(session_id));
        params.insert("command".into(), json!(command));
        params.insert("args".into(), json!(args));
        params.insert("env".into(), json!(env.into_entries()));
        if let Some(cwd) = cwd {
            params.insert("cwd".into(), json!(absolute_str(cwd)?));
        }

        self.call("terminal/create", Value::Object(params)).await
    }

    /// Fetch buffered output of a terminal (`terminal/output`).
    ///
    /// # Errors
    ///
    /// [`AppError::Unsupported`] when `terminal` is absent; otherwise the
    /// router's result.
    pub async fn terminal_output(&self, session_id: &str, terminal_id: &str) -> Result<Value> {
        self.terminal_op("terminal/output", session_id, terminal_id)
            .await
    }

    /// Wait for a terminal to exit (`terminal/wait_for_exit`).
    ///
    /// # Errors
    ///
    /// [`AppError::Unsupported`] when `terminal` is absent; otherwise the
    /// router's result.
    pub async fn wait_for_terminal_exit(
        &self,
        session_id: &str,
        terminal_id: &str,
    ) -> Result<Value> {
        self.terminal_op("terminal/wait_for_exit", session_id, terminal_id)
            .await
    }

    /// Kill a running terminal command (`terminal/kill`).
    ///
    /// # Errors
    ///
    /// [`AppError::Unsupported`] when `terminal` is absent; otherwise the
    /// router's result.
    pub async fn kill_terminal(&self, session_id: &str, terminal_id: &str) -> Result<Value> {
        self.terminal_op("terminal/kill", session_id, terminal_id)
            .await
    }

    /// Release a terminal and its buffers (`terminal/release`).
    ///
    /// # Errors
    ///
    /// [`AppError::Unsupported`] when `terminal` is absent; otherwise the
    /// router's result.
    pub async fn release_terminal(&self, session_id: &str, terminal_id: &str) -> Result<Value> {
        self.terminal_op("terminal/release", session_id, terminal_id)
            .await
    }

    /// Ask the operator for permission to run a tool call
    /// (`session/request_permission`).
    ///
    /// When `options` is `None` the default `allow-once` / `reject-once`
    /// pair is offered.
    ///
    /// # Errors
    ///
    /// [`AppError::Protocol`] without wire traffic for an empty tool-call
    /// id or an option missing `optionId`/`name`/`kind`; otherwise the
    /// router's result.
    pub async fn request_permission(
        &self,
        session_id: &str,
        tool_call: &ToolCallRef,
        options: Option<Vec<PermissionOption>>,
    ) -> Result<Value> {
        if tool_call.id.trim().is_empty() {
            return Err(AppError::Protocol(
                "permission request requires a non-empty tool call id".into(),
            ));
        }

        let options = options.unwrap_or_else(default_permission_options);
        for option in &options {
            if option.option_id.trim().is_empty()
                || option.name.trim().is_empty()
                || option.kind.trim().is_empty()
            {
                return Err(AppError::Protocol(
                    "permission option requires optionId, name, and kind".into(),
                ));
            }
        }

        let mut tool_call_obj = Map::new();
        tool_call_obj.insert("toolCallId".into(), json!(tool_call.id));
        if let Some(title) = &tool_call.title {
            tool_call_obj.insert("title".into(), json!(title));
        }

        let params = json!({
            "sessionId": session_id,
            "toolCall": Value::Object(tool_call_obj),
            "options": options,
        });
        self.call("session/request_permission", params).await
    }

    // ── Private helpers ───────────────────────────────────────────────────

    /// Shared body of the single-terminal operations.
    async fn terminal_op(&self, method: &str, session_id: &str, terminal_id: &str) -> Result<Value> {
        if !self.caps.terminal {
            return Err(AppError::Unsupported("terminal".into()));
        }
        let params = json!({
            "sessionId": session_id,
            "terminalId": terminal_id,
        });
        self.call(method, params).await
    }

    /// Forward to the router with this handle's timeout.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.router
            .request_with_timeout(method, params, self.timeout)
            .await
    }
}

/// Require an absolute path and return it as a UTF-8 string.
fn absolute_str(path: &Path) -> Result<String> {
    if !path.is_absolute() {
        return Err(AppError::InvalidPath(path.display().to_string()));
    }
    Ok(path.display().to_string())
}
