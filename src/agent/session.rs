//! Session model: conversation context with its own working directory,
//! mode, and turn history.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed prefix of every session id.
pub const SESSION_ID_PREFIX: &str = "sess_";

/// Who produced a history turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The host's user.
    User,
    /// This agent.
    Agent,
}

/// One entry in a session's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Turn author.
    pub role: Role,
    /// Rendered linear text of the turn.
    pub content: String,
    /// When the turn was appended.
    pub at: DateTime<Utc>,
}

/// Per-session lifecycle state. Flat in this phase.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The session accepts prompts.
    #[default]
    Active,
}

/// MCP server specification attached to a session at creation.
///
/// Stored as negotiated; this agent does not launch the servers itself, so
/// every field is optional and unvalidated beyond shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerSpec {
    /// Display name of the server.
    pub name: Option<String>,
    /// Launch command.
    pub command: Option<String>,
    /// Launch arguments.
    pub args: Vec<String>,
}

/// A conversation context owned by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Globally unique id, `sess_<token>`.
    pub id: String,
    /// Absolute working directory negotiated at creation.
    pub cwd: PathBuf,
    /// Current session mode; host-defined vocabulary.
    pub mode: Option<String>,
    /// MCP servers attached at creation.
    pub mcp_servers: Vec<McpServerSpec>,
    /// Append-only ordered turn history.
    pub history: Vec<Turn>,
    /// Lifecycle state.
    pub status: SessionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create an active session with a freshly generated id.
    #[must_use]
    pub fn new(cwd: PathBuf, mcp_servers: Vec<McpServerSpec>) -> Self {
        Self {
            id: generate_session_id(),
            cwd,
            mode: None,
            mcp_servers,
            history: Vec::new(),
            status: SessionStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Append one turn to the history.
    pub fn push_turn(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(Turn {
            role,
            content: content.into(),
            at: Utc::now(),
        });
    }
}

/// Generate a process-unique session id: fixed prefix plus random suffix.
#[must_use]
pub fn generate_session_id() -> String {
    format!("{SESSION_ID_PREFIX}{}", Uuid::new_v4().simple())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
