//! Session/protocol state machine.
//!
//! One [`Agent`] owns protocol negotiation and every session object. The
//! dispatcher task is its only caller, so state mutation stays
//! single-threaded: no two inbound messages are ever processed concurrently
//! against the same state. Handlers may suspend on host round-trips via the
//! router; the read loop keeps running underneath and delivers the replies
//! that resolve those round-trips.
//!
//! For every inbound request, all notifications produced while handling it
//! are pushed to the outbound channel before the response, so they reach
//! the stream in that order.

pub mod content;
pub mod engine;
pub mod session;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::{ClientCapabilities, HostClient};
use crate::config::{ChunkMode, GlobalConfig};
use crate::rpc::codec;
use crate::rpc::message::{Message, RequestId, RpcError};
use crate::router::Router;

use self::engine::{EchoEngine, TurnEngine};
use self::session::{McpServerSpec, Role, Session};

/// Protocol version this agent speaks.
pub const PROTOCOL_VERSION: u64 = 1;

/// Acknowledgement text streamed in reply to `session/cancel`.
const CANCEL_ACK: &str =
    "Cancellation request received; the turn in progress will finish normally.";

/// Terminal status of a completed prompt turn.
///
/// Only [`StopReason::EndTurn`] is produced today; the other variants are
/// the documented extension point for interrupted and failed turns.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The turn ran to completion.
    EndTurn,
    /// The turn was cut short by cancellation.
    Cancelled,
    /// The turn failed.
    Error,
}

impl StopReason {
    /// Wire spelling of the stop reason.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

/// Identity advertised by the host during `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    /// Client name.
    pub name: Option<String>,
    /// Human-readable title.
    pub title: Option<String>,
    /// Client version.
    pub version: Option<String>,
}

/// Everything fixed by a successful `initialize` exchange.
#[derive(Debug, Clone)]
pub struct Negotiated {
    /// Protocol version the host asked for.
    pub protocol_version: u64,
    /// Host identity.
    pub client_info: ClientInfo,
    /// Capability document, normalized exactly once.
    pub capabilities: ClientCapabilities,
    /// Capability-gated handle for host-provided methods.
    pub host: HostClient,
}

/// Closed enumeration of the inbound protocol surface.
///
/// Anything outside this list answers `-32601` via the explicit default
/// branch in the dispatcher.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum AgentMethod {
    Initialize,
    SessionNew,
    SessionSetMode,
    SessionPrompt,
    SessionCancel,
}

impl AgentMethod {
    fn parse(method: &str) -> Option<Self> {
        match method {
            "initialize" => Some(Self::Initialize),
            "session/new" => Some(Self::SessionNew),
            "session/set_mode" => Some(Self::SessionSetMode),
            "session/prompt" => Some(Self::SessionPrompt),
            "session/cancel" => Some(Self::SessionCancel),
            _ => None,
        }
    }
}

/// The session/protocol state machine.
///
/// Owned by the dispatcher task; everything reaches it through the dispatch
/// channel.
pub struct Agent {
    config: Arc<GlobalConfig>,
    router: Arc<Router>,
    outbound: mpsc::Sender<String>,
    engine: Box<dyn TurnEngine>,
    negotiated: Option<Negotiated>,
    sessions: HashMap<String, Session>,
}

impl Agent {
    /// Create an uninitialized agent with the default echo engine.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        router: Arc<Router>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        Self::with_engine(config, router, outbound, Box::new(EchoEngine))
    }

    /// Create an uninitialized agent with a custom turn engine.
    #[must_use]
    pub fn with_engine(
        config: Arc<GlobalConfig>,
        router: Arc<Router>,
        outbound: mpsc::Sender<String>,
        engine: Box<dyn TurnEngine>,
    ) -> Self {
        Self {
            config,
            router,
            outbound,
            engine,
            negotiated: None,
            sessions: HashMap::new(),
        }
    }

    /// Whether `initialize` has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.negotiated.is_some()
    }

    /// The capability-gated host handle, once negotiated.
    #[must_use]
    pub fn host(&self) -> Option<&HostClient> {
        self.negotiated.as_ref().map(|n| &n.host)
    }

    /// Look up a session by id.
    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Process one inbound message: decide and emit the response, error, or
    /// notifications it calls for.
    pub async fn dispatch(&mut self, message: Message) {
        match message {
            Message::Request { id, method, params } => {
                self.handle_request(id, &method, &params).await;
            }
            Message::Notification { method, params } => {
                self.handle_notification(&method, &params).await;
            }
            // Replies are consumed by the router before dispatch.
            other => debug!(?other, "dispatcher received a reply, ignoring"),
        }
    }

    /// Answer a caught handler fault with `-32603`.
    pub async fn respond_fault(&self, id: RequestId) {
        self.respond(id, Err(RpcError::internal("handler fault while dispatching")))
            .await;
    }

    // ── Request/notification dispatch ─────────────────────────────────────

    async fn handle_request(&mut self, id: RequestId, method: &str, params: &Value) {
        let outcome = match AgentMethod::parse(method) {
            Some(AgentMethod::Initialize) => self.initialize(params),
            Some(AgentMethod::SessionNew) => self.session_new(params),
            Some(AgentMethod::SessionSetMode) => self.session_set_mode(params).await,
            Some(AgentMethod::SessionPrompt) => self.session_prompt(params).await,
            Some(AgentMethod::SessionCancel) => {
                // Listed as a notification; answered anyway when a host
                // sends it as a request.
                self.session_cancel(params).await;
                Ok(Value::Null)
            }
            None => Err(RpcError::method_not_found(method)),
        };

        if let Err(err) = &outcome {
            debug!(method, code = err.code, message = %err.message, "request rejected");
        }
        self.respond(id, outcome).await;
    }

    async fn handle_notification(&mut self, method: &str, params: &Value) {
        match AgentMethod::parse(method) {
            Some(AgentMethod::SessionCancel) => self.session_cancel(params).await,
            Some(_) => {
                warn!(method, "notification for a request-only method, skipping");
            }
            None => {
                debug!(method, "unknown notification method, skipping");
            }
        }
    }

    // ── Handlers ──────────────────────────────────────────────────────────

    /// `initialize`: negotiate protocol version, capabilities, identity.
    fn initialize(&mut self, params: &Value) -> Result<Value, RpcError> {
        let Some(version) = params.get("protocolVersion").and_then(Value::as_u64) else {
            return Err(RpcError::invalid_params(
                "protocolVersion must be an integer",
            ));
        };

        // Tolerated: a malformed capability or info document degrades to
        // defaults instead of failing the handshake.
        let capabilities: ClientCapabilities = params
            .get("clientCapabilities")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let client_info: ClientInfo = params
            .get("clientInfo")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        if self.negotiated.is_some() {
            info!("initialize received again, renegotiating");
        }

        let host = HostClient::new(
            Arc::clone(&self.router),
            capabilities,
            self.config.request_timeout(),
        );
        self.negotiated = Some(Negotiated {
            protocol_version: version,
            client_info,
            capabilities,
            host,
        });

        info!(
            client_version = version,
            fs_read = capabilities.fs.read_text_file,
            fs_write = capabilities.fs.write_text_file,
            terminal = capabilities.terminal,
            "initialized"
        );

        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "agentCapabilities": {
                "loadSession": false,
                "promptCapabilities": {
                    "image": true,
                    "audio": true,
                    "embeddedContext": true,
                },
            },
            "agentInfo": {
                "name": self.config.agent_name,
                "title": self.config.agent_title,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "authMethods": [],
        }))
    }

    /// `session/new`: create a session rooted at an absolute `cwd`.
    fn session_new(&mut self, params: &Value) -> Result<Value, RpcError> {
        self.ensure_initialized()?;

        let Some(cwd) = params.get("cwd").and_then(Value::as_str) else {
            return Err(RpcError::invalid_params(
                "cwd is required and must be an absolute path",
            ));
        };
        if !Path::new(cwd).is_absolute() {
            return Err(RpcError::invalid_params("cwd must be an absolute path"));
        }

        let mcp_servers: Vec<McpServerSpec> = params
            .get("mcpServers")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let session = Session::new(PathBuf::from(cwd), mcp_servers);
        let session_id = session.id.clone();
        self.sessions.insert(session_id.clone(), session);

        info!(session_id, cwd, "session created");
        Ok(json!({ "sessionId": session_id }))
    }

    /// `session/set_mode`: update the mode and stream the change.
    async fn session_set_mode(&mut self, params: &Value) -> Result<Value, RpcError> {
        self.ensure_initialized()?;

        let session_id = require_str(params, "sessionId")?.to_owned();
        let mode = require_str(params, "mode")?.to_owned();

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return Err(RpcError::invalid_params(format!(
                "unknown sessionId '{session_id}'"
            )));
        };
        session.mode = Some(mode.clone());

        self.push_update(&session_id, json!({ "sessionUpdate": "mode", "mode": mode }))
            .await;

        // The explicit null result is the contract; omitting the field
        // would be a different, invalid response shape.
        Ok(Value::Null)
    }

    /// `session/prompt`: render the blocks, stream plan and reply, record
    /// both turns.
    async fn session_prompt(&mut self, params: &Value) -> Result<Value, RpcError> {
        self.ensure_initialized()?;

        let session_id = require_str(params, "sessionId")?.to_owned();
        let Some(blocks) = params.get("prompt").and_then(Value::as_array) else {
            return Err(RpcError::invalid_params("prompt must be a list"));
        };

        if !self.sessions.contains_key(&session_id) {
            return Err(RpcError::invalid_params(format!(
                "unknown sessionId '{session_id}'"
            )));
        }

        let rendered = content::render_blocks(blocks);
        let plan = self.engine.plan(&rendered);
        let reply = self.engine.reply(&rendered);

        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.push_turn(Role::User, rendered);
        }

        self.push_update(&session_id, json!({ "sessionUpdate": "plan", "entries": plan }))
            .await;

        for chunk in split_chunks(&reply, self.config.chunking) {
            self.push_update(
                &session_id,
                json!({
                    "sessionUpdate": "agent_message_chunk",
                    "content": { "type": "text", "text": chunk },
                }),
            )
            .await;
        }

        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.push_turn(Role::Agent, reply);
        }

        Ok(json!({ "stopReason": StopReason::EndTurn.as_str() }))
    }

    /// `session/cancel`: acknowledge, do not preempt.
    async fn session_cancel(&mut self, params: &Value) {
        let Some(session_id) = params.get("sessionId").and_then(Value::as_str) else {
            debug!("session/cancel without a sessionId, skipping");
            return;
        };

        if !self.sessions.contains_key(session_id) {
            debug!(session_id, "session/cancel for an unknown session, skipping");
            return;
        }

        info!(session_id, "cancellation acknowledged");
        self.push_update(
            session_id,
            json!({
                "sessionUpdate": "agent_message_chunk",
                "content": { "type": "text", "text": CANCEL_ACK },
            }),
        )
        .await;
    }

    // ── Emission helpers ──────────────────────────────────────────────────

    /// Send the response or error for a request id.
    async fn respond(&self, id: RequestId, outcome: Result<Value, RpcError>) {
        let message = match outcome {
            Ok(result) => Message::Response { id, result },
            Err(error) => Message::Error { id, error },
        };
        self.send(message).await;
    }

    /// Emit a `session/update` notification.
    async fn push_update(&self, session_id: &str, update: Value) {
        let message = Message::Notification {
            method: "session/update".into(),
            params: json!({ "sessionId": session_id, "update": update }),
        };
        self.send(message).await;
    }

    /// Encode and queue one message for the stream writer.
    async fn send(&self, message: Message) {
        match codec::encode_line(&message) {
            Ok(line) => {
                if self.outbound.send(line).await.is_err() {
                    warn!("outbound channel closed, message dropped");
                }
            }
            Err(err) => {
                // Local defect: log it, never crash the loop over it.
                error!(error = %err, "failed to encode outbound message");
            }
        }
    }

    /// Sequencing guard shared by every session operation.
    fn ensure_initialized(&self) -> Result<&Negotiated, RpcError> {
        self.negotiated.as_ref().ok_or_else(RpcError::not_initialized)
    }
}

/// Split a reply into chunks per the configured granularity.
fn split_chunks(reply: &str, mode: ChunkMode) -> Vec<String> {
    match mode {
        ChunkMode::Whole => vec![reply.to_owned()],
        ChunkMode::Characters => reply.chars().map(String::from).collect(),
    }
}

/// Extract a required string field from request params.
fn require_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, RpcError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(format!("{field} is required")))
}
