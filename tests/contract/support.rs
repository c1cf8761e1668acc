//! Shared scaffolding for the per-method contract tests.
//!
//! These tests drive the [`Agent`] state machine directly and inspect the
//! exact lines it queues for the writer, so every assertion is about the
//! wire shape of one inbound method.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use agent_conduit::agent::Agent;
use agent_conduit::config::GlobalConfig;
use agent_conduit::router::Router;
use agent_conduit::rpc::message::{Message, RequestId};
use serde_json::{json, Value};

/// An uninitialized agent over an in-memory line channel.
pub fn new_agent() -> (Agent, mpsc::Receiver<String>) {
    new_agent_with(GlobalConfig::default())
}

/// An uninitialized agent with custom configuration.
pub fn new_agent_with(config: GlobalConfig) -> (Agent, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(256);
    let router = Arc::new(Router::new(tx.clone(), Duration::from_secs(1)));
    (Agent::new(Arc::new(config), router, tx), rx)
}

/// Dispatch one request and return every line it produced, in order.
pub async fn request(
    agent: &mut Agent,
    rx: &mut mpsc::Receiver<String>,
    id: i64,
    method: &str,
    params: Value,
) -> Vec<Value> {
    agent
        .dispatch(Message::Request {
            id: RequestId::Num(id),
            method: method.into(),
            params,
        })
        .await;
    drain(rx)
}

/// Dispatch one notification and return every line it produced, in order.
pub async fn notify(
    agent: &mut Agent,
    rx: &mut mpsc::Receiver<String>,
    method: &str,
    params: Value,
) -> Vec<Value> {
    agent
        .dispatch(Message::Notification {
            method: method.into(),
            params,
        })
        .await;
    drain(rx)
}

/// Run `initialize` with default parameters, discarding the output.
pub async fn initialize(agent: &mut Agent, rx: &mut mpsc::Receiver<String>) {
    let lines = request(
        agent,
        rx,
        900,
        "initialize",
        json!({"protocolVersion": 1}),
    )
    .await;
    assert_eq!(lines.len(), 1, "initialize must answer with one line");
}

/// Create a `/tmp` session, returning its id.
pub async fn new_session(agent: &mut Agent, rx: &mut mpsc::Receiver<String>) -> String {
    let lines = request(
        agent,
        rx,
        901,
        "session/new",
        json!({"cwd": "/tmp", "mcpServers": []}),
    )
    .await;
    lines[0]["result"]["sessionId"]
        .as_str()
        .expect("session/new must return a sessionId")
        .to_owned()
}

/// Collect the lines queued so far without waiting.
pub fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(line) = rx.try_recv() {
        out.push(serde_json::from_str(&line).expect("queued line must be JSON"));
    }
    out
}
