//! Shared helpers for end-to-end protocol loop tests.
//!
//! [`TestHost`] plays the host editor: it owns the client half of an
//! in-memory duplex stream while [`agent_conduit::server::serve`] runs the
//! agent half, so every test exercises the real reader, dispatcher, router,
//! and writer wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use agent_conduit::{server, GlobalConfig};
use serde_json::{json, Value};

/// How long a test waits for one line before declaring the agent silent.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// The host side of a live protocol loop.
pub struct TestHost {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: Option<WriteHalf<DuplexStream>>,
    /// The running `serve` future; resolves when the loop shuts down.
    pub serve_handle: JoinHandle<agent_conduit::Result<()>>,
    next_id: i64,
}

impl TestHost {
    /// Start a loop with default configuration.
    #[must_use]
    pub fn start() -> Self {
        Self::start_with(GlobalConfig::default())
    }

    /// Start a loop with the given configuration.
    #[must_use]
    pub fn start_with(config: GlobalConfig) -> Self {
        let (host_io, agent_io) = tokio::io::duplex(64 * 1024);
        let (agent_read, agent_write) = tokio::io::split(agent_io);
        let (host_read, host_write) = tokio::io::split(host_io);

        let serve_handle =
            tokio::spawn(server::serve(agent_read, agent_write, Arc::new(config)));

        Self {
            reader: BufReader::new(host_read),
            writer: Some(host_write),
            serve_handle,
            next_id: 1,
        }
    }

    /// Send one raw line (newline appended) to the agent.
    pub async fn send_raw(&mut self, line: &str) {
        let writer = self.writer.as_mut().expect("input already closed");
        writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write to agent stdin");
    }

    /// Send one JSON value as a line.
    pub async fn send(&mut self, value: &Value) {
        self.send_raw(&value.to_string()).await;
    }

    /// Send a request, returning the id used.
    pub async fn send_request(&mut self, method: &str, params: Value) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await;
        id
    }

    /// Send a notification (no id).
    pub async fn send_notification(&mut self, method: &str, params: Value) {
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await;
    }

    /// Receive one line from the agent, parsed as JSON.
    pub async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let read = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("agent must answer within the receive timeout")
            .expect("read from agent stdout");
        assert!(read > 0, "agent closed its output unexpectedly");
        serde_json::from_str(line.trim_end()).expect("agent output must be one JSON value per line")
    }

    /// Receive lines until the response for `id` arrives; returns the
    /// notifications seen on the way plus the response itself.
    pub async fn recv_until_response(&mut self, id: i64) -> (Vec<Value>, Value) {
        let mut notifications = Vec::new();
        loop {
            let value = self.recv().await;
            if value.get("id").and_then(Value::as_i64) == Some(id) {
                return (notifications, value);
            }
            notifications.push(value);
        }
    }

    /// Run the `initialize` handshake, returning the response result.
    pub async fn initialize(&mut self) -> Value {
        let id = self
            .send_request(
                "initialize",
                json!({
                    "protocolVersion": 1,
                    "clientInfo": {"name": "test-host", "version": "0.0.0"},
                    "clientCapabilities": {"fs": {"readTextFile": true}},
                }),
            )
            .await;
        let (notifications, response) = self.recv_until_response(id).await;
        assert!(
            notifications.is_empty(),
            "initialize must emit no notifications: {notifications:?}"
        );
        response["result"].clone()
    }

    /// Create a session under `/tmp`, returning its id.
    pub async fn new_session(&mut self) -> String {
        let id = self
            .send_request("session/new", json!({"cwd": "/tmp", "mcpServers": []}))
            .await;
        let (_, response) = self.recv_until_response(id).await;
        response["result"]["sessionId"]
            .as_str()
            .expect("session/new must return a sessionId")
            .to_owned()
    }

    /// Close the agent's input, as the host does on shutdown.
    pub async fn close_input(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await.expect("shutdown agent stdin");
        }
    }
}
