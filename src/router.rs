//! Correlation router for agent-initiated requests.
//!
//! Requests issued by this agent (file reads, terminal control, permission
//! prompts) travel to the host over the same single stdio stream the read
//! loop is draining, so a caller waiting for its reply must never block
//! that loop. The router gives every outbound request a fresh integer id
//! and a [`oneshot`] reply slot; the read loop resolves the slot when the
//! matching `Response`/`Error` line arrives, while the caller suspends on
//! its own slot with a wall-clock deadline.
//!
//! # Lifecycle of a pending entry
//!
//! Created inside [`Router::request_with_timeout`], removed by exactly one
//! of: a matching reply, deadline expiry, a failed send, or [`Router::stop`].
//! A reply whose id is not in the table is inert — logged and dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rpc::codec;
use crate::rpc::message::{Message, RequestId, RpcError};
use crate::{AppError, Result};

/// Default per-request deadline applied by [`Router::request`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An in-flight agent-initiated request.
#[derive(Debug)]
struct Pending {
    /// Method name, kept for diagnostics.
    method: String,
    /// When the request was registered.
    created_at: Instant,
    /// Reply slot resolved by the read loop.
    reply_tx: oneshot::Sender<std::result::Result<Value, RpcError>>,
}

/// Owner of the outbound id space and the pending-request table.
#[derive(Debug)]
pub struct Router {
    /// Monotonically increasing outbound request id.
    next_id: AtomicI64,
    /// In-flight requests keyed by outbound id.
    pending: Mutex<HashMap<i64, Pending>>,
    /// Pre-encoded lines headed for the stream writer.
    outbound: mpsc::Sender<String>,
    /// Set once the stream is gone; refuses new requests.
    stopped: CancellationToken,
    /// Deadline applied when the caller does not supply one.
    default_timeout: Duration,
}

impl Router {
    /// Create a router that sends encoded lines through `outbound`.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<String>, default_timeout: Duration) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound,
            stopped: CancellationToken::new(),
            default_timeout,
        }
    }

    /// Issue an outbound request with the router's default deadline.
    ///
    /// # Errors
    ///
    /// See [`Router::request_with_timeout`].
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.request_with_timeout(method, params, self.default_timeout)
            .await
    }

    /// Issue an outbound request and suspend until it resolves.
    ///
    /// The caller's task is the only thing suspended; the read loop keeps
    /// running and will deliver the reply that resolves this call.
    ///
    /// # Errors
    ///
    /// - [`AppError::RouterStopped`] — the stream closed before or while
    ///   the request was in flight.
    /// - [`AppError::Codec`] — the request could not be encoded as one line.
    /// - [`AppError::SendFailed`] — the writer is gone; no pending entry
    ///   survives this case.
    /// - [`AppError::Timeout`] — no reply before the deadline; a later
    ///   reply with this id is discarded as stale.
    /// - [`AppError::Remote`] — the host answered with a JSON-RPC error.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        if self.stopped.is_cancelled() {
            return Err(AppError::RouterStopped);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = Message::Request {
            id: RequestId::Num(id),
            method: method.to_owned(),
            params,
        };
        let line = codec::encode_line(&message)?;

        let (reply_tx, reply_rx) = oneshot::channel();

        // Register before sending: the read loop runs concurrently, and a
        // reply must never find its own request unregistered.
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                id,
                Pending {
                    method: method.to_owned(),
                    created_at: Instant::now(),
                    reply_tx,
                },
            );
        }

        if self.outbound.send(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AppError::SendFailed("outbound writer is closed".into()));
        }

        debug!(id, method, ?timeout, "request sent");

        match tokio::time::timeout(timeout, reply_rx).await {
            Err(_elapsed) => {
                // The entry must go now: a reply arriving after the deadline
                // is stale and must not find anything to resolve.
                if self.pending.lock().await.remove(&id).is_some() {
                    warn!(id, method, "request timed out");
                }
                Err(AppError::Timeout(id))
            }
            Ok(Err(_closed)) => Err(AppError::RouterStopped),
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(rpc_err))) => Err(AppError::Remote(rpc_err)),
        }
    }

    /// Feed one inbound message through the router.
    ///
    /// Every `Response`/`Error` is consumed here: a pending id resolves its
    /// suspended caller, anything else is logged as stale and dropped.
    /// Requests and notifications are returned unchanged for the session
    /// dispatcher.
    pub async fn handle_incoming(&self, message: Message) -> Option<Message> {
        match message {
            Message::Response { id, result } => {
                self.resolve(&id, Ok(result)).await;
                None
            }
            Message::Error { id, error } => {
                self.resolve(&id, Err(error)).await;
                None
            }
            other => Some(other),
        }
    }

    /// Stop the router: refuse new requests and resolve every in-flight
    /// caller with [`AppError::RouterStopped`].
    pub async fn stop(&self) {
        self.stopped.cancel();
        let drained: Vec<(i64, Pending)> = self.pending.lock().await.drain().collect();
        if !drained.is_empty() {
            warn!(count = drained.len(), "router stopped with requests in flight");
        }
        // Dropping the senders wakes the suspended callers.
        drop(drained);
    }

    /// Whether [`Router::stop`] has run.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Number of requests currently awaiting a reply.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Resolve a reply against the pending table.
    async fn resolve(&self, id: &RequestId, outcome: std::result::Result<Value, RpcError>) {
        let RequestId::Num(num) = id else {
            debug!(%id, "reply id is not in the outbound id space, dropping");
            return;
        };

        match self.pending.lock().await.remove(num) {
            Some(entry) => {
                debug!(
                    id = num,
                    method = %entry.method,
                    elapsed = ?entry.created_at.elapsed(),
                    "reply resolved"
                );
                // The caller may have given up (timeout racing the reply);
                // a dead receiver is fine.
                let _ = entry.reply_tx.send(outcome);
            }
            None => {
                debug!(id = num, "stale or unknown reply id, dropping");
            }
        }
    }
}
