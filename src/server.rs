//! Protocol loop wiring.
//!
//! [`serve`] connects the three units of concurrency the protocol needs:
//!
//! - the **writer task**, sole owner of the output half;
//! - the **read loop** (this function's own body), which frames, decodes,
//!   and routes every inbound line;
//! - the **dispatcher task**, sole owner of the [`Agent`] state, draining
//!   an unbounded queue of requests and notifications.
//!
//! Replies to agent-initiated requests are resolved into the router from
//! the read loop; the dispatcher may be suspended on exactly such a reply,
//! so the read loop must never block on the dispatcher's queue.
//!
//! On EOF the router resolves in-flight requests as stopped, the dispatcher
//! drains, the writer drains, and `serve` returns.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::config::GlobalConfig;
use crate::router::Router;
use crate::rpc::codec::{self, RpcCodec};
use crate::rpc::message::Message;
use crate::rpc::writer::run_writer;
use crate::Result;

/// Depth of the outbound line queue feeding the writer.
const OUTBOUND_QUEUE: usize = 64;

/// Run the protocol loop over stdin/stdout until EOF.
///
/// # Errors
///
/// Returns an error only for wiring failures; per-line decode problems and
/// handler faults are contained inside the loop.
pub async fn serve_stdio(config: Arc<GlobalConfig>) -> Result<()> {
    serve(tokio::io::stdin(), tokio::io::stdout(), config).await
}

/// Run the protocol loop over an arbitrary stream pair.
///
/// Generic so tests can drive the full loop over in-memory duplex streams.
///
/// # Errors
///
/// Returns an error only for wiring failures; per-line decode problems and
/// handler faults are contained inside the loop.
pub async fn serve<R, W>(input: R, output: W, config: Arc<GlobalConfig>) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let writer = tokio::spawn(run_writer(output, line_rx));

    let router = Arc::new(Router::new(line_tx.clone(), config.request_timeout()));

    // Unbounded by design: the read loop must never block here, or a reply
    // queued behind a burst of requests could never unblock the dispatcher.
    let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel::<Message>();
    let agent = Agent::new(Arc::clone(&config), Arc::clone(&router), line_tx.clone());
    let dispatcher = tokio::spawn(run_dispatcher(agent, dispatch_rx));

    info!("protocol loop started");
    let mut framed = FramedRead::new(input, RpcCodec::with_max_length(config.max_line_bytes));

    while let Some(item) = framed.next().await {
        let line = match item {
            Ok(line) => line,
            Err(err) => {
                // Framing error (overlong line): drop the line, keep going.
                warn!(error = %err, "framing error, line dropped");
                continue;
            }
        };

        let message = match codec::decode_message(&line) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(err) => {
                warn!(error = %err, "undecodable line dropped");
                continue;
            }
        };

        // Replies resolve suspended callers; everything else queues for the
        // dispatcher in arrival order.
        if let Some(message) = router.handle_incoming(message).await {
            if dispatch_tx.send(message).is_err() {
                error!("dispatcher is gone, stopping read loop");
                break;
            }
        }
    }

    info!("input stream closed, shutting down");

    // Wind down in dependency order: pending requests first, then the
    // dispatcher queue, then the writer queue.
    router.stop().await;
    drop(dispatch_tx);
    if dispatcher.await.is_err() {
        error!("dispatcher task aborted");
    }
    drop(router);
    drop(line_tx);
    if let Ok(Err(err)) = writer.await {
        debug!(error = %err, "writer finished with error");
    }

    info!("protocol loop stopped");
    Ok(())
}

/// Drain the dispatch queue into the agent, one message at a time.
///
/// A panic inside a handler is caught here, at the dispatch boundary: it is
/// logged, the faulting request (if it was one) is answered with `-32603`,
/// and the loop continues with the next message.
async fn run_dispatcher(mut agent: Agent, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        let reply_to = match &message {
            Message::Request { id, .. } => Some(id.clone()),
            _ => None,
        };

        let dispatched = AssertUnwindSafe(agent.dispatch(message)).catch_unwind().await;
        if dispatched.is_err() {
            error!("handler fault caught at dispatch boundary");
            if let Some(id) = reply_to {
                agent.respond_fault(id).await;
            }
        }
    }
    debug!("dispatch queue closed, dispatcher stopping");
}
