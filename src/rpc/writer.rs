//! Protocol stream writer task.
//!
//! The writer is the only component allowed to touch the output half of the
//! stream. It receives pre-encoded single-line messages over a tokio
//! [`mpsc`] channel, appends the `\n` delimiter, and performs one complete
//! write per message, so concurrent producers (response/notification
//! emission and router requests) can never interleave partial lines.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Drain `line_rx`, writing each line followed by a single `\n` to `sink`.
///
/// The task exits cleanly when the channel closes (all senders dropped).
///
/// # Errors
///
/// Returns [`AppError::Io`] when a write to the sink fails; messages still
/// queued at that point are dropped, and producers observe the closed
/// channel on their next send.
pub async fn run_writer<W>(mut sink: W, mut line_rx: mpsc::Receiver<String>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = line_rx.recv().await {
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');

        if let Err(err) = sink.write_all(&bytes).await {
            warn!(error = %err, "stream writer: write failed, stopping");
            return Err(AppError::Io(err.to_string()));
        }
        if let Err(err) = sink.flush().await {
            warn!(error = %err, "stream writer: flush failed, stopping");
            return Err(AppError::Io(err.to_string()));
        }
    }

    debug!("stream writer: line channel closed, stopping");
    Ok(())
}
