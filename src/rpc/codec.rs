//! NDJSON codec for the stdio protocol stream.
//!
//! Framing wraps [`tokio_util::codec::LinesCodec`] with a configurable
//! maximum line length to prevent memory exhaustion caused by unterminated
//! or maliciously large messages from a misbehaving host.
//!
//! On top of the framing layer, [`decode_message`] classifies one line into
//! a [`Message`] and [`encode_line`] renders one [`Message`] as a single
//! compact line. Decode failures are per-line and never stop the read loop.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::rpc::message::{DecodeError, Message};
use crate::{AppError, Result};

/// Default maximum line length accepted by the codec: 1 MiB.
///
/// Lines exceeding the limit on the inbound stream cause [`RpcCodec::decode`]
/// to return [`AppError::Codec`] with `"line too long"` rather than
/// allocating unbounded memory for a single message.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line-framing codec for the inbound half of the protocol stream.
///
/// Delegates to [`LinesCodec`] with a bounded line length. Each
/// newline-terminated UTF-8 string is one complete JSON-RPC message; the
/// JSON-level decode is a separate step ([`decode_message`]) so framing
/// errors and message errors stay distinguishable.
#[derive(Debug)]
pub struct RpcCodec(LinesCodec);

impl RpcCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom maximum line length.
    #[must_use]
    pub fn with_max_length(max_line_bytes: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_line_bytes))
    }
}

impl Default for RpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RpcCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

/// Decode one line into a [`Message`].
///
/// Trailing CR/LF bytes are trimmed first. A blank or whitespace-only line
/// is the distinguishable empty case, `Ok(None)` — not an error.
///
/// # Errors
///
/// Returns a [`DecodeError`] tag for invalid JSON, a non-object top level,
/// a wrong or missing `jsonrpc` marker, or a malformed message shape.
pub fn decode_message(line: &str) -> std::result::Result<Option<Message>, DecodeError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|err| DecodeError::InvalidJson(err.to_string()))?;

    Message::from_value(&value).map(Some)
}

/// Encode one [`Message`] as a single compact JSON line (no trailing newline).
///
/// The writer task appends exactly one `\n`; the line itself must therefore
/// never contain a raw `0x0A`/`0x0D` byte. The serializer escapes embedded
/// newlines inside string values, so the check is defensive.
///
/// # Errors
///
/// Returns [`AppError::Codec`] if serialization fails or the serialized
/// form would corrupt the stream.
pub fn encode_line(message: &Message) -> Result<String> {
    let line = serde_json::to_string(&message.to_value())
        .map_err(|err| AppError::Codec(format!("failed to serialize message: {err}")))?;

    if line.bytes().any(|b| b == b'\n' || b == b'\r') {
        return Err(AppError::Codec(
            "serialized message contains a raw newline byte".into(),
        ));
    }

    Ok(line)
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Codec("line too long: exceeded the configured limit".into())
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
