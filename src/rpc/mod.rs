//! JSON-RPC 2.0 wire layer.
//!
//! This module owns everything that touches raw bytes on the stdio stream:
//!
//! - `message`: the typed message model and per-line decode error tags.
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing
//!   plus the line ↔ [`Message`](message::Message) conversions.
//! - `writer`: the async task that exclusively owns the output half and
//!   writes complete single lines.

pub mod codec;
pub mod message;
pub mod writer;
