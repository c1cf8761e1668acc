#![forbid(unsafe_code)]

//! `agent-conduit` — an ACP-style coding agent that talks newline-delimited
//! JSON-RPC 2.0 with a host editor over stdio.
//!
//! The host spawns the agent as a subprocess and owns both pipe ends;
//! stdout carries nothing but complete JSON-RPC lines, and diagnostics go
//! to stderr. See the `rpc`, `router`, `agent`, and `client` modules for
//! the four corners of the protocol engine, and `server` for the loop that
//! wires them together.

pub mod agent;
pub mod client;
pub mod config;
pub mod errors;
pub mod router;
pub mod rpc;
pub mod server;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
