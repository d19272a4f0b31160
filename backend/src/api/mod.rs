//! HTTP API module.
//!
//! This module provides the HTTP server, the API types and the log
//! broadcaster shared by the pipeline and the SSE endpoint.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, ServerState};
pub use types::*;
