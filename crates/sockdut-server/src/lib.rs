//! Socket DUT server.
//!
//! Receives socket-call requests from a remote test driver over a TCP
//! connection, replays each one through `sockdut-abi`, and returns the raw
//! native result. This crate provides:
//! - [`protocol`]: the newline-delimited JSON request/response envelope
//! - [`router`]: maps a parsed call onto its dispatcher operation
//! - [`server`]: the TCP accept loop and per-request worker threads
//! - [`structured_log`]: JSONL log records for every call and connection
//! - [`config`]: validated startup configuration

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod router;
pub mod server;
pub mod structured_log;

pub use config::ServerConfig;
pub use error::{ConfigError, ServerError};
pub use protocol::{Call, RpcRequest, RpcResponse, Status};
pub use server::PosixServer;
