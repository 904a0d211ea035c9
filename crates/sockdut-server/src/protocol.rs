//! Newline-delimited JSON envelope.
//!
//! Request: `{"id": 7, "method": "Bind", "params": {"sockfd": 3, "addr": {...}}}`
//!
//! Response: `{"id": 7, "status": "ok", "result": {"ret": 0, "errno": 0}}` or
//! `{"id": 7, "status": "invalid_argument", "message": "Missing address"}`.
//!
//! Responses on one connection may be written out of request order because
//! each call runs on its own thread; `id` correlates them.

use serde::{Deserialize, Serialize};
use sockdut_core::{SyscallResult, WireAddress};
use sockdut_core::request::{
    AcceptRequest, BindRequest, CloseRequest, ConnectRequest, GetSockNameRequest,
    GetSockOptRequest, ListenRequest, RecvRequest, SendRequest, SendToRequest,
    SetSockOptRequest, SetSockOptTimevalRequest, ShutdownRequest, SocketRequest,
};
use thiserror::Error;

/// One RPC method and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Call {
    Socket(SocketRequest),
    Bind(BindRequest),
    Listen(ListenRequest),
    Accept(AcceptRequest),
    GetSockName(GetSockNameRequest),
    SetSockOpt(SetSockOptRequest),
    SetSockOptTimeval(SetSockOptTimevalRequest),
    GetSockOpt(GetSockOptRequest),
    Connect(ConnectRequest),
    Recv(RecvRequest),
    Send(SendRequest),
    SendTo(SendToRequest),
    Shutdown(ShutdownRequest),
    Close(CloseRequest),
}

impl Call {
    /// Method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Socket(_) => "Socket",
            Self::Bind(_) => "Bind",
            Self::Listen(_) => "Listen",
            Self::Accept(_) => "Accept",
            Self::GetSockName(_) => "GetSockName",
            Self::SetSockOpt(_) => "SetSockOpt",
            Self::SetSockOptTimeval(_) => "SetSockOptTimeval",
            Self::GetSockOpt(_) => "GetSockOpt",
            Self::Connect(_) => "Connect",
            Self::Recv(_) => "Recv",
            Self::Send(_) => "Send",
            Self::SendTo(_) => "SendTo",
            Self::Shutdown(_) => "Shutdown",
            Self::Close(_) => "Close",
        }
    }

    /// Descriptor the call operates on, if any.
    pub fn sockfd(&self) -> Option<i32> {
        match self {
            Self::Socket(_) => None,
            Self::Bind(r) => Some(r.sockfd),
            Self::Listen(r) => Some(r.sockfd),
            Self::Accept(r) => Some(r.sockfd),
            Self::GetSockName(r) => Some(r.sockfd),
            Self::SetSockOpt(r) => Some(r.sockfd),
            Self::SetSockOptTimeval(r) => Some(r.sockfd),
            Self::GetSockOpt(r) => Some(r.sockfd),
            Self::Connect(r) => Some(r.sockfd),
            Self::Recv(r) => Some(r.sockfd),
            Self::Send(r) => Some(r.sockfd),
            Self::SendTo(r) => Some(r.sockfd),
            Self::Shutdown(r) => Some(r.fd),
            Self::Close(r) => Some(r.fd),
        }
    }

    /// Address the caller supplied, for calls that take one.
    pub fn address(&self) -> Option<&WireAddress> {
        match self {
            Self::Bind(r) => r.addr.as_ref(),
            Self::Connect(r) => r.addr.as_ref(),
            Self::SendTo(r) => r.dest_addr.as_ref(),
            _ => None,
        }
    }

    /// Whether the call can block indefinitely on a native event.
    pub fn may_block(&self) -> bool {
        matches!(self, Self::Accept(_) | Self::Recv(_) | Self::Connect(_))
    }
}

/// Why a request line could not be turned into a [`Call`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(serde_json::Error),
    #[error("missing or non-integer request id")]
    MissingId,
    #[error("{0}")]
    Shape(serde_json::Error),
}

/// A request line that was rejected before dispatch.
#[derive(Debug)]
pub struct RejectedRequest {
    /// Present when the line was valid JSON with an integer `id`.
    pub id: Option<u64>,
    pub error: ProtocolError,
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    pub id: u64,
    pub call: Call,
}

impl RpcRequest {
    pub fn new(id: u64, call: Call) -> Self {
        Self { id, call }
    }

    /// Parses one request line.
    pub fn parse(line: &str) -> Result<Self, RejectedRequest> {
        let value: serde_json::Value = serde_json::from_str(line).map_err(|e| RejectedRequest {
            id: None,
            error: ProtocolError::Json(e),
        })?;
        let id = value.get("id").and_then(serde_json::Value::as_u64);
        let call = serde_json::from_value::<Call>(value).map_err(|e| RejectedRequest {
            id,
            error: ProtocolError::Shape(e),
        })?;
        let id = id.ok_or(RejectedRequest {
            id: None,
            error: ProtocolError::MissingId,
        })?;
        Ok(Self { id, call })
    }

    /// Serializes to one request line (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(&self.call)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("id".to_string(), self.id.into());
        }
        serde_json::to_string(&value)
    }
}

/// Transport-level status. Native failures are always `Ok` with a negative
/// `ret`; only request-shape problems use `InvalidArgument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    InvalidArgument,
    /// The server could not schedule the call.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Option<u64>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SyscallResult>,
}

impl RpcResponse {
    #[must_use]
    pub fn ok(id: u64, result: SyscallResult) -> Self {
        Self {
            id: Some(id),
            status: Status::Ok,
            message: None,
            result: Some(result),
        }
    }

    #[must_use]
    pub fn invalid_argument(id: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            id,
            status: Status::InvalidArgument,
            message: Some(message.into()),
            result: None,
        }
    }

    #[must_use]
    pub fn unavailable(id: u64, message: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            status: Status::Unavailable,
            message: Some(message.into()),
            result: None,
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
