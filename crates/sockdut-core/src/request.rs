//! Typed requests, one per exposed socket primitive.
//!
//! Field names follow the RPC surface. Every non-`Option` field is required:
//! a request missing one fails to deserialize and never reaches the OS.

use serde::{Deserialize, Serialize};

use crate::sockaddr::WireAddress;

/// `socket(domain, type, protocol)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketRequest {
    pub domain: i32,
    #[serde(rename = "type")]
    pub sock_type: i32,
    pub protocol: i32,
}

/// `bind(sockfd, addr)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRequest {
    pub sockfd: i32,
    #[serde(default)]
    pub addr: Option<WireAddress>,
}

/// `connect(sockfd, addr)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub sockfd: i32,
    #[serde(default)]
    pub addr: Option<WireAddress>,
}

/// `listen(sockfd, backlog)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenRequest {
    pub sockfd: i32,
    pub backlog: i32,
}

/// `accept(sockfd, &addr, &addrlen)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptRequest {
    pub sockfd: i32,
}

/// `getsockname(sockfd, &addr, &addrlen)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSockNameRequest {
    pub sockfd: i32,
}

/// `setsockopt` with opaque option bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSockOptRequest {
    pub sockfd: i32,
    pub level: i32,
    pub optname: i32,
    pub optval: Vec<u8>,
}

/// Seconds plus microseconds, as in `struct timeval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeval {
    pub seconds: i64,
    pub microseconds: i64,
}

/// `setsockopt` with a `struct timeval` option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSockOptTimevalRequest {
    pub sockfd: i32,
    pub level: i32,
    pub optname: i32,
    pub timeval: Timeval,
}

/// `getsockopt` into a buffer of `optlen` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSockOptRequest {
    pub sockfd: i32,
    pub level: i32,
    pub optname: i32,
    pub optlen: u32,
}

/// `recv(sockfd, buf, len, flags)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecvRequest {
    pub sockfd: i32,
    pub len: u32,
    pub flags: i32,
}

/// `send(sockfd, buf, len, flags)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub sockfd: i32,
    pub buf: Vec<u8>,
    pub flags: i32,
}

/// `sendto(sockfd, buf, len, flags, dest_addr)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToRequest {
    pub sockfd: i32,
    pub buf: Vec<u8>,
    pub flags: i32,
    #[serde(default)]
    pub dest_addr: Option<WireAddress>,
}

/// `shutdown(fd, how)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownRequest {
    pub fd: i32,
    pub how: i32,
}

/// `close(fd)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub fd: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_request_uses_type_key() {
        let req: SocketRequest =
            serde_json::from_str(r#"{"domain":2,"type":1,"protocol":0}"#).unwrap();
        assert_eq!(req.sock_type, 1);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        assert!(serde_json::from_str::<ListenRequest>(r#"{"sockfd":3}"#).is_err());
        assert!(serde_json::from_str::<RecvRequest>(r#"{"sockfd":3,"flags":0}"#).is_err());
    }

    #[test]
    fn absent_address_deserializes_as_none() {
        let req: BindRequest = serde_json::from_str(r#"{"sockfd":3}"#).unwrap();
        assert!(req.addr.is_none());
    }
}
