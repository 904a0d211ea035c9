//! Result plumbing shared by every dispatched call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sockaddr::{CodecError, WireAddress};

/// Outcome of one native socket call.
///
/// `errno` is only meaningful when `ret` signals failure under the
/// primitive's own convention (negative for every primitive exposed here);
/// it is 0 otherwise. Callers inspect both fields together.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyscallResult {
    /// Native return value (new fd, byte count, or 0/-1 status).
    pub ret: i64,
    /// OS error code captured immediately after the call.
    pub errno: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<WireAddress>,
    /// Why `addr` is absent even though the call succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

impl SyscallResult {
    #[must_use]
    pub fn new(ret: i64, errno: i32) -> Self {
        Self {
            ret,
            errno,
            ..Self::default()
        }
    }

    /// Attach an encoded address, or record why it could not be encoded.
    #[must_use]
    pub fn with_addr(mut self, addr: Result<WireAddress, CodecError>) -> Self {
        match addr {
            Ok(addr) => self.addr = Some(addr),
            Err(err) => self.addr_error = Some(err.to_string()),
        }
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn failed(&self) -> bool {
        self.ret < 0
    }
}

/// Request-shape error: the call cannot be mapped to a syscall at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Missing address")]
    MissingAddress,
    #[error(transparent)]
    InvalidAddress(#[from] CodecError),
    /// A `Timeval` field does not fit the host's `struct timeval`.
    #[error("timeval {0} out of range")]
    TimevalOutOfRange(&'static str),
}
