//! Maps parsed calls onto dispatcher operations.

use sockdut_abi::socket_abi;
use sockdut_core::{DispatchError, SyscallResult};

use crate::protocol::{Call, RpcRequest, RpcResponse};

/// Runs one call. `Err` means the request could not be mapped to a syscall;
/// native failures are inside the `Ok` result.
pub fn route(call: &Call) -> Result<SyscallResult, DispatchError> {
    match call {
        Call::Socket(req) => Ok(socket_abi::socket(req)),
        Call::Bind(req) => socket_abi::bind(req),
        Call::Listen(req) => Ok(socket_abi::listen(req)),
        Call::Accept(req) => Ok(socket_abi::accept(req)),
        Call::GetSockName(req) => Ok(socket_abi::getsockname(req)),
        Call::SetSockOpt(req) => Ok(socket_abi::setsockopt(req)),
        Call::SetSockOptTimeval(req) => socket_abi::setsockopt_timeval(req),
        Call::GetSockOpt(req) => Ok(socket_abi::getsockopt(req)),
        Call::Connect(req) => socket_abi::connect(req),
        Call::Recv(req) => Ok(socket_abi::recv(req)),
        Call::Send(req) => Ok(socket_abi::send(req)),
        Call::SendTo(req) => socket_abi::sendto(req),
        Call::Shutdown(req) => Ok(socket_abi::shutdown(req)),
        Call::Close(req) => Ok(socket_abi::close(req)),
    }
}

/// Runs a parsed request and builds its response.
pub fn respond(request: &RpcRequest) -> RpcResponse {
    match route(&request.call) {
        Ok(result) => RpcResponse::ok(request.id, result),
        Err(err) => RpcResponse::invalid_argument(Some(request.id), err.to_string()),
    }
}

/// Parses and runs one request line. Used where no per-call thread is needed.
pub fn handle_line(line: &str) -> RpcResponse {
    match RpcRequest::parse(line) {
        Ok(request) => respond(&request),
        Err(rejected) => RpcResponse::invalid_argument(rejected.id, rejected.error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Status;

    #[test]
    fn native_failure_is_ok_status() {
        let response = handle_line(r#"{"id":1,"method":"Close","params":{"fd":-1}}"#);
        assert_eq!(response.status, Status::Ok);
        let result = response.result.unwrap();
        assert_eq!(result.ret, -1);
        assert_eq!(result.errno, libc::EBADF);
    }

    #[test]
    fn missing_address_is_invalid_argument() {
        let response = handle_line(r#"{"id":2,"method":"Bind","params":{"sockfd":3}}"#);
        assert_eq!(response.status, Status::InvalidArgument);
        assert_eq!(response.id, Some(2));
        assert_eq!(response.message.as_deref(), Some("Missing address"));
        assert!(response.result.is_none());
    }

    #[test]
    fn short_ipv4_address_is_invalid_argument() {
        let response = handle_line(
            r#"{"id":3,"method":"Connect","params":{"sockfd":3,"addr":{"kind":"in","family":2,"port":1,"addr":[1,2,3]}}}"#,
        );
        assert_eq!(response.status, Status::InvalidArgument);
        assert_eq!(
            response.message.as_deref(),
            Some("IPv4 address must be 4 bytes")
        );
    }

    #[test]
    fn unknown_sockaddr_kind_is_invalid_argument() {
        let response = handle_line(
            r#"{"id":4,"method":"SendTo","params":{"sockfd":3,"buf":[],"flags":0,"dest_addr":{"kind":"un"}}}"#,
        );
        assert_eq!(response.status, Status::InvalidArgument);
        assert_eq!(response.message.as_deref(), Some("Unknown Sockaddr"));
    }

    #[test]
    fn garbage_line_has_null_id() {
        let response = handle_line("\u{0}\u{1}");
        assert_eq!(response.status, Status::InvalidArgument);
        assert_eq!(response.id, None);
    }
}
