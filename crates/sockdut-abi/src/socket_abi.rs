//! Dispatch of `<sys/socket.h>` primitives.
//!
//! One function per primitive. Native failures come back as `ret < 0` with
//! `errno` set; only request-shape problems (missing or malformed address)
//! produce a [`DispatchError`], and those never reach the kernel.

use std::ffi::c_int;

use sockdut_core::request::{
    AcceptRequest, BindRequest, CloseRequest, ConnectRequest, GetSockNameRequest,
    GetSockOptRequest, ListenRequest, RecvRequest, SendRequest, SendToRequest,
    SetSockOptRequest, SetSockOptTimevalRequest, ShutdownRequest, SocketRequest, Timeval,
};
use sockdut_core::sockaddr::{self, NativeAddress, WireAddress};
use sockdut_core::{DispatchError, SyscallResult};

#[inline]
fn last_host_errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Wraps a native return value. Must be called before anything else can
/// touch the thread's errno.
#[inline]
fn syscall_result(ret: i64) -> SyscallResult {
    let errno = if ret < 0 { last_host_errno() } else { 0 };
    SyscallResult::new(ret, errno)
}

fn decode_required(addr: Option<&WireAddress>) -> Result<NativeAddress, DispatchError> {
    let wire = addr.ok_or(DispatchError::MissingAddress)?;
    Ok(sockaddr::decode(wire)?)
}

#[inline]
fn sockaddr_ptr(native: &NativeAddress) -> *const libc::sockaddr {
    native.as_ptr().cast()
}

#[inline]
fn socklen(len: usize) -> libc::socklen_t {
    len as libc::socklen_t
}

/// Runs an address-returning call (`accept`, `getsockname`) and encodes the
/// address the kernel wrote, if the call succeeded.
fn with_out_address(
    call: impl FnOnce(*mut libc::sockaddr, *mut libc::socklen_t) -> c_int,
) -> SyscallResult {
    let mut native = NativeAddress::for_output();
    let mut addrlen = socklen(NativeAddress::CAPACITY);
    let result = syscall_result(call(native.as_mut_ptr().cast(), &raw mut addrlen).into());
    if result.failed() {
        return result;
    }
    native.set_len(addrlen as usize);
    result.with_addr(sockaddr::encode(&native))
}

// ---------------------------------------------------------------------------
// socket
// ---------------------------------------------------------------------------

pub fn socket(req: &SocketRequest) -> SyscallResult {
    let fd = unsafe { libc::socket(req.domain, req.sock_type, req.protocol) };
    syscall_result(fd.into())
}

// ---------------------------------------------------------------------------
// bind / connect
// ---------------------------------------------------------------------------

pub fn bind(req: &BindRequest) -> Result<SyscallResult, DispatchError> {
    let native = decode_required(req.addr.as_ref())?;
    // SAFETY: `native` holds `native.len()` initialized bytes of a sockaddr.
    let rc = unsafe { libc::bind(req.sockfd, sockaddr_ptr(&native), socklen(native.len())) };
    Ok(syscall_result(rc.into()))
}

pub fn connect(req: &ConnectRequest) -> Result<SyscallResult, DispatchError> {
    let native = decode_required(req.addr.as_ref())?;
    // SAFETY: `native` holds `native.len()` initialized bytes of a sockaddr.
    let rc = unsafe { libc::connect(req.sockfd, sockaddr_ptr(&native), socklen(native.len())) };
    Ok(syscall_result(rc.into()))
}

// ---------------------------------------------------------------------------
// listen / accept / getsockname
// ---------------------------------------------------------------------------

pub fn listen(req: &ListenRequest) -> SyscallResult {
    let rc = unsafe { libc::listen(req.sockfd, req.backlog) };
    syscall_result(rc.into())
}

/// Blocks until a connection arrives on `req.sockfd` or the call fails.
pub fn accept(req: &AcceptRequest) -> SyscallResult {
    // SAFETY: the buffer and length come from a live `NativeAddress`.
    with_out_address(|addr, addrlen| unsafe { libc::accept(req.sockfd, addr, addrlen) })
}

pub fn getsockname(req: &GetSockNameRequest) -> SyscallResult {
    // SAFETY: the buffer and length come from a live `NativeAddress`.
    with_out_address(|addr, addrlen| unsafe { libc::getsockname(req.sockfd, addr, addrlen) })
}

// ---------------------------------------------------------------------------
// socket options
// ---------------------------------------------------------------------------

/// Applies `optval` verbatim.
pub fn setsockopt(req: &SetSockOptRequest) -> SyscallResult {
    let rc = unsafe {
        libc::setsockopt(
            req.sockfd,
            req.level,
            req.optname,
            req.optval.as_ptr().cast(),
            socklen(req.optval.len()),
        )
    };
    syscall_result(rc.into())
}

fn native_timeval(tv: &Timeval) -> Result<libc::timeval, DispatchError> {
    Ok(libc::timeval {
        tv_sec: libc::time_t::try_from(tv.seconds)
            .map_err(|_| DispatchError::TimevalOutOfRange("seconds"))?,
        tv_usec: libc::suseconds_t::try_from(tv.microseconds)
            .map_err(|_| DispatchError::TimevalOutOfRange("microseconds"))?,
    })
}

/// Applies a `struct timeval` option. Fields that do not fit the host's
/// `time_t`/`suseconds_t` are a request-shape error.
pub fn setsockopt_timeval(req: &SetSockOptTimevalRequest) -> Result<SyscallResult, DispatchError> {
    let tv = native_timeval(&req.timeval)?;
    let rc = unsafe {
        libc::setsockopt(
            req.sockfd,
            req.level,
            req.optname,
            (&raw const tv).cast(),
            socklen(std::mem::size_of::<libc::timeval>()),
        )
    };
    Ok(syscall_result(rc.into()))
}

/// Reads an option into a buffer of `req.optlen` bytes and returns the prefix
/// the kernel reports as written.
pub fn getsockopt(req: &GetSockOptRequest) -> SyscallResult {
    let mut buf = vec![0u8; req.optlen as usize];
    let mut optlen = socklen(buf.len());
    let rc = unsafe {
        libc::getsockopt(
            req.sockfd,
            req.level,
            req.optname,
            buf.as_mut_ptr().cast(),
            &mut optlen,
        )
    };
    let result = syscall_result(rc.into());
    if result.failed() {
        buf.clear();
    } else {
        buf.truncate(optlen as usize);
    }
    result.with_data(buf)
}

// ---------------------------------------------------------------------------
// data transfer
// ---------------------------------------------------------------------------

/// Receives up to `req.len` bytes. The data field holds exactly the bytes
/// received; a zero or negative return yields an empty sequence.
pub fn recv(req: &RecvRequest) -> SyscallResult {
    let mut buf = vec![0u8; req.len as usize];
    let n = unsafe { libc::recv(req.sockfd, buf.as_mut_ptr().cast(), buf.len(), req.flags) };
    let result = syscall_result(n as i64);
    let received = usize::try_from(n).unwrap_or(0).min(buf.len());
    buf.truncate(received);
    result.with_data(buf)
}

pub fn send(req: &SendRequest) -> SyscallResult {
    let n = unsafe { libc::send(req.sockfd, req.buf.as_ptr().cast(), req.buf.len(), req.flags) };
    syscall_result(n as i64)
}

pub fn sendto(req: &SendToRequest) -> Result<SyscallResult, DispatchError> {
    let native = decode_required(req.dest_addr.as_ref())?;
    let n = unsafe {
        libc::sendto(
            req.sockfd,
            req.buf.as_ptr().cast(),
            req.buf.len(),
            req.flags,
            sockaddr_ptr(&native),
            socklen(native.len()),
        )
    };
    Ok(syscall_result(n as i64))
}

// ---------------------------------------------------------------------------
// shutdown / close
// ---------------------------------------------------------------------------

pub fn shutdown(req: &ShutdownRequest) -> SyscallResult {
    let rc = unsafe { libc::shutdown(req.fd, req.how) };
    syscall_result(rc.into())
}

pub fn close(req: &CloseRequest) -> SyscallResult {
    let rc = unsafe { libc::close(req.fd) };
    syscall_result(rc.into())
}
