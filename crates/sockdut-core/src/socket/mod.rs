//! Socket constants.
//!
//! Linux `<sys/socket.h>` values the codec, the server log and the tests
//! refer to. The dispatcher never validates caller-supplied domains, types or
//! option names against these; they are passed to the OS verbatim.

// ---------------------------------------------------------------------------
// Address families (AF_*)
// ---------------------------------------------------------------------------

/// Unspecified address family.
pub const AF_UNSPEC: i32 = 0;
/// Unix domain sockets.
pub const AF_UNIX: i32 = 1;
/// IPv4 Internet protocols.
pub const AF_INET: i32 = 2;
/// IPv6 Internet protocols.
pub const AF_INET6: i32 = 10;

// ---------------------------------------------------------------------------
// Types, levels and options
// ---------------------------------------------------------------------------

/// Byte-stream socket.
pub const SOCK_STREAM: i32 = 1;

/// Shut down the writing side.
pub const SHUT_WR: i32 = 1;

/// Socket-level options (for `getsockopt`/`setsockopt`).
pub const SOL_SOCKET: i32 = 1;
/// Allow local address reuse.
pub const SO_REUSEADDR: i32 = 2;
/// Receive timeout.
pub const SO_RCVTIMEO: i32 = 20;

/// Block until the full amount of data is available.
pub const MSG_WAITALL: i32 = 256;

// ---------------------------------------------------------------------------
// Native address structure sizes
// ---------------------------------------------------------------------------

/// `sizeof(struct sockaddr_in)`.
pub const SOCKADDR_IN_LEN: usize = 16;
/// `sizeof(struct sockaddr_in6)`.
pub const SOCKADDR_IN6_LEN: usize = 28;
/// `sizeof(struct sockaddr_storage)`.
pub const SOCKADDR_STORAGE_LEN: usize = 128;

/// Short name of an address family for log output.
pub fn family_name(af: i32) -> &'static str {
    match af {
        AF_UNSPEC => "AF_UNSPEC",
        AF_UNIX => "AF_UNIX",
        AF_INET => "AF_INET",
        AF_INET6 => "AF_INET6",
        _ => "AF_?",
    }
}
