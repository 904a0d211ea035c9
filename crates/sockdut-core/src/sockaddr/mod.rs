//! Socket address codec.
//!
//! Converts between the family-tagged [`WireAddress`] carried over RPC and the
//! fixed-layout [`NativeAddress`] buffer consumed and produced by the OS
//! address APIs. All packing is explicit, field by field:
//!
//! ```text
//! sockaddr_in  (16 bytes)          sockaddr_in6 (28 bytes)
//! +0  u16 family   (host order)    +0  u16 family   (host order)
//! +2  u16 port     (network order) +2  u16 port     (network order)
//! +4  [u8; 4] addr                 +4  u32 flowinfo (network order)
//! +8  [u8; 8] zero                 +8  [u8; 16] addr
//!                                  +24 u32 scope_id (network order)
//! ```
//!
//! Wire integers are host-order values. Every port, flow-info and scope-id
//! crosses the host/network boundary exactly once per direction.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::socket::{
    AF_INET, AF_INET6, AF_UNSPEC, SOCKADDR_IN_LEN, SOCKADDR_IN6_LEN, SOCKADDR_STORAGE_LEN,
};

const FAMILY_OFFSET: usize = 0;
const PORT_OFFSET: usize = 2;
const IN_ADDR_OFFSET: usize = 4;
const IN6_FLOWINFO_OFFSET: usize = 4;
const IN6_ADDR_OFFSET: usize = 8;
const IN6_SCOPE_ID_OFFSET: usize = 24;

// ---------------------------------------------------------------------------
// Byte-order helpers
// ---------------------------------------------------------------------------

/// Converts a 16-bit value from host byte order to network byte order.
#[inline]
pub fn htons(v: u16) -> u16 {
    v.to_be()
}

/// Converts a 32-bit value from host byte order to network byte order.
#[inline]
pub fn htonl(v: u32) -> u32 {
    v.to_be()
}

/// Converts a 16-bit value from network byte order to host byte order.
#[inline]
pub fn ntohs(v: u16) -> u16 {
    u16::from_be(v)
}

/// Converts a 32-bit value from network byte order to host byte order.
#[inline]
pub fn ntohl(v: u32) -> u32 {
    u32::from_be(v)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Address conversion failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The wire address cannot be mapped to a native structure.
    #[error("{0}")]
    InvalidAddress(&'static str),
    /// The native family tag is neither `AF_INET` nor `AF_INET6`.
    #[error("unsupported address family {0}")]
    UnsupportedFamily(u16),
    /// The OS reported fewer bytes than the family's structure needs.
    #[error("{family} address truncated: {len} bytes, need {need}")]
    Truncated {
        family: &'static str,
        len: usize,
        need: usize,
    },
}

// ---------------------------------------------------------------------------
// Wire representation
// ---------------------------------------------------------------------------

/// IPv4 wire address. `addr` must hold exactly 4 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InAddress {
    pub family: u16,
    pub port: u16,
    pub addr: Vec<u8>,
}

/// IPv6 wire address. `addr` must hold exactly 16 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct In6Address {
    pub family: u16,
    pub port: u16,
    pub flowinfo: u32,
    pub addr: Vec<u8>,
    pub scope_id: u32,
}

/// Family-discriminated socket address as carried over the RPC transport.
///
/// Serialized as an internally tagged object, e.g.
/// `{"kind":"in","family":2,"port":80,"addr":[127,0,0,1]}`. A `kind` this
/// server does not know deserializes to [`WireAddress::Unknown`] so that the
/// rejection happens in [`decode`] rather than in the JSON layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireAddress {
    In(InAddress),
    In6(In6Address),
    #[serde(other)]
    Unknown,
}

impl WireAddress {
    /// Builds an IPv4 wire address.
    pub fn v4(ip: Ipv4Addr, port: u16) -> Self {
        Self::In(InAddress {
            family: AF_INET as u16,
            port,
            addr: ip.octets().to_vec(),
        })
    }

    /// Builds an IPv6 wire address.
    pub fn v6(ip: Ipv6Addr, port: u16, flowinfo: u32, scope_id: u32) -> Self {
        Self::In6(In6Address {
            family: AF_INET6 as u16,
            port,
            flowinfo,
            addr: ip.octets().to_vec(),
            scope_id,
        })
    }

    /// Port of either variant.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::In(a) => Some(a.port),
            Self::In6(a) => Some(a.port),
            Self::Unknown => None,
        }
    }

    /// `AF_*` constant of the variant.
    pub fn af(&self) -> Option<i32> {
        match self {
            Self::In(_) => Some(AF_INET),
            Self::In6(_) => Some(AF_INET6),
            Self::Unknown => None,
        }
    }

    /// Converts to a std socket address when the variant is well-formed.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::In(a) => {
                let octets: [u8; 4] = a.addr.as_slice().try_into().ok()?;
                Some(SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::from(octets),
                    a.port,
                )))
            }
            Self::In6(a) => {
                let octets: [u8; 16] = a.addr.as_slice().try_into().ok()?;
                Some(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(octets),
                    a.port,
                    a.flowinfo,
                    a.scope_id,
                )))
            }
            Self::Unknown => None,
        }
    }
}

impl From<SocketAddr> for WireAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::v4(*v4.ip(), v4.port()),
            SocketAddr::V6(v6) => Self::v6(*v6.ip(), v6.port(), v6.flowinfo(), v6.scope_id()),
        }
    }
}

impl fmt::Display for WireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_socket_addr() {
            Some(addr) => write!(f, "{addr}"),
            None => f.write_str("<invalid sockaddr>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Native representation
// ---------------------------------------------------------------------------

#[repr(C, align(8))]
#[derive(Clone, Copy)]
struct Storage([u8; SOCKADDR_STORAGE_LEN]);

/// `sockaddr_storage`-sized buffer plus the length the OS reported or needs.
///
/// Lives on the stack of a single dispatch call. The pointer accessors exist
/// so the ABI layer can hand the buffer to `bind`/`accept`/`getsockname`.
#[derive(Clone, Copy)]
pub struct NativeAddress {
    storage: Storage,
    len: usize,
}

impl NativeAddress {
    /// Storage capacity in bytes.
    pub const CAPACITY: usize = SOCKADDR_STORAGE_LEN;

    /// Zeroed buffer with length 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Storage([0; SOCKADDR_STORAGE_LEN]),
            len: 0,
        }
    }

    /// Zeroed buffer whose length is the full capacity, ready to be passed as
    /// an output parameter.
    #[must_use]
    pub fn for_output() -> Self {
        Self {
            len: Self::CAPACITY,
            ..Self::new()
        }
    }

    /// Copies raw native bytes; anything beyond the capacity is dropped.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut native = Self::new();
        let n = bytes.len().min(Self::CAPACITY);
        native.storage.0[..n].copy_from_slice(&bytes[..n]);
        native.len = n;
        native
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sets the valid length, clamped to the capacity.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(Self::CAPACITY);
    }

    /// The valid prefix of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage.0[..self.len]
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.storage.0.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.storage.0.as_mut_ptr()
    }

    /// Native family tag, or `AF_UNSPEC` when the length cannot hold one.
    pub fn family(&self) -> u16 {
        if self.len < 2 {
            return AF_UNSPEC as u16;
        }
        self.read_u16(FAMILY_OFFSET)
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) {
        self.storage.0[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_ne_bytes([self.storage.0[offset], self.storage.0[offset + 1]])
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let b = &self.storage.0[offset..offset + 4];
        u32::from_ne_bytes([b[0], b[1], b[2], b[3]])
    }

    fn read_array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.storage.0[offset..offset + N]);
        out
    }
}

impl Default for NativeAddress {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NativeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAddress")
            .field("family", &self.family())
            .field("len", &self.len)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Packs a wire address into its native structure.
///
/// The family tag is the variant's own constant; the wire `family` field is
/// informational. Fails with [`CodecError::InvalidAddress`] for an unknown
/// variant or an address of the wrong width.
pub fn decode(wire: &WireAddress) -> Result<NativeAddress, CodecError> {
    let mut native = NativeAddress::new();
    match wire {
        WireAddress::In(a) => {
            let octets: [u8; 4] = a
                .addr
                .as_slice()
                .try_into()
                .map_err(|_| CodecError::InvalidAddress("IPv4 address must be 4 bytes"))?;
            native.put(FAMILY_OFFSET, &(AF_INET as u16).to_ne_bytes());
            native.put(PORT_OFFSET, &htons(a.port).to_ne_bytes());
            native.put(IN_ADDR_OFFSET, &octets);
            native.len = SOCKADDR_IN_LEN;
        }
        WireAddress::In6(a) => {
            let octets: [u8; 16] = a
                .addr
                .as_slice()
                .try_into()
                .map_err(|_| CodecError::InvalidAddress("IPv6 address must be 16 bytes"))?;
            native.put(FAMILY_OFFSET, &(AF_INET6 as u16).to_ne_bytes());
            native.put(PORT_OFFSET, &htons(a.port).to_ne_bytes());
            native.put(IN6_FLOWINFO_OFFSET, &htonl(a.flowinfo).to_ne_bytes());
            native.put(IN6_ADDR_OFFSET, &octets);
            native.put(IN6_SCOPE_ID_OFFSET, &htonl(a.scope_id).to_ne_bytes());
            native.len = SOCKADDR_IN6_LEN;
        }
        WireAddress::Unknown => return Err(CodecError::InvalidAddress("Unknown Sockaddr")),
    }
    Ok(native)
}

/// Unpacks a native structure of `native.len()` valid bytes.
pub fn encode(native: &NativeAddress) -> Result<WireAddress, CodecError> {
    let family = native.family();
    match i32::from(family) {
        AF_INET => {
            require_len(native, "AF_INET", SOCKADDR_IN_LEN)?;
            Ok(WireAddress::In(InAddress {
                family,
                port: ntohs(native.read_u16(PORT_OFFSET)),
                addr: native.read_array::<4>(IN_ADDR_OFFSET).to_vec(),
            }))
        }
        AF_INET6 => {
            require_len(native, "AF_INET6", SOCKADDR_IN6_LEN)?;
            Ok(WireAddress::In6(In6Address {
                family,
                port: ntohs(native.read_u16(PORT_OFFSET)),
                flowinfo: ntohl(native.read_u32(IN6_FLOWINFO_OFFSET)),
                addr: native.read_array::<16>(IN6_ADDR_OFFSET).to_vec(),
                scope_id: ntohl(native.read_u32(IN6_SCOPE_ID_OFFSET)),
            }))
        }
        _ => Err(CodecError::UnsupportedFamily(family)),
    }
}

fn require_len(native: &NativeAddress, family: &'static str, need: usize) -> Result<(), CodecError> {
    if native.len() < need {
        return Err(CodecError::Truncated {
            family,
            len: native.len(),
            need,
        });
    }
    Ok(())
}
