//! # sockdut-core
//!
//! Pure logic for the socket device-under-test server.
//!
//! This crate owns everything that can be expressed without touching the OS:
//! - [`sockaddr`]: bit-exact conversion between the family-tagged wire address
//!   and the native `sockaddr_in`/`sockaddr_in6` byte layout.
//! - [`request`]: one typed request per exposed socket primitive.
//! - [`result`]: the [`SyscallResult`] record returned for every dispatched call
//!   and the request-shape [`DispatchError`].
//! - [`socket`]: `<sys/socket.h>` constants used by callers and tests.
//!
//! Syscall invocations live in `sockdut-abi`. No `unsafe` code is permitted here.

#![deny(unsafe_code)]

pub mod request;
pub mod result;
pub mod sockaddr;
pub mod socket;

pub use result::{DispatchError, SyscallResult};
pub use sockaddr::{CodecError, In6Address, InAddress, NativeAddress, WireAddress};
