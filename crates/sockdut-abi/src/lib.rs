//! # sockdut-abi
//!
//! The OS boundary of the socket DUT server.
//!
//! Each function in [`socket_abi`] takes one typed request from
//! `sockdut-core`, performs exactly one native socket call through `libc`,
//! and reports the raw return value and errno in a [`SyscallResult`].
//!
//! ```text
//! request -> decode address (if any) -> libc call -> errno capture -> encode address (if any)
//! ```
//!
//! Nothing here retries, reinterprets errors, or tracks descriptors. Invalid
//! handles go straight to the kernel, which reports `EBADF` like it would for
//! a local program.
//!
//! [`SyscallResult`]: sockdut_core::SyscallResult

pub mod socket_abi;
