//! NSE shared API types
//!
//! This crate provides the POSIX-flavoured types and constants shared
//! between the emulation core and code driving simulated processes:
//!
//! - **Poll/Epoll types** (`posix`): event masks, `PollFd`, `EpollEvent`,
//!   `FdSet` and its helpers, control-operation constants
//! - **Error numbers** (`errno`): the POSIX errno values surfaced through
//!   the per-process error slot
//!
//! Everything here is plain data; the behavior lives in the `emu` crate.

#![no_std]

pub mod errno;
pub mod posix;
