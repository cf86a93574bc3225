//! POSIX-compatible multiplexing types and constants
//!
//! The numeric values match Linux so traces read naturally next to real
//! strace output; nothing in the emulation depends on the exact numbers.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// Descriptor index inside a simulated process's table
pub type RawFd = i32;

// ============================================================================
// Poll
// ============================================================================

bitflags! {
    /// Level-triggered readiness conditions as reported by `sys_poll`
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PollEvents: i16 {
        /// There is data to read
        const IN = 0x0001;
        /// There is urgent/exceptional data
        const PRI = 0x0002;
        /// Writing now will not block
        const OUT = 0x0004;
        /// Error condition
        const ERR = 0x0008;
        /// Hung up
        const HUP = 0x0010;
        /// Invalid polling request
        const NVAL = 0x0020;
    }
}

impl PollEvents {
    /// Conditions reported in `revents` even when not requested
    pub const ALWAYS_REPORTED: PollEvents =
        PollEvents::ERR.union(PollEvents::HUP).union(PollEvents::PRI);
}

/// Poll request/result slot
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollFd {
    /// File descriptor
    pub fd: RawFd,
    /// Requested events
    pub events: PollEvents,
    /// Returned events
    pub revents: PollEvents,
}

const_assert_eq!(core::mem::size_of::<PollFd>(), 8);

// ============================================================================
// Epoll
// ============================================================================

bitflags! {
    /// Interest and readiness bits carried by [`EpollEvent`]
    ///
    /// Only `IN` and `OUT` are translated into poll interest by the
    /// emulation; `ET` and `ONESHOT` are accepted but ignored, the
    /// emulation is level-triggered regardless.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EpollEvents: u32 {
        const IN = 0x001;
        const PRI = 0x002;
        const OUT = 0x004;
        const ERR = 0x008;
        const HUP = 0x010;
        const ONESHOT = 1 << 30;
        const ET = 1 << 31;
    }
}

/// Interest record / ready event, copied by value across the boundary
///
/// `data` is opaque to the emulation and returned verbatim.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpollEvent {
    pub events: EpollEvents,
    pub data: u64,
}

const_assert_eq!(core::mem::size_of::<EpollEvent>(), 16);

/// Register the target descriptor
pub const EPOLL_CTL_ADD: i32 = 1;
/// Deregister the target descriptor
pub const EPOLL_CTL_DEL: i32 = 2;
/// Change the registration of the target descriptor
pub const EPOLL_CTL_MOD: i32 = 3;

/// The only flag `sys_epoll_create1` accepts
pub const EPOLL_CLOEXEC: i32 = 0o2000000;

// ============================================================================
// Select
// ============================================================================

/// Maximum number of file descriptors in an [`FdSet`]
pub const FD_SETSIZE: usize = 1024;

/// fd_set structure for `sys_select`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdSet {
    pub bits: [u64; FD_SETSIZE / 64],
}

impl Default for FdSet {
    fn default() -> Self {
        Self { bits: [0; FD_SETSIZE / 64] }
    }
}

#[inline]
pub fn fd_zero(set: &mut FdSet) {
    for b in set.bits.iter_mut() {
        *b = 0;
    }
}

#[inline]
pub fn fd_set(set: &mut FdSet, fd: RawFd) {
    if fd >= 0 && (fd as usize) < FD_SETSIZE {
        set.bits[(fd as usize) / 64] |= 1u64 << ((fd as usize) % 64);
    }
}

#[inline]
pub fn fd_clr(set: &mut FdSet, fd: RawFd) {
    if fd >= 0 && (fd as usize) < FD_SETSIZE {
        set.bits[(fd as usize) / 64] &= !(1u64 << ((fd as usize) % 64));
    }
}

#[inline]
pub fn fd_isset(set: &FdSet, fd: RawFd) -> bool {
    if fd >= 0 && (fd as usize) < FD_SETSIZE {
        set.bits[(fd as usize) / 64] & (1u64 << ((fd as usize) % 64)) != 0
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fd_set_helpers_round_trip() {
        let mut set = FdSet::default();
        assert!(!fd_isset(&set, 5));
        fd_set(&mut set, 5);
        fd_set(&mut set, 64);
        assert!(fd_isset(&set, 5));
        assert!(fd_isset(&set, 64));
        fd_clr(&mut set, 5);
        assert!(!fd_isset(&set, 5));
        assert!(fd_isset(&set, 64));
        fd_zero(&mut set);
        assert!(!fd_isset(&set, 64));
    }

    #[test]
    fn fd_set_ignores_out_of_range() {
        let mut set = FdSet::default();
        fd_set(&mut set, -1);
        fd_set(&mut set, FD_SETSIZE as RawFd);
        assert_eq!(set, FdSet::default());
        assert!(!fd_isset(&set, -1));
    }

    #[test]
    fn always_reported_covers_err_hup_pri() {
        assert!(PollEvents::ALWAYS_REPORTED.contains(PollEvents::ERR));
        assert!(PollEvents::ALWAYS_REPORTED.contains(PollEvents::HUP));
        assert!(PollEvents::ALWAYS_REPORTED.contains(PollEvents::PRI));
        assert!(!PollEvents::ALWAYS_REPORTED.contains(PollEvents::IN));
        assert!(!PollEvents::ALWAYS_REPORTED.contains(PollEvents::OUT));
    }
}
