//! Select emulation
//!
//! A thin adapter translating fd_set triples into a poll request,
//! reusing `sys_poll` for the scan and the blocking, then rewriting the
//! sets in place. Read membership covers Readable, Hangup, and Error;
//! write membership covers Writable and Error; the exceptional set
//! covers Priority.

use nse_api::posix::{fd_isset, fd_set, fd_zero, FdSet, PollEvents, PollFd, RawFd, FD_SETSIZE};

use crate::process::Pid;
use crate::sim::Sim;
use crate::syscalls::poll::sys_poll;
use crate::syscalls::{fail, SysError};

/// Wait for readiness on up to three descriptor sets
///
/// `timeout` follows `sys_poll`: negative blocks, zero scans once,
/// positive bounds the wait in virtual milliseconds. On timeout all
/// sets are cleared and 0 is returned.
pub fn sys_select<'a>(
    sim: &mut Sim,
    pid: Pid,
    nfds: i32,
    mut readfds: Option<&'a mut FdSet>,
    mut writefds: Option<&'a mut FdSet>,
    mut exceptfds: Option<&'a mut FdSet>,
    timeout: i32,
) -> i32 {
    log::trace!("sys_select pid={pid} nfds={nfds} timeout={timeout}");
    if nfds < 0 || nfds as usize > FD_SETSIZE {
        return fail(sim, pid, SysError::InvalidArgument);
    }

    let mut requests: Vec<PollFd> = Vec::new();
    for fd in 0..nfds as RawFd {
        let mut events = PollEvents::empty();
        if readfds.as_deref().is_some_and(|set| fd_isset(set, fd)) {
            events |= PollEvents::IN;
        }
        if writefds.as_deref().is_some_and(|set| fd_isset(set, fd)) {
            events |= PollEvents::OUT;
        }
        if exceptfds.as_deref().is_some_and(|set| fd_isset(set, fd)) {
            events |= PollEvents::PRI;
        }
        if !events.is_empty() {
            requests.push(PollFd {
                fd,
                events,
                revents: PollEvents::empty(),
            });
        }
    }

    let ret = sys_poll(sim, pid, &mut requests, timeout);

    for set in [&mut readfds, &mut writefds, &mut exceptfds] {
        if let Some(set) = set.as_deref_mut() {
            fd_zero(set);
        }
    }
    if ret <= 0 {
        return ret;
    }

    // Membership in each set was encoded into the request mask, so only
    // descriptors the caller asked about in a given set reappear there.
    let mut count = 0;
    for pfd in &requests {
        if pfd.events.contains(PollEvents::IN)
            && pfd
                .revents
                .intersects(PollEvents::IN | PollEvents::HUP | PollEvents::ERR)
        {
            if let Some(set) = readfds.as_deref_mut() {
                fd_set(set, pfd.fd);
                count += 1;
            }
        }
        if pfd.events.contains(PollEvents::OUT)
            && pfd
                .revents
                .intersects(PollEvents::OUT | PollEvents::ERR)
        {
            if let Some(set) = writefds.as_deref_mut() {
                fd_set(set, pfd.fd);
                count += 1;
            }
        }
        if pfd.events.contains(PollEvents::PRI) && pfd.revents.contains(PollEvents::PRI) {
            if let Some(set) = exceptfds.as_deref_mut() {
                fd_set(set, pfd.fd);
                count += 1;
            }
        }
    }
    count
}
