//! Level-triggered multiplexer
//!
//! `sys_poll` is the blocking primitive the epoll and select emulations
//! are built on. One scan reports the conditions holding right now; if
//! nothing is ready and a wait is allowed, the caller parks on its
//! per-process wake channel after subscribing it to every polled file,
//! then rescans once on resume.
//!
//! The contract is single-shot: a wakeup with nothing ready (for
//! example the caller's epoll instance being closed under it) returns
//! 0. Callers own any retry policy.

use std::rc::Rc;

use nse_api::posix::{PollEvents, PollFd};

use crate::file::FileObject;
use crate::process::Pid;
use crate::sched::WaitResult;
use crate::sim::Sim;
use crate::syscalls::fail;

/// Fill `revents` for every slot, returning how many slots are ready
///
/// Error, Hangup, and Priority are reported regardless of the requested
/// mask. A slot whose descriptor does not resolve reports `NVAL` and
/// counts as ready.
pub(crate) fn poll_scan(sim: &Sim, pid: Pid, fds: &mut [PollFd]) -> i32 {
    let mut ready = 0;
    for pfd in fds.iter_mut() {
        pfd.revents = PollEvents::empty();
        let file = match sim.proc(pid).and_then(|proc| proc.fd_lookup(pfd.fd)) {
            Ok(file) => file,
            Err(_) => {
                pfd.revents = PollEvents::NVAL;
                ready += 1;
                continue;
            }
        };
        pfd.revents = file.poll_mask() & (pfd.events | PollEvents::ALWAYS_REPORTED);
        if !pfd.revents.is_empty() {
            ready += 1;
        }
    }
    ready
}

/// Wait for readiness on a set of descriptors
///
/// `timeout` in virtual milliseconds: negative blocks until a wakeup,
/// zero scans once, positive bounds the wait. Returns the number of
/// ready slots, 0 on timeout.
pub fn sys_poll(sim: &mut Sim, pid: Pid, fds: &mut [PollFd], timeout: i32) -> i32 {
    log::trace!("sys_poll pid={pid} nfds={} timeout={timeout}", fds.len());

    let ready = poll_scan(sim, pid, fds);
    if ready > 0 || timeout == 0 {
        return ready;
    }

    let chan = match sim.proc(pid).map(|proc| proc.wait_chan()) {
        Ok(chan) => chan,
        Err(err) => return fail(sim, pid, err),
    };
    let deadline = if timeout < 0 {
        None
    } else {
        Some(sim.now() + timeout as u64)
    };

    // Pin every open slot and subscribe the wake channel to anything
    // that could make its revents non-empty.
    let mut watched: Vec<Rc<dyn FileObject>> = Vec::new();
    for pfd in fds.iter() {
        if let Ok(file) = sim.proc(pid).and_then(|proc| proc.fd_lookup(pfd.fd)) {
            file.subscribe(pfd.events | PollEvents::ALWAYS_REPORTED, chan);
            watched.push(file);
        }
    }

    let res = sim.block_on(chan, deadline);
    for file in &watched {
        file.unsubscribe(chan);
    }

    match res {
        WaitResult::TimedOut => 0,
        WaitResult::Stalled => {
            log::warn!("sys_poll pid={pid} woke with a quiesced event queue");
            0
        }
        WaitResult::Woken => poll_scan(sim, pid, fds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscalls::fd::{sys_close, sys_pipe, sys_read, sys_write};

    fn pipe(sim: &mut Sim, pid: Pid) -> (i32, i32) {
        let mut fds = [0; 2];
        assert_eq!(sys_pipe(sim, pid, &mut fds), 0);
        (fds[0], fds[1])
    }

    #[test]
    fn scan_reports_level_triggered_readiness() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (rfd, wfd) = pipe(&mut sim, pid);
        sys_write(&mut sim, pid, wfd, b"x");

        let mut fds = [PollFd {
            fd: rfd,
            events: PollEvents::IN,
            revents: PollEvents::empty(),
        }];
        // Still true on every scan until the data is consumed.
        assert_eq!(sys_poll(&mut sim, pid, &mut fds, 0), 1);
        assert_eq!(sys_poll(&mut sim, pid, &mut fds, 0), 1);
        assert_eq!(fds[0].revents, PollEvents::IN);

        let mut buf = [0u8; 4];
        sys_read(&mut sim, pid, rfd, &mut buf);
        assert_eq!(sys_poll(&mut sim, pid, &mut fds, 0), 0);
        assert_eq!(fds[0].revents, PollEvents::empty());
    }

    #[test]
    fn unknown_descriptor_reports_nval() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let mut fds = [PollFd {
            fd: 33,
            events: PollEvents::IN,
            revents: PollEvents::empty(),
        }];
        assert_eq!(sys_poll(&mut sim, pid, &mut fds, -1), 1);
        assert_eq!(fds[0].revents, PollEvents::NVAL);
    }

    #[test]
    fn hangup_reported_without_being_requested() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (rfd, wfd) = pipe(&mut sim, pid);
        sys_close(&mut sim, pid, wfd);

        let mut fds = [PollFd {
            fd: rfd,
            events: PollEvents::IN,
            revents: PollEvents::empty(),
        }];
        assert_eq!(sys_poll(&mut sim, pid, &mut fds, 0), 1);
        assert_eq!(fds[0].revents, PollEvents::HUP);
    }

    #[test]
    fn timeout_elapses_in_virtual_time() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (rfd, _wfd) = pipe(&mut sim, pid);
        let mut fds = [PollFd {
            fd: rfd,
            events: PollEvents::IN,
            revents: PollEvents::empty(),
        }];
        assert_eq!(sys_poll(&mut sim, pid, &mut fds, 250), 0);
        assert_eq!(sim.now(), 250);
    }

    #[test]
    fn blocked_poll_wakes_on_write() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (rfd, wfd) = pipe(&mut sim, pid);
        sim.schedule_in(30, move |sim| {
            sys_write(sim, pid, wfd, b"go");
        });
        let mut fds = [PollFd {
            fd: rfd,
            events: PollEvents::IN,
            revents: PollEvents::empty(),
        }];
        assert_eq!(sys_poll(&mut sim, pid, &mut fds, -1), 1);
        assert_eq!(fds[0].revents, PollEvents::IN);
        assert_eq!(sim.now(), 30);
    }

    #[test]
    fn quiesced_queue_unblocks_with_zero() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (rfd, _wfd) = pipe(&mut sim, pid);
        let mut fds = [PollFd {
            fd: rfd,
            events: PollEvents::IN,
            revents: PollEvents::empty(),
        }];
        assert_eq!(sys_poll(&mut sim, pid, &mut fds, -1), 0);
    }
}
