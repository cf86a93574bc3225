//! Epoll emulation entry points
//!
//! Maps the epoll trio onto the level-triggered multiplexer. The
//! registered-interest set lives in the instance's [`EpollFile`]; a
//! wait translates it into a poll request, parks in `sys_poll`, and on
//! a positive return re-scans every requested slot, expanding each
//! matched condition class into its own ready event.
//!
//! The emulation is level-triggered only: `ET` and `ONESHOT` interest
//! bits are accepted and ignored. Readable/Writable filtering happens in
//! the multiplexer (the translated request only carries registered
//! bits); Hangup, Error, and Priority are reported whenever present,
//! matching real epoll.

use std::rc::Rc;

use nse_api::posix::{
    EpollEvent, EpollEvents, PollEvents, PollFd, RawFd, EPOLL_CLOEXEC, EPOLL_CTL_ADD,
    EPOLL_CTL_DEL, EPOLL_CTL_MOD,
};

use crate::epoll_fd::EpollFile;
use crate::file::FileObject;
use crate::process::Pid;
use crate::sim::Sim;
use crate::syscalls::poll::sys_poll;
use crate::syscalls::{fail, SysError, SysResult};

/// Translate registered interest into a poll request mask
///
/// Only Readable and Writable cross the boundary; every other epoll bit
/// (priority, edge-trigger, oneshot) stays behind.
fn interest_to_poll(events: EpollEvents) -> PollEvents {
    let mut mask = PollEvents::empty();
    if events.contains(EpollEvents::IN) {
        mask |= PollEvents::IN;
    }
    if events.contains(EpollEvents::OUT) {
        mask |= PollEvents::OUT;
    }
    mask
}

/// Translate realized poll conditions back into epoll event bits
fn poll_to_epoll(revents: PollEvents) -> EpollEvents {
    let mut events = EpollEvents::empty();
    if revents.contains(PollEvents::IN) {
        events |= EpollEvents::IN;
    }
    if revents.contains(PollEvents::OUT) {
        events |= EpollEvents::OUT;
    }
    if revents.contains(PollEvents::ERR) {
        events |= EpollEvents::ERR;
    }
    if revents.contains(PollEvents::HUP) {
        events |= EpollEvents::HUP;
    }
    if revents.contains(PollEvents::PRI) {
        events |= EpollEvents::PRI;
    }
    events
}

/// Conditions folded into one read-class ready event
const READ_CLASS: PollEvents = PollEvents::IN
    .union(PollEvents::HUP)
    .union(PollEvents::ERR);

/// Create an epoll instance
///
/// `size` is a legacy capacity hint: accepted, ignored.
pub fn sys_epoll_create(sim: &mut Sim, pid: Pid, size: i32) -> RawFd {
    log::trace!("sys_epoll_create pid={pid} size={size}");
    let file = Rc::new(EpollFile::new());
    match sim
        .proc_mut(pid)
        .and_then(|proc| proc.fd_install(file))
    {
        Ok(fd) => fd,
        Err(err) => fail(sim, pid, err),
    }
}

/// Create an epoll instance, validating `flags`
pub fn sys_epoll_create1(sim: &mut Sim, pid: Pid, flags: i32) -> RawFd {
    if flags & !EPOLL_CLOEXEC != 0 {
        return fail(sim, pid, SysError::InvalidArgument);
    }
    sys_epoll_create(sim, pid, 0)
}

/// Resolve and pin `epfd`, requiring an epoll instance behind it
fn pin_epoll(sim: &Sim, pid: Pid, epfd: RawFd) -> SysResult<Rc<dyn FileObject>> {
    let file = sim.proc(pid)?.fd_lookup(epfd)?;
    if file.as_epoll().is_none() {
        return Err(SysError::InvalidArgument);
    }
    Ok(file)
}

/// Add, modify, or remove an interest registration
///
/// `event` may be `None` only for `EPOLL_CTL_DEL`. Unknown operations
/// succeed without effect, a deliberate laxity of this emulation.
pub fn sys_epoll_ctl(
    sim: &mut Sim,
    pid: Pid,
    epfd: RawFd,
    op: i32,
    fd: RawFd,
    event: Option<&EpollEvent>,
) -> i32 {
    log::trace!("sys_epoll_ctl pid={pid} epfd={epfd} op={op} fd={fd}");
    match do_epoll_ctl(sim, pid, epfd, op, fd, event) {
        Ok(()) => 0,
        Err(err) => fail(sim, pid, err),
    }
}

fn do_epoll_ctl(
    sim: &mut Sim,
    pid: Pid,
    epfd: RawFd,
    op: i32,
    fd: RawFd,
    event: Option<&EpollEvent>,
) -> SysResult<()> {
    let file = pin_epoll(sim, pid, epfd)?;
    let epoll = file.as_epoll().ok_or(SysError::InvalidArgument)?;
    if fd == epfd {
        return Err(SysError::InvalidArgument);
    }
    match op {
        EPOLL_CTL_ADD => {
            // The target must itself be an open descriptor.
            sim.proc(pid)?.fd_lookup(fd)?;
            let event = event.ok_or(SysError::InvalidArgument)?;
            // Copied by value: later caller mutation cannot alias the
            // stored record.
            epoll.register(fd, *event)
        }
        EPOLL_CTL_MOD => {
            let event = event.ok_or(SysError::InvalidArgument)?;
            epoll.modify(fd, *event)
        }
        EPOLL_CTL_DEL => epoll.deregister(fd),
        _ => {
            log::warn!("sys_epoll_ctl pid={pid} ignoring unknown op {op}");
            Ok(())
        }
    }
}

/// Wait for events on an epoll instance
///
/// Returns the number of ready events written to `events`, 0 on timeout
/// or when the instance is closed while the wait is blocked. A
/// descriptor satisfying several condition classes produces one event
/// per class, each consuming an output slot; the total is truncated at
/// `maxevents`.
pub fn sys_epoll_wait(
    sim: &mut Sim,
    pid: Pid,
    epfd: RawFd,
    events: &mut [EpollEvent],
    maxevents: i32,
    timeout: i32,
) -> i32 {
    log::trace!("sys_epoll_wait pid={pid} epfd={epfd} maxevents={maxevents} timeout={timeout}");
    match do_epoll_wait(sim, pid, epfd, events, maxevents, timeout) {
        Ok(n) => n,
        Err(err) => fail(sim, pid, err),
    }
}

fn do_epoll_wait(
    sim: &mut Sim,
    pid: Pid,
    epfd: RawFd,
    events: &mut [EpollEvent],
    maxevents: i32,
    timeout: i32,
) -> SysResult<i32> {
    if maxevents <= 0 || maxevents as usize > events.len() {
        return Err(SysError::InvalidArgument);
    }
    let file = pin_epoll(sim, pid, epfd)?;
    let epoll = file.as_epoll().ok_or(SysError::InvalidArgument)?;
    let chan = sim.proc(pid)?.wait_chan();
    // Single waiter slot: a concurrent wait on this instance is refused,
    // never silently overwritten.
    epoll.set_waiter(chan)?;

    let mut requests: Vec<PollFd> = epoll
        .interest_snapshot()
        .into_iter()
        .map(|(fd, ev)| PollFd {
            fd,
            events: interest_to_poll(ev.events),
            revents: PollEvents::empty(),
        })
        .collect();

    let ret = sys_poll(sim, pid, &mut requests, timeout);
    epoll.clear_waiter();

    if epoll.is_closed() {
        log::debug!("sys_epoll_wait pid={pid} woke because epfd={epfd} was closed");
        return Ok(0);
    }
    if ret <= 0 {
        // Timeout, or a multiplexer failure whose errno is already set.
        return Ok(ret);
    }

    let mut n = 0usize;
    let max = maxevents as usize;
    for pfd in &requests {
        if n == max {
            log::debug!("sys_epoll_wait pid={pid} output full at maxevents={maxevents}");
            break;
        }
        // Consult the live map: a registration removed by an event
        // callback while the wait was blocked reports nothing.
        let Some(reg) = epoll.lookup(pfd.fd) else {
            continue;
        };

        let read = pfd.revents & READ_CLASS;
        if !read.is_empty() {
            log::debug!("epoll woke up for read with {}", pfd.fd);
            events[n] = EpollEvent {
                events: poll_to_epoll(read),
                data: reg.data,
            };
            n += 1;
        }
        if n < max && pfd.revents.contains(PollEvents::OUT) {
            log::debug!("epoll woke up for write with {}", pfd.fd);
            events[n] = EpollEvent {
                events: EpollEvents::OUT,
                data: reg.data,
            };
            n += 1;
        }
        if n < max && pfd.revents.contains(PollEvents::PRI) {
            log::debug!("epoll woke up for other with {}", pfd.fd);
            events[n] = EpollEvent {
                events: EpollEvents::PRI,
                data: reg.data,
            };
            n += 1;
        }
    }
    Ok(n as i32)
}
