//! Epoll instance file object
//!
//! An [`EpollFile`] owns the registered-interest map and the single
//! waiter slot of one epoll instance. The entry points in
//! `syscalls::epoll` drive it; this module only holds state and the
//! file-object behavior of the instance itself.
//!
//! Closing the descriptor wakes a blocked waiter instead of leaving it
//! suspended forever. Stream and socket operations on an epoll
//! descriptor are rejected with the code matching the operation class.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use nse_api::posix::{EpollEvent, PollEvents, RawFd};

use crate::file::FileObject;
use crate::process::Pid;
use crate::sched::{Chan, WaitResult};
use crate::sim::Sim;
use crate::syscalls::{SysError, SysResult};

pub struct EpollFile {
    // watched descriptor -> interest record, ascending order fixes the
    // readiness reporting order
    interest: RefCell<BTreeMap<RawFd, EpollEvent>>,
    // at most one blocked caller, identified by its wake channel
    waiter: Cell<Option<Chan>>,
    closed: Cell<bool>,
}

impl EpollFile {
    pub fn new() -> Self {
        Self {
            interest: RefCell::new(BTreeMap::new()),
            waiter: Cell::new(None),
            closed: Cell::new(false),
        }
    }

    /// Store a new interest record; the target must not be registered yet
    pub fn register(&self, fd: RawFd, event: EpollEvent) -> SysResult<()> {
        let mut interest = self.interest.borrow_mut();
        if interest.contains_key(&fd) {
            return Err(SysError::FileExists);
        }
        interest.insert(fd, event);
        Ok(())
    }

    /// Overwrite the interest record of a registered target
    pub fn modify(&self, fd: RawFd, event: EpollEvent) -> SysResult<()> {
        match self.interest.borrow_mut().get_mut(&fd) {
            Some(stored) => {
                *stored = event;
                Ok(())
            }
            None => Err(SysError::NotFound),
        }
    }

    /// Drop the interest record of a registered target
    pub fn deregister(&self, fd: RawFd) -> SysResult<()> {
        match self.interest.borrow_mut().remove(&fd) {
            Some(_) => Ok(()),
            None => Err(SysError::NotFound),
        }
    }

    /// Current registration for `fd`, copied out
    pub fn lookup(&self, fd: RawFd) -> Option<EpollEvent> {
        self.interest.borrow().get(&fd).copied()
    }

    /// Snapshot of the interest map in ascending descriptor order
    pub fn interest_snapshot(&self) -> Vec<(RawFd, EpollEvent)> {
        self.interest
            .borrow()
            .iter()
            .map(|(&fd, &ev)| (fd, ev))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Claim the waiter slot for the caller parked on `chan`
    pub(crate) fn set_waiter(&self, chan: Chan) -> SysResult<()> {
        if self.waiter.get().is_some() {
            return Err(SysError::Busy);
        }
        self.waiter.set(Some(chan));
        Ok(())
    }

    pub(crate) fn clear_waiter(&self) {
        self.waiter.set(None);
    }
}

impl Default for EpollFile {
    fn default() -> Self {
        Self::new()
    }
}

impl FileObject for EpollFile {
    /// Legacy suspension quirk: a large-enough read parks the caller on
    /// its wake channel until the instance is closed or an external
    /// wakeup arrives, then reports zero bytes.
    fn read(&self, sim: &mut Sim, pid: Pid, buf: &mut [u8]) -> SysResult<usize> {
        if buf.len() < 8 {
            return Err(SysError::InvalidArgument);
        }
        let chan = sim.proc(pid)?.wait_chan();
        self.set_waiter(chan)?;
        let res = sim.block_on(chan, None);
        self.clear_waiter();
        if res == WaitResult::Stalled {
            log::warn!("read on epoll descriptor woke with a quiesced event queue");
        }
        Ok(0)
    }

    fn write(&self, _sim: &mut Sim, _pid: Pid, _buf: &[u8]) -> SysResult<usize> {
        Err(SysError::InvalidArgument)
    }

    // An epoll instance is never itself ready through this layer.
    fn poll_mask(&self) -> PollEvents {
        PollEvents::empty()
    }

    fn close(&self, sim: &mut Sim) {
        self.closed.set(true);
        if let Some(chan) = self.waiter.get() {
            log::debug!("epoll close waking blocked waiter on chan={chan:#x}");
            sim.wakeup(chan);
        }
    }

    fn as_epoll(&self) -> Option<&EpollFile> {
        Some(self)
    }
}
