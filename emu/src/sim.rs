//! Simulation world
//!
//! [`Sim`] owns the scheduler and the simulated processes. Event
//! callbacks receive `&mut Sim`, so they can write into pipes, close
//! descriptors, or issue further syscalls on behalf of any process.
//!
//! The cooperative blocking primitive is [`Sim::block_on`]: it pumps the
//! event queue until the given wake channel is signaled, the virtual
//! deadline passes, or the queue is exhausted. Syscall-level suspension
//! points (`sys_poll`, `sys_epoll_wait`) are built on it.

use std::collections::BTreeMap;
use std::rc::Rc;

use nse_api::posix::RawFd;

use crate::file::FileObject;
use crate::process::{Pid, Process};
use crate::sched::{Chan, Scheduler, WaitResult};
use crate::syscalls::{SysError, SysResult};

/// The simulation: virtual clock, event queue, and process table
pub struct Sim {
    pub(crate) sched: Scheduler,
    procs: BTreeMap<Pid, Process>,
    next_pid: Pid,
}

impl Sim {
    pub fn new() -> Self {
        Self {
            sched: Scheduler::new(),
            procs: BTreeMap::new(),
            next_pid: 1,
        }
    }

    /// Current virtual time in milliseconds
    pub fn now(&self) -> u64 {
        self.sched.now()
    }

    /// Create a simulated process with an empty descriptor table
    pub fn spawn(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        self.procs.insert(pid, Process::new(pid));
        log::debug!("spawned process {pid}");
        pid
    }

    pub fn proc(&self, pid: Pid) -> SysResult<&Process> {
        self.procs.get(&pid).ok_or(SysError::InvalidArgument)
    }

    pub fn proc_mut(&mut self, pid: Pid) -> SysResult<&mut Process> {
        self.procs.get_mut(&pid).ok_or(SysError::InvalidArgument)
    }

    /// errno left by the last failed call of `pid`, for assertions
    pub fn errno(&self, pid: Pid) -> i32 {
        self.proc(pid).map(|p| p.errno).unwrap_or(0)
    }

    /// Install a file object into `pid`'s descriptor table
    pub fn install_file(&mut self, pid: Pid, file: Rc<dyn FileObject>) -> SysResult<RawFd> {
        self.proc_mut(pid)?.fd_install(file)
    }

    /// Queue a callback `delay_ms` of virtual time from now
    pub fn schedule_in(&mut self, delay_ms: u64, run: impl FnOnce(&mut Sim) + 'static) {
        let at = self.sched.now() + delay_ms;
        self.sched.schedule_at(at, Box::new(run));
    }

    /// Signal a wake channel (see [`Scheduler::wakeup`])
    pub fn wakeup(&mut self, chan: Chan) {
        self.sched.wakeup(chan);
    }

    /// Run the next queued event; false when the queue is empty
    pub fn step(&mut self) -> bool {
        match self.sched.pop_next() {
            Some(ev) => {
                (ev.run)(self);
                true
            }
            None => false,
        }
    }

    /// Drain the event queue
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// Block the calling context on `chan`
    ///
    /// Pumps the event queue until the channel is signaled, `deadline`
    /// (absolute virtual ms, `None` = infinite) is reached, or the queue
    /// quiesces. Events scheduled exactly at the deadline run before the
    /// timeout fires.
    pub fn block_on(&mut self, chan: Chan, deadline: Option<u64>) -> WaitResult {
        // A signal can only arrive while this call is pumping events.
        self.sched.clear_signal(chan);
        loop {
            if self.sched.take_signal(chan) {
                return WaitResult::Woken;
            }
            if let Some(d) = deadline {
                if self.sched.now() >= d {
                    return WaitResult::TimedOut;
                }
            }
            match self.sched.next_event_at() {
                None => match deadline {
                    Some(d) => {
                        self.sched.advance_to(d);
                        return WaitResult::TimedOut;
                    }
                    None => return WaitResult::Stalled,
                },
                Some(t) => {
                    if let Some(d) = deadline {
                        if t > d {
                            self.sched.advance_to(d);
                            return WaitResult::TimedOut;
                        }
                    }
                    self.step();
                }
            }
        }
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_on_times_out_at_deadline() {
        let mut sim = Sim::new();
        let res = sim.block_on(1, Some(100));
        assert_eq!(res, WaitResult::TimedOut);
        assert_eq!(sim.now(), 100);
    }

    #[test]
    fn block_on_stalls_without_deadline() {
        let mut sim = Sim::new();
        assert_eq!(sim.block_on(1, None), WaitResult::Stalled);
        assert_eq!(sim.now(), 0);
    }

    #[test]
    fn block_on_wakes_on_signal_from_event() {
        let mut sim = Sim::new();
        sim.schedule_in(40, |sim| sim.wakeup(9));
        assert_eq!(sim.block_on(9, None), WaitResult::Woken);
        assert_eq!(sim.now(), 40);
    }

    #[test]
    fn unrelated_events_do_not_wake() {
        let mut sim = Sim::new();
        sim.schedule_in(10, |_| {});
        sim.schedule_in(30, |sim| sim.wakeup(2));
        assert_eq!(sim.block_on(9, Some(50)), WaitResult::TimedOut);
        assert_eq!(sim.now(), 50);
    }

    #[test]
    fn event_at_deadline_runs_before_timeout() {
        let mut sim = Sim::new();
        sim.schedule_in(100, |sim| sim.wakeup(3));
        assert_eq!(sim.block_on(3, Some(100)), WaitResult::Woken);
        assert_eq!(sim.now(), 100);
    }

    #[test]
    fn stale_signals_are_cleared_on_entry() {
        let mut sim = Sim::new();
        sim.wakeup(5);
        assert_eq!(sim.block_on(5, Some(20)), WaitResult::TimedOut);
    }

    #[test]
    fn spawn_assigns_distinct_pids() {
        let mut sim = Sim::new();
        let a = sim.spawn();
        let b = sim.spawn();
        assert_ne!(a, b);
        assert!(sim.proc(a).is_ok());
        assert!(sim.proc(b).is_ok());
        assert!(sim.proc(999).is_err());
    }
}
