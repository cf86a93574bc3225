//! Common test utilities for integration tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use emu::file::FileObject;
use emu::process::Pid;
use emu::sched::Chan;
use emu::sim::Sim;
use nse_api::posix::{PollEvents, RawFd};

/// A file object whose readiness is driven directly by the test
///
/// `set_mask` publishes a new readiness mask and wakes every subscribed
/// channel, standing in for a device or socket becoming ready.
pub struct ScriptedFd {
    mask: Cell<PollEvents>,
    subs: RefCell<BTreeMap<Chan, u32>>,
}

impl ScriptedFd {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            mask: Cell::new(PollEvents::empty()),
            subs: RefCell::new(BTreeMap::new()),
        })
    }

    pub fn set_mask(&self, sim: &mut Sim, mask: PollEvents) {
        self.mask.set(mask);
        for &chan in self.subs.borrow().keys() {
            sim.wakeup(chan);
        }
    }
}

impl FileObject for ScriptedFd {
    fn poll_mask(&self) -> PollEvents {
        self.mask.get()
    }

    fn subscribe(&self, _interest: PollEvents, chan: Chan) {
        *self.subs.borrow_mut().entry(chan).or_insert(0) += 1;
    }

    fn unsubscribe(&self, chan: Chan) {
        let mut subs = self.subs.borrow_mut();
        if let Some(count) = subs.get_mut(&chan) {
            if *count > 1 {
                *count -= 1;
            } else {
                subs.remove(&chan);
            }
        }
    }
}

/// Fresh simulation with one process
pub fn sim_with_proc() -> (Sim, Pid) {
    let mut sim = Sim::new();
    let pid = sim.spawn();
    (sim, pid)
}

/// Install a scripted file into `pid`'s table
pub fn install_scripted(sim: &mut Sim, pid: Pid) -> (RawFd, Rc<ScriptedFd>) {
    let scripted = ScriptedFd::new();
    let fd = sim
        .install_file(pid, scripted.clone())
        .expect("descriptor table full");
    (fd, scripted)
}
