//! Simulated processes and descriptor tables
//!
//! A process maps small-integer descriptors to refcounted file objects
//! and carries the error slot syscalls report failures through. Looking
//! a descriptor up clones the `Rc`, which pins the file object for the
//! duration of the call even if the table entry is removed meanwhile.

use std::collections::BTreeMap;
use std::rc::Rc;

use nse_api::posix::RawFd;

use crate::file::FileObject;
use crate::sched::Chan;
use crate::syscalls::{SysError, SysResult};

/// Process identifier
pub type Pid = u32;

/// Maximum open descriptors per process
pub const NOFILE: usize = 128;

/// Namespace for per-process wait channels
const WAIT_CHAN_BASE: u64 = 0x4000_0000;

/// One simulated process
pub struct Process {
    pid: Pid,
    files: BTreeMap<RawFd, Rc<dyn FileObject>>,
    /// errno of the last failed call, POSIX style
    pub errno: i32,
    wait_chan: Chan,
}

impl Process {
    pub(crate) fn new(pid: Pid) -> Self {
        Self {
            pid,
            files: BTreeMap::new(),
            errno: 0,
            wait_chan: WAIT_CHAN_BASE | pid as u64,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The channel this process's blocking calls park on
    pub fn wait_chan(&self) -> Chan {
        self.wait_chan
    }

    /// Bind a file object to the lowest free descriptor
    pub fn fd_install(&mut self, file: Rc<dyn FileObject>) -> SysResult<RawFd> {
        let fd = (0..NOFILE as RawFd)
            .find(|fd| !self.files.contains_key(fd))
            .ok_or(SysError::TooManyOpenFiles)?;
        self.files.insert(fd, file);
        Ok(fd)
    }

    /// Resolve a descriptor, pinning the file object
    pub fn fd_lookup(&self, fd: RawFd) -> SysResult<Rc<dyn FileObject>> {
        self.files
            .get(&fd)
            .cloned()
            .ok_or(SysError::BadFileDescriptor)
    }

    /// Remove a descriptor, returning the file object for its close hook
    pub(crate) fn fd_remove(&mut self, fd: RawFd) -> SysResult<Rc<dyn FileObject>> {
        self.files.remove(&fd).ok_or(SysError::BadFileDescriptor)
    }
}
