//! File-like objects
//!
//! Every descriptor resolves to a [`FileObject`]. Implementations
//! override what they support; the defaults fail with the code an
//! operation of that class deserves on an object that does not support
//! it, mirroring how the descriptor layer rejects misdirected calls.
//!
//! Readiness is level-triggered: [`FileObject::poll_mask`] reports the
//! conditions that currently hold, every time it is asked. Objects whose
//! readiness can change also accept wake-channel subscriptions and
//! signal them on transitions, so blocked multiplexer calls resume
//! without tick-polling.

use nse_api::posix::PollEvents;

use crate::epoll_fd::EpollFile;
use crate::process::Pid;
use crate::sched::Chan;
use crate::sim::Sim;
use crate::syscalls::{SysError, SysResult};

pub trait FileObject {
    fn read(&self, _sim: &mut Sim, _pid: Pid, _buf: &mut [u8]) -> SysResult<usize> {
        Err(SysError::InvalidArgument)
    }

    fn write(&self, _sim: &mut Sim, _pid: Pid, _buf: &[u8]) -> SysResult<usize> {
        Err(SysError::InvalidArgument)
    }

    fn lseek(&self, _offset: i64, _whence: i32) -> SysResult<i64> {
        Err(SysError::IllegalSeek)
    }

    fn fsync(&self) -> SysResult<()> {
        Err(SysError::BadFileDescriptor)
    }

    fn bind(&self, _addr: &[u8]) -> SysResult<()> {
        Err(SysError::NotASocket)
    }

    fn connect(&self, _addr: &[u8]) -> SysResult<()> {
        Err(SysError::NotASocket)
    }

    /// Conditions that currently hold on this object
    fn poll_mask(&self) -> PollEvents;

    /// Register a wake channel for transitions matching `interest`
    fn subscribe(&self, _interest: PollEvents, _chan: Chan) {}

    fn unsubscribe(&self, _chan: Chan) {}

    /// Invoked when the owning descriptor-table entry is removed
    fn close(&self, _sim: &mut Sim) {}

    /// Downcast hook for the epoll entry points
    fn as_epoll(&self) -> Option<&EpollFile> {
        None
    }
}
