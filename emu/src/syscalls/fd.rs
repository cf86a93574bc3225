//! Descriptor lifecycle syscalls

use std::rc::Rc;

use nse_api::posix::RawFd;

use crate::pipe::pipe_pair;
use crate::process::Pid;
use crate::sim::Sim;
use crate::syscalls::{fail, fail_sz, SysResult};

/// Create a pipe; `fds[0]` is the read end, `fds[1]` the write end
pub fn sys_pipe(sim: &mut Sim, pid: Pid, fds: &mut [RawFd; 2]) -> i32 {
    log::trace!("sys_pipe pid={pid}");
    match do_pipe(sim, pid) {
        Ok((rfd, wfd)) => {
            fds[0] = rfd;
            fds[1] = wfd;
            0
        }
        Err(err) => fail(sim, pid, err),
    }
}

fn do_pipe(sim: &mut Sim, pid: Pid) -> SysResult<(RawFd, RawFd)> {
    let (reader, writer) = pipe_pair();
    let proc = sim.proc_mut(pid)?;
    let rfd = proc.fd_install(Rc::new(reader))?;
    match proc.fd_install(Rc::new(writer)) {
        Ok(wfd) => Ok((rfd, wfd)),
        Err(err) => {
            // Roll back so a failed pipe leaves the table untouched.
            let _ = proc.fd_remove(rfd);
            Err(err)
        }
    }
}

/// Close a descriptor; the file object's close hook runs after the
/// table entry is removed (an epoll instance wakes its waiter here)
pub fn sys_close(sim: &mut Sim, pid: Pid, fd: RawFd) -> i32 {
    log::trace!("sys_close pid={pid} fd={fd}");
    match sim.proc_mut(pid).and_then(|proc| proc.fd_remove(fd)) {
        Ok(file) => {
            file.close(sim);
            0
        }
        Err(err) => fail(sim, pid, err),
    }
}

pub fn sys_read(sim: &mut Sim, pid: Pid, fd: RawFd, buf: &mut [u8]) -> isize {
    log::trace!("sys_read pid={pid} fd={fd} len={}", buf.len());
    let file = match sim.proc(pid).and_then(|proc| proc.fd_lookup(fd)) {
        Ok(file) => file,
        Err(err) => return fail_sz(sim, pid, err),
    };
    match file.read(sim, pid, buf) {
        Ok(n) => n as isize,
        Err(err) => fail_sz(sim, pid, err),
    }
}

pub fn sys_write(sim: &mut Sim, pid: Pid, fd: RawFd, buf: &[u8]) -> isize {
    log::trace!("sys_write pid={pid} fd={fd} len={}", buf.len());
    let file = match sim.proc(pid).and_then(|proc| proc.fd_lookup(fd)) {
        Ok(file) => file,
        Err(err) => return fail_sz(sim, pid, err),
    };
    match file.write(sim, pid, buf) {
        Ok(n) => n as isize,
        Err(err) => fail_sz(sim, pid, err),
    }
}
