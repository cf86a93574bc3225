//! Pipes
//!
//! A unidirectional in-simulation byte channel and the canonical
//! readiness source for the multiplexer tests. Both ends share one
//! buffer; each end is a separate descriptor-table entry.
//!
//! I/O here is non-blocking: an empty read and a full write fail with
//! `EAGAIN`. Readiness transitions signal the subscriber channels of the
//! opposite end.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use nse_api::posix::PollEvents;

use crate::file::FileObject;
use crate::process::Pid;
use crate::sched::Chan;
use crate::sim::Sim;
use crate::syscalls::{SysError, SysResult};

/// Pipe buffer capacity in bytes
pub const PIPE_SIZE: usize = 4096;

struct PipeState {
    data: VecDeque<u8>,
    readopen: bool,
    writeopen: bool,
    // chan -> subscription count, so nested polls on the same channel
    // unsubscribe cleanly
    read_subs: BTreeMap<Chan, u32>,
    write_subs: BTreeMap<Chan, u32>,
}

impl PipeState {
    fn new() -> Self {
        Self {
            data: VecDeque::new(),
            readopen: true,
            writeopen: true,
            read_subs: BTreeMap::new(),
            write_subs: BTreeMap::new(),
        }
    }

    fn subscribe(subs: &mut BTreeMap<Chan, u32>, chan: Chan) {
        *subs.entry(chan).or_insert(0) += 1;
    }

    fn unsubscribe(subs: &mut BTreeMap<Chan, u32>, chan: Chan) {
        if let Some(count) = subs.get_mut(&chan) {
            if *count > 1 {
                *count -= 1;
            } else {
                subs.remove(&chan);
            }
        }
    }
}

fn wake_all(sim: &mut Sim, subs: &BTreeMap<Chan, u32>) {
    for &chan in subs.keys() {
        sim.wakeup(chan);
    }
}

/// Read end of a pipe
pub struct PipeReader {
    state: Rc<RefCell<PipeState>>,
}

/// Write end of a pipe
pub struct PipeWriter {
    state: Rc<RefCell<PipeState>>,
}

/// Create both ends of a fresh pipe
pub fn pipe_pair() -> (PipeReader, PipeWriter) {
    let state = Rc::new(RefCell::new(PipeState::new()));
    (
        PipeReader {
            state: Rc::clone(&state),
        },
        PipeWriter { state },
    )
}

impl FileObject for PipeReader {
    fn read(&self, sim: &mut Sim, _pid: Pid, buf: &mut [u8]) -> SysResult<usize> {
        let mut st = self.state.borrow_mut();
        if st.data.is_empty() {
            if !st.writeopen {
                return Ok(0); // EOF
            }
            return Err(SysError::WouldBlock);
        }
        let mut n = 0;
        while n < buf.len() {
            match st.data.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        // Space was freed; writers blocked on a full buffer become ready.
        let subs = st.write_subs.clone();
        drop(st);
        wake_all(sim, &subs);
        Ok(n)
    }

    fn poll_mask(&self) -> PollEvents {
        let st = self.state.borrow();
        let mut mask = PollEvents::empty();
        if !st.data.is_empty() {
            mask |= PollEvents::IN;
        }
        if !st.writeopen {
            mask |= PollEvents::HUP;
        }
        mask
    }

    fn subscribe(&self, interest: PollEvents, chan: Chan) {
        if interest.intersects(PollEvents::IN | PollEvents::HUP) {
            PipeState::subscribe(&mut self.state.borrow_mut().read_subs, chan);
        }
    }

    fn unsubscribe(&self, chan: Chan) {
        PipeState::unsubscribe(&mut self.state.borrow_mut().read_subs, chan);
    }

    fn close(&self, sim: &mut Sim) {
        let mut st = self.state.borrow_mut();
        st.readopen = false;
        let subs = st.write_subs.clone();
        drop(st);
        wake_all(sim, &subs);
    }
}

impl FileObject for PipeWriter {
    fn write(&self, sim: &mut Sim, _pid: Pid, buf: &[u8]) -> SysResult<usize> {
        let mut st = self.state.borrow_mut();
        if !st.readopen {
            return Err(SysError::BrokenPipe);
        }
        let space = PIPE_SIZE - st.data.len();
        if space == 0 {
            return Err(SysError::WouldBlock);
        }
        let n = buf.len().min(space);
        st.data.extend(&buf[..n]);
        let subs = st.read_subs.clone();
        drop(st);
        wake_all(sim, &subs);
        Ok(n)
    }

    fn poll_mask(&self) -> PollEvents {
        let st = self.state.borrow();
        let mut mask = PollEvents::empty();
        if !st.readopen {
            mask |= PollEvents::ERR;
        } else if st.data.len() < PIPE_SIZE {
            mask |= PollEvents::OUT;
        }
        mask
    }

    fn subscribe(&self, interest: PollEvents, chan: Chan) {
        if interest.intersects(PollEvents::OUT | PollEvents::ERR) {
            PipeState::subscribe(&mut self.state.borrow_mut().write_subs, chan);
        }
    }

    fn unsubscribe(&self, chan: Chan) {
        PipeState::unsubscribe(&mut self.state.borrow_mut().write_subs, chan);
    }

    fn close(&self, sim: &mut Sim) {
        let mut st = self.state.borrow_mut();
        st.writeopen = false;
        let subs = st.read_subs.clone();
        drop(st);
        wake_all(sim, &subs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pipe_is_not_readable() {
        let (r, w) = pipe_pair();
        assert_eq!(r.poll_mask(), PollEvents::empty());
        assert_eq!(w.poll_mask(), PollEvents::OUT);
    }

    #[test]
    fn write_makes_reader_ready() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (r, w) = pipe_pair();
        assert_eq!(w.write(&mut sim, pid, b"abc").unwrap(), 3);
        assert!(r.poll_mask().contains(PollEvents::IN));

        let mut buf = [0u8; 8];
        assert_eq!(r.read(&mut sim, pid, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(r.poll_mask(), PollEvents::empty());
    }

    #[test]
    fn empty_read_would_block_then_eof() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (r, w) = pipe_pair();
        let mut buf = [0u8; 4];
        assert!(matches!(
            r.read(&mut sim, pid, &mut buf),
            Err(SysError::WouldBlock)
        ));
        w.close(&mut sim);
        assert_eq!(r.read(&mut sim, pid, &mut buf).unwrap(), 0);
        assert!(r.poll_mask().contains(PollEvents::HUP));
    }

    #[test]
    fn writer_sees_err_after_reader_close() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (r, w) = pipe_pair();
        r.close(&mut sim);
        assert_eq!(w.poll_mask(), PollEvents::ERR);
        assert!(matches!(
            w.write(&mut sim, pid, b"x"),
            Err(SysError::BrokenPipe)
        ));
    }

    #[test]
    fn full_pipe_blocks_writer() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (_r, w) = pipe_pair();
        let big = vec![0u8; PIPE_SIZE + 1];
        assert_eq!(w.write(&mut sim, pid, &big).unwrap(), PIPE_SIZE);
        assert_eq!(w.poll_mask(), PollEvents::empty());
        assert!(matches!(
            w.write(&mut sim, pid, b"x"),
            Err(SysError::WouldBlock)
        ));
    }

    #[test]
    fn transitions_signal_subscribers() {
        let mut sim = Sim::new();
        let pid = sim.spawn();
        let (r, w) = pipe_pair();
        let w = Rc::new(w);
        r.subscribe(PollEvents::IN, 11);

        let writer = Rc::clone(&w);
        sim.schedule_in(5, move |sim| {
            writer.write(sim, pid, b"z").unwrap();
        });
        assert_eq!(sim.block_on(11, Some(20)), crate::sched::WaitResult::Woken);
        assert_eq!(sim.now(), 5);

        r.unsubscribe(11);
        let writer = Rc::clone(&w);
        sim.schedule_in(5, move |sim| {
            writer.write(sim, pid, b"z").unwrap();
        });
        assert_eq!(
            sim.block_on(11, Some(30)),
            crate::sched::WaitResult::TimedOut
        );
        assert_eq!(sim.now(), 30);
    }
}
