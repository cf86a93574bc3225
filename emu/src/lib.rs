//! NSE emulation core
//!
//! This crate lets simulated processes use descriptor-based I/O readiness
//! APIs (`poll`, `select`, `epoll`) against a deterministic discrete-event
//! scheduler instead of a real kernel. "Blocking" a simulated process
//! means running queued simulation events until something signals the
//! process's wake channel or its virtual deadline passes.
//!
//! # Architecture
//!
//! - **Scheduler** (`sched`): virtual clock, ordered event queue, wake
//!   channels
//! - **Simulation world** (`sim`): owns the scheduler and the process
//!   table, provides the cooperative blocking primitive
//! - **Processes** (`process`): descriptor tables and per-process error
//!   slots
//! - **File objects** (`file`, `pipe`, `epoll_fd`): polymorphic
//!   descriptor targets with level-triggered readiness
//! - **System calls** (`syscalls`): the POSIX-flavoured entry points
//!
//! # Usage
//!
//! ```
//! use emu::sim::Sim;
//! use emu::syscalls::epoll::{sys_epoll_create, sys_epoll_ctl, sys_epoll_wait};
//! use emu::syscalls::fd::{sys_pipe, sys_write};
//! use nse_api::posix::{EpollEvent, EpollEvents, EPOLL_CTL_ADD};
//!
//! let mut sim = Sim::new();
//! let pid = sim.spawn();
//! let mut fds = [0; 2];
//! assert_eq!(sys_pipe(&mut sim, pid, &mut fds), 0);
//!
//! let epfd = sys_epoll_create(&mut sim, pid, 10);
//! let interest = EpollEvent { events: EpollEvents::IN, data: 42 };
//! sys_epoll_ctl(&mut sim, pid, epfd, EPOLL_CTL_ADD, fds[0], Some(&interest));
//!
//! let wfd = fds[1];
//! sim.schedule_in(50, move |sim| {
//!     sys_write(sim, pid, wfd, b"ping");
//! });
//!
//! let mut events = [EpollEvent::default(); 8];
//! let n = sys_epoll_wait(&mut sim, pid, epfd, &mut events, 8, -1);
//! assert_eq!(n, 1);
//! assert_eq!(events[0].data, 42);
//! ```

pub mod epoll_fd;
pub mod file;
pub mod pipe;
pub mod process;
pub mod sched;
pub mod sim;
pub mod syscalls;

pub use nse_api as api;
