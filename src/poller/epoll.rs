use super::{Event, Interest};
use crate::error::{Result, ServerError};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT,
    EPOLLRDHUP, FIONREAD, SO_ERROR, SOL_SOCKET, epoll_create1, epoll_ctl, epoll_event,
    epoll_wait, getsockopt, ioctl,
};
use std::io;
use std::mem;
use std::os::unix::io::RawFd;

const EMPTY: epoll_event = epoll_event { events: 0, u64: 0 };

/// epoll-backed readiness queue.
#[derive(Debug)]
pub struct Poller {
    queue: RawFd,
    native: Vec<epoll_event>,
}

impl Poller {
    pub fn new() -> Result<Self> {
        let queue = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if queue < 0 {
            return Err(ServerError::syscall("create epoll"));
        }

        Ok(Self {
            queue,
            native: Vec::new(),
        })
    }

    pub fn register(&mut self, file_descriptor: RawFd, interest: Interest) -> Result<()> {
        let mut bits = 0;

        if interest.read {
            bits |= EPOLLIN | EPOLLRDHUP;
        }

        if interest.write {
            bits |= EPOLLOUT;
        }

        let mut change = epoll_event {
            events: bits as u32,
            u64: file_descriptor as u64,
        };

        let rc = unsafe { epoll_ctl(self.queue, EPOLL_CTL_ADD, file_descriptor, &mut change) };
        if rc < 0 {
            return Err(ServerError::syscall("register descriptor"));
        }

        Ok(())
    }

    pub fn deregister(&mut self, file_descriptor: RawFd) -> Result<()> {
        // Kernels before 2.6.9 insist on a non-null event for EPOLL_CTL_DEL.
        let mut change = EMPTY;

        let rc = unsafe { epoll_ctl(self.queue, EPOLL_CTL_DEL, file_descriptor, &mut change) };
        if rc < 0 {
            let error = io::Error::last_os_error();
            // The kernel drops watches on close; a missing entry is not a failure.
            if error.raw_os_error() != Some(libc::ENOENT) {
                return Err(ServerError::Syscall {
                    phase: "deregister descriptor",
                    source: error,
                });
            }
        }

        Ok(())
    }

    /// Blocks until at least one watched descriptor is ready, filling `out`
    /// with up to `out.len()` records in kernel-reported order.
    pub fn wait(&mut self, out: &mut [Event]) -> Result<usize> {
        self.native.resize(out.len(), EMPTY);

        let count = loop {
            let rc = unsafe {
                epoll_wait(
                    self.queue,
                    self.native.as_mut_ptr(),
                    self.native.len() as i32,
                    -1,
                )
            };

            if rc >= 0 {
                break rc as usize;
            }

            let error = io::Error::last_os_error();
            if error.raw_os_error() == Some(libc::EINTR) {
                continue;
            }

            return Err(ServerError::Syscall {
                phase: "wait for events",
                source: error,
            });
        };

        for (slot, native) in out.iter_mut().zip(&self.native[..count]) {
            let bits = native.events as i32;
            let file_descriptor = native.u64 as RawFd;

            // epoll reports registration failures synchronously at epoll_ctl
            // time, so EPOLLERR here is peer-originated; it folds into the
            // EOF path carrying the socket's pending error code.
            let peer_error = if bits & EPOLLERR != 0 {
                socket_error(file_descriptor)
            } else {
                None
            };

            *slot = Event {
                file_descriptor,
                readable: if bits & EPOLLIN != 0 {
                    bytes_buffered(file_descriptor)
                } else {
                    0
                },
                eof: bits & (EPOLLRDHUP | EPOLLHUP | EPOLLERR) != 0,
                error: peer_error,
                poll_error: None,
            };
        }

        Ok(count)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.queue);
        }
    }
}

/// Best-effort readable-byte hint for `file_descriptor`.
fn bytes_buffered(file_descriptor: RawFd) -> usize {
    let mut available: libc::c_int = 0;

    let rc = unsafe { ioctl(file_descriptor, FIONREAD, &mut available) };
    if rc < 0 {
        return 0;
    }

    available.max(0) as usize
}

/// Pending socket error, consumed via `SO_ERROR`.
fn socket_error(file_descriptor: RawFd) -> Option<i32> {
    let mut code: libc::c_int = 0;
    let mut length = mem::size_of::<libc::c_int>() as libc::socklen_t;

    let rc = unsafe {
        getsockopt(
            file_descriptor,
            SOL_SOCKET,
            SO_ERROR,
            &mut code as *mut _ as *mut _,
            &mut length,
        )
    };

    if rc < 0 || code == 0 { None } else { Some(code) }
}
