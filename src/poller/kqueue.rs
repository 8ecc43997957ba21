use super::{Event, Interest};
use crate::error::{Result, ServerError};

use libc::{
    EV_ADD, EV_DELETE, EV_ENABLE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_WRITE, kevent, kqueue,
};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

const EMPTY: kevent = kevent {
    ident: 0,
    filter: 0,
    flags: 0,
    fflags: 0,
    data: 0,
    udata: ptr::null_mut(),
};

/// kqueue-backed readiness queue.
pub struct Poller {
    queue: RawFd,
    native: Vec<kevent>,
}

impl Poller {
    pub fn new() -> Result<Self> {
        let queue = unsafe { kqueue() };
        if queue < 0 {
            return Err(ServerError::syscall("create kqueue"));
        }

        Ok(Self {
            queue,
            native: Vec::new(),
        })
    }

    pub fn register(&mut self, file_descriptor: RawFd, interest: Interest) -> Result<()> {
        let mut changes = Vec::new();

        if interest.read {
            changes.push(kevent {
                ident: file_descriptor as usize,
                filter: EVFILT_READ,
                flags: EV_ADD | EV_ENABLE,
                fflags: 0,
                data: 0,
                udata: ptr::null_mut(),
            });
        }

        if interest.write {
            changes.push(kevent {
                ident: file_descriptor as usize,
                filter: EVFILT_WRITE,
                flags: EV_ADD | EV_ENABLE,
                fflags: 0,
                data: 0,
                udata: ptr::null_mut(),
            });
        }

        let rc = unsafe {
            kevent(
                self.queue,
                changes.as_ptr(),
                changes.len() as i32,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            return Err(ServerError::syscall("register descriptor"));
        }

        Ok(())
    }

    pub fn deregister(&mut self, file_descriptor: RawFd) -> Result<()> {
        let change = kevent {
            ident: file_descriptor as usize,
            filter: EVFILT_READ,
            flags: EV_DELETE,
            fflags: 0,
            data: 0,
            udata: ptr::null_mut(),
        };

        let rc = unsafe { kevent(self.queue, &change, 1, ptr::null_mut(), 0, ptr::null()) };
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
                kevent(
                    self.queue,
                    ptr::null(),
                    0,
                    self.native.as_mut_ptr(),
                    self.native.len() as i32,
                    ptr::null(),
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
            let eof = native.flags & EV_EOF != 0;

            *slot = Event {
                file_descriptor: native.ident as RawFd,
                readable: if native.filter == EVFILT_READ {
                    native.data.max(0) as usize
                } else {
                    0
                },
                eof,
                error: (eof && native.fflags != 0).then_some(native.fflags as i32),
                poll_error: (native.flags & EV_ERROR != 0).then_some(native.data as i32),
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
