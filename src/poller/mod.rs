//! Readiness-event multiplexing.
//!
//! Wraps the platform readiness backend behind a fixed three-operation
//! surface:
//! - [`Poller::new`]: initialize the backend queue
//! - [`Poller::register`] / [`Poller::deregister`]: maintain the watch set
//! - [`Poller::wait`]: block until at least one watched descriptor is ready
//!
//! All backend-specific logic (kqueue `EV_SET`/`EVFILT_READ` vs epoll
//! `epoll_event`/`EPOLLIN`) lives in the submodules, selected at build time;
//! the rest of the crate sees only [`Poller`], [`Event`] and [`Interest`].

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;
#[cfg(any(target_os = "macos", target_os = "ios"))]
mod kqueue;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use epoll::Poller;
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub use kqueue::Poller;

use std::os::unix::io::RawFd;

/// Which readiness conditions a registration watches for.
#[derive(Clone, Copy, Debug)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const READABLE: Self = Self {
        read: true,
        write: false,
    };

    pub const WRITABLE: Self = Self {
        read: false,
        write: true,
    };
}

/// One readiness notification, translated out of the backend's native record.
///
/// Valid only for the loop iteration that produced it: the hint and flags
/// describe the descriptor at wait time and go stale once it has been read
/// from or closed.
#[derive(Clone, Copy, Debug, Default)]
pub struct Event {
    pub(crate) file_descriptor: RawFd,
    pub(crate) readable: usize,
    pub(crate) eof: bool,
    pub(crate) error: Option<i32>,
    pub(crate) poll_error: Option<i32>,
}

impl Event {
    pub fn file_descriptor(&self) -> RawFd {
        self.file_descriptor
    }

    /// Best-effort count of bytes readable without blocking.
    pub fn readable(&self) -> usize {
        self.readable
    }

    /// The peer has closed its sending side.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Peer-originated error code accompanying EOF, if any.
    pub fn error(&self) -> Option<i32> {
        self.error
    }

    /// Backend-reported failure on the watch itself. Fatal to the loop.
    pub fn poll_error(&self) -> Option<i32> {
        self.poll_error
    }
}
