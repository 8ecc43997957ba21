//! Error types for socket and event-queue operations.

use std::io;
use std::os::unix::io::RawFd;
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, ServerError>;

/// A condition the server loop cannot continue from.
///
/// Peer-side conditions (half-close, connection reset) are not errors of this
/// kind; they are handled inside the dispatch cycle and never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A failing OS call, tagged with the operation that was attempted.
    #[error("{phase}: {source}")]
    Syscall {
        phase: &'static str,
        source: io::Error,
    },

    /// A freshly accepted descriptor was already tracked. Descriptor values
    /// are unique while open, so this signals reuse corruption.
    #[error("descriptor {file_descriptor} is already tracked")]
    DuplicateClient { file_descriptor: RawFd },
}

impl ServerError {
    /// Captures `errno` for the OS call that just failed.
    pub(crate) fn syscall(phase: &'static str) -> Self {
        Self::Syscall {
            phase,
            source: io::Error::last_os_error(),
        }
    }

    /// Wraps an error code reported out-of-band, e.g. on an event record.
    pub(crate) fn syscall_code(phase: &'static str, code: i32) -> Self {
        Self::Syscall {
            phase,
            source: io::Error::from_raw_os_error(code),
        }
    }
}
