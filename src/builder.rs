//! Fluent builder for Server construction.

use crate::error::Result;
use crate::server::{Handler, LogHandler, Server};

/// Builder for [`Server`] instances with fluent API.
///
/// Defaults match the production deployment: port 1100, a backlog of 12, and
/// address/port reuse enabled in debug builds only.
///
/// # Example
/// ```ignore
/// let server = ServerBuilder::new().port(1100).bind()?;
/// ```
pub struct ServerBuilder {
    pub(crate) port: u16,
    pub(crate) backlog: i32,
    pub(crate) reuse_address: bool,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            port: 1100,
            backlog: 12,
            reuse_address: cfg!(debug_assertions),
        }
    }

    /// Port to bind; 0 lets the kernel pick one.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Pending-connection queue length passed to `listen(2)`.
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Overrides the debug-build default for `SO_REUSEADDR`/`SO_REUSEPORT`.
    pub fn reuse_address(mut self, reuse_address: bool) -> Self {
        self.reuse_address = reuse_address;
        self
    }

    /// Binds and starts listening, with the default logging collaborator.
    pub fn bind(self) -> Result<Server> {
        self.bind_with(LogHandler)
    }

    /// Binds with a specific payload collaborator.
    pub fn bind_with<H: Handler>(self, handler: H) -> Result<Server<H>> {
        Server::bind(&self, handler)
    }
}
