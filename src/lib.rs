//! Readiness-driven TCP connection multiplexer.
//!
//! One listening socket plus a growing/shrinking set of client connections,
//! all serviced by a single blocking readiness wait per loop iteration. Raw
//! descriptor lifecycle, platform event registration and half-close
//! detection are handled here; what the bytes mean is left to a [`Handler`]
//! collaborator.
//!
//! # Architecture
//!
//! - **Socket**: exclusively owned descriptor, closed exactly once on drop
//! - **Poller**: kqueue/epoll behind a fixed register/deregister/wait surface
//! - **Registry**: the authoritative set of open client connections
//! - **Server**: accepts, dispatches hint-bounded reads, detects disconnects
//! - **ServerBuilder**: fluent construction (port, backlog, reuse options)
//!
//! # Example
//! ```ignore
//! use broadside::ServerBuilder;
//!
//! let mut server = ServerBuilder::new().port(1100).bind()?;
//! server.run()?;
//! ```

mod builder;
pub mod error;
pub mod poller;
pub mod registry;
pub mod server;
pub mod socket;

pub use builder::ServerBuilder;
pub use error::{Result, ServerError};
pub use server::{Handler, LogHandler, Server};
pub use socket::Socket;
