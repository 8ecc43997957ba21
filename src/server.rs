//! The connection-multiplexing server loop.
//!
//! One blocking readiness wait per iteration; every reported event is routed
//! to the acceptor (listening descriptor) or the read dispatcher (anything
//! else). All loop state lives in [`Server`]; there is no process-wide
//! mutable state and no second thread.

use crate::builder::ServerBuilder;
use crate::error::{Result, ServerError};
use crate::poller::{Event, Interest, Poller};
use crate::registry::{Client, Registry};
use crate::socket::Socket;

use libc::{
    AF_INET6, IPPROTO_TCP, SO_REUSEADDR, SO_REUSEPORT, SOCK_STREAM, SOL_SOCKET, accept, bind,
    getsockname, listen, read, setsockopt, sockaddr, sockaddr_in6, socket,
};
use std::io;
use std::mem;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::os::unix::io::AsRawFd;
use tracing::{debug, info, warn};

/// Collaborator receiving each raw chunk a client sends.
///
/// The loop hands payloads over exactly as the OS reported them ready; it
/// never parses or frames them.
pub trait Handler {
    fn on_data(&mut self, peer: &str, payload: &[u8]);
}

/// Default collaborator: emits each chunk as an informational record.
#[derive(Debug, Default)]
pub struct LogHandler;

impl Handler for LogHandler {
    fn on_data(&mut self, peer: &str, payload: &[u8]) {
        info!(
            client = %peer,
            payload = %String::from_utf8_lossy(payload),
            "client sent data",
        );
    }
}

/// A listening socket and the set of clients multiplexed onto one thread.
///
/// By the time a value exists the listener is bound and watched; construction
/// goes through [`ServerBuilder`], and any setup failure is returned before a
/// server exists. [`run`](Self::run) only ever returns a fatal error.
#[derive(Debug)]
pub struct Server<H = LogHandler> {
    listener: Socket,
    poller: Poller,
    registry: Registry,
    events: Vec<Event>,
    handler: H,
}

impl<H: Handler> Server<H> {
    pub(crate) fn bind(builder: &ServerBuilder, handler: H) -> Result<Self> {
        let listener = Socket::from_raw(
            unsafe { socket(AF_INET6, SOCK_STREAM, IPPROTO_TCP) },
            "create listening socket",
        )?;

        if builder.reuse_address {
            set_option(&listener, SO_REUSEADDR, "set address reuse")?;
            set_option(&listener, SO_REUSEPORT, "set port reuse")?;
        }

        let mut address: sockaddr_in6 = unsafe { mem::zeroed() };
        address.sin6_family = AF_INET6 as _;
        address.sin6_port = builder.port.to_be();

        let rc = unsafe {
            bind(
                listener.as_raw_fd(),
                &address as *const _ as *const sockaddr,
                mem::size_of::<sockaddr_in6>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(ServerError::syscall("bind"));
        }

        let rc = unsafe { listen(listener.as_raw_fd(), builder.backlog) };
        if rc < 0 {
            return Err(ServerError::syscall("listen"));
        }

        let mut poller = Poller::new()?;
        poller.register(listener.as_raw_fd(), Interest::READABLE)?;

        let server = Self {
            listener,
            poller,
            registry: Registry::new(),
            events: vec![Event::default()],
            handler,
        };

        info!(port = server.local_port()?, "listening");

        Ok(server)
    }

    /// Port the listener is bound to; resolves the kernel's pick for port 0.
    pub fn local_port(&self) -> Result<u16> {
        let mut address: sockaddr_in6 = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_in6>() as libc::socklen_t;

        let rc = unsafe {
            getsockname(
                self.listener.as_raw_fd(),
                &mut address as *mut _ as *mut sockaddr,
                &mut length,
            )
        };
        if rc < 0 {
            return Err(ServerError::syscall("get listener address"));
        }

        Ok(u16::from_be(address.sin6_port))
    }

    /// Number of currently connected clients.
    pub fn clients(&self) -> usize {
        self.registry.len()
    }

    /// Current wait-buffer size; tracks the client count plus the listener.
    pub fn event_slots(&self) -> usize {
        self.events.len()
    }

    /// Runs the wait/dispatch cycle until a fatal error.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.poll()?;
        }
    }

    /// One iteration: block until readiness, then route every reported event.
    pub fn poll(&mut self) -> Result<()> {
        let count = self.poller.wait(&mut self.events)?;

        for index in 0..count {
            let event = self.events[index];

            if let Some(code) = event.poll_error() {
                return Err(ServerError::syscall_code("poll descriptor", code));
            }

            if event.file_descriptor() == self.listener.as_raw_fd() {
                self.accept_client()?;
            } else {
                self.dispatch(event);
            }
        }

        // One slot per live client plus the listener. Trimming after the
        // batch: slots may still hold unprocessed records mid-batch.
        while self.events.len() > self.registry.len() + 1 {
            self.events.pop();
            debug!(
                slots = self.events.len(),
                clients = self.registry.len(),
                "event buffer trimmed",
            );
        }

        Ok(())
    }

    fn accept_client(&mut self) -> Result<()> {
        let mut address: sockaddr_in6 = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_in6>() as libc::socklen_t;

        let socket = Socket::from_raw(
            unsafe {
                accept(
                    self.listener.as_raw_fd(),
                    &mut address as *mut _ as *mut sockaddr,
                    &mut length,
                )
            },
            "accept",
        )?;

        let file_descriptor = socket.as_raw_fd();
        let peer = peer_address(&address).to_string();

        info!(client = %peer, "client connected");

        if !self.registry.insert(Client::new(socket, peer)) {
            return Err(ServerError::DuplicateClient { file_descriptor });
        }

        self.events.push(Event::default());
        self.poller.register(file_descriptor, Interest::READABLE)?;

        Ok(())
    }

    /// Handles one client event: hint-bounded read, then disconnect if the
    /// record carries EOF. A readable hint of zero with no EOF is a spurious
    /// wakeup and falls through both branches.
    fn dispatch(&mut self, event: Event) {
        let file_descriptor = event.file_descriptor();

        if event.readable() > 0 {
            let mut payload = vec![0u8; event.readable()];
            let count = unsafe {
                read(
                    file_descriptor,
                    payload.as_mut_ptr() as *mut _,
                    payload.len(),
                )
            };

            if count < 0 {
                warn!(
                    error = %io::Error::last_os_error(),
                    "read failed despite readiness",
                );
                payload.clear();
            } else {
                let count = count as usize;
                if count != payload.len() {
                    warn!(
                        hinted = payload.len(),
                        got = count,
                        "read length differs from readiness hint",
                    );
                }
                payload.truncate(count);
            }

            let peer = self.registry.peer(file_descriptor).unwrap_or("?");
            self.handler.on_data(peer, &payload);
        }

        if event.is_eof() {
            let peer = self
                .registry
                .peer(file_descriptor)
                .unwrap_or("?")
                .to_string();

            if let Some(code) = event.error() {
                // An abnormal peer disconnect is expected, not a failure.
                info!(
                    client = %peer,
                    error = %io::Error::from_raw_os_error(code),
                    "client error",
                );
            }

            if let Err(error) = self.poller.deregister(file_descriptor) {
                warn!(%error, "could not deregister disconnected client");
            }

            if self.registry.remove(file_descriptor) {
                debug!(client = %peer, "client disconnected");
            } else {
                warn!(file_descriptor, "disconnected client was not tracked");
            }
        }
    }
}

fn set_option(listener: &Socket, option: i32, phase: &'static str) -> Result<()> {
    let enable: libc::c_int = 1;

    let rc = unsafe {
        setsockopt(
            listener.as_raw_fd(),
            SOL_SOCKET,
            option,
            &enable as *const _ as *const _,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(ServerError::syscall(phase));
    }

    Ok(())
}

/// Renders the accept-time address as `[ip]:port` text.
fn peer_address(address: &sockaddr_in6) -> SocketAddrV6 {
    SocketAddrV6::new(
        Ipv6Addr::from(address.sin6_addr.s6_addr),
        u16::from_be(address.sin6_port),
        address.sin6_flowinfo,
        address.sin6_scope_id,
    )
}
