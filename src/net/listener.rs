use super::{Socket, Stream};
use crate::reactor::poller::platform::{
    sys_bind, sys_close, sys_ipv6_is_necessary, sys_listen, sys_parse_sockaddr, sys_set_reuseaddr,
    sys_stream_socket,
};
use crate::runtime::task::wait;

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

/// A listening TCP socket.
///
/// Accepting suspends the calling task until a client connects. For
/// hand-written tasks, [`socket`](Self::socket) exposes the
/// [`Socket::accept`] intent directly.
#[derive(Debug)]
pub struct Listener {
    socket: Socket,
}

impl Listener {
    /// Binds a TCP listener to the given address.
    ///
    /// The address must be a valid socket address string, such as
    /// `"127.0.0.1:8080"` or `"[::1]:8080"`.
    ///
    /// This function:
    /// - creates a non-blocking socket,
    /// - enables `SO_REUSEADDR`,
    /// - configures IPv6 dual-stack if applicable,
    /// - binds and starts listening.
    pub fn bind(address: &str) -> io::Result<Self> {
        let (storage, len) = sys_parse_sockaddr(address)?;
        let domain = storage.ss_family as i32;

        let fd = sys_stream_socket(domain)?;

        let setup = sys_set_reuseaddr(fd)
            .and_then(|()| sys_ipv6_is_necessary(fd, domain))
            .and_then(|()| sys_bind(fd, &storage, len))
            .and_then(|()| sys_listen(fd));

        if let Err(e) = setup {
            sys_close(fd);
            return Err(e);
        }

        Ok(Self {
            socket: Socket::from_raw(fd),
        })
    }

    /// Accepts an incoming connection.
    pub async fn accept(&self) -> io::Result<(Stream, SocketAddr)> {
        let (socket, addr) = wait(self.socket.accept()).await.into_accepted()?;

        Ok((Stream::from_socket(socket), addr))
    }

    /// Returns the local socket address of this listener.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The listening socket.
    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    pub fn into_socket(self) -> Socket {
        self.socket
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.fd()
    }
}
