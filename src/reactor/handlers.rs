//! Ready-made [`Handler`]s: a TCP accept loop, a TCP echo connection, and
//! two UDP servers.

use super::event_loop::{Changes, Handler};
use crate::net::{Listener, Socket, UdpSocket};
use crate::reactor::poller::platform::{is_retryable, sys_ctime};

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

use tracing::{debug, trace};

const BUFFER_SIZE: usize = 8192;

/// Maps `WouldBlock`/`Interrupted` to `Ok(None)`: readiness was spurious.
fn ready<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_retryable(&err) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Accepts connections and adds one handler per client to the loop.
pub struct TcpServer<F> {
    listener: Listener,
    factory: F,
}

impl<F, H> TcpServer<F>
where
    F: FnMut(Socket, SocketAddr) -> H,
    H: Handler + 'static,
{
    /// Binds `address` and builds a client handler with `factory` for every
    /// accepted connection.
    pub fn bind(address: &str, factory: F) -> io::Result<Self> {
        Ok(Self {
            listener: Listener::bind(address)?,
            factory,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl<F, H> Handler for TcpServer<F>
where
    F: FnMut(Socket, SocketAddr) -> H,
    H: Handler + 'static,
{
    fn fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    fn wants_to_receive(&self) -> bool {
        true
    }

    fn handle_receive(&mut self, changes: &mut Changes) -> io::Result<()> {
        let Some(resume) = self.listener.socket().accept().resolve() else {
            return Ok(());
        };

        let (socket, addr) = resume.into_accepted()?;
        let id = changes.join((self.factory)(socket, addr));
        debug!(%addr, handler = %id, "accepted connection");

        Ok(())
    }
}

/// Echoes everything it receives back to the peer, then leaves the loop
/// when the peer closes.
pub struct TcpEchoClient {
    socket: Socket,
    outgoing: Vec<u8>,
}

impl TcpEchoClient {
    pub fn new(socket: Socket, _addr: SocketAddr) -> Self {
        Self {
            socket,
            outgoing: Vec::new(),
        }
    }

    pub fn from_socket(socket: Socket) -> Self {
        Self {
            socket,
            outgoing: Vec::new(),
        }
    }
}

impl Handler for TcpEchoClient {
    fn fd(&self) -> RawFd {
        self.socket.fd()
    }

    fn wants_to_receive(&self) -> bool {
        true
    }

    fn wants_to_send(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn handle_receive(&mut self, changes: &mut Changes) -> io::Result<()> {
        let mut buf = [0u8; BUFFER_SIZE];
        let Some(n) = ready(self.socket.try_read(&mut buf))? else {
            return Ok(());
        };

        if n == 0 {
            trace!(fd = self.socket.fd(), "peer closed");
            changes.leave_current();
        } else {
            self.outgoing.extend_from_slice(&buf[..n]);
        }

        Ok(())
    }

    fn handle_send(&mut self, _changes: &mut Changes) -> io::Result<()> {
        if let Some(n) = ready(self.socket.try_write(&self.outgoing))? {
            self.outgoing.drain(..n);
        }

        Ok(())
    }
}

/// Sends every datagram back to its sender.
pub struct UdpEchoServer {
    socket: UdpSocket,
}

impl UdpEchoServer {
    pub fn bind(address: &str) -> io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(address)?,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Handler for UdpEchoServer {
    fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    fn wants_to_receive(&self) -> bool {
        true
    }

    fn handle_receive(&mut self, _changes: &mut Changes) -> io::Result<()> {
        if let Some((msg, addr)) = ready(self.socket.try_recv_from(BUFFER_SIZE))? {
            ready(self.socket.try_send_to(&msg, &addr))?;
        }

        Ok(())
    }
}

/// Answers every datagram with the current local time in `ctime(3)`
/// layout, e.g. `Mon Oct 19 14:03:05 2026`.
pub struct UdpTimeServer {
    socket: UdpSocket,
}

impl UdpTimeServer {
    pub fn bind(address: &str) -> io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(address)?,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Handler for UdpTimeServer {
    fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    fn wants_to_receive(&self) -> bool {
        true
    }

    fn handle_receive(&mut self, _changes: &mut Changes) -> io::Result<()> {
        if let Some((_, addr)) = ready(self.socket.try_recv_from(BUFFER_SIZE))? {
            let now = sys_ctime()?;
            ready(self.socket.try_send_to(now.as_bytes(), &addr))?;
        }

        Ok(())
    }
}
