use super::Socket;
use crate::reactor::poller::platform::{
    sockaddr_storage_to_socketaddr, sys_close, sys_connect, sys_ipv6_is_necessary,
    sys_parse_sockaddr, sys_stream_socket,
};
use crate::runtime::task::wait;

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};

/// A connected byte stream driven by the scheduler.
///
/// Every method that would block suspends the calling task on an
/// [`Intent`](crate::Intent) instead. `Stream` must be used **inside a
/// task** running on a [`Scheduler`](crate::Scheduler).
///
/// Only one read and one write may be pending on a stream at a time.
#[derive(Debug)]
pub struct Stream {
    socket: Socket,
}

impl Stream {
    /// Wraps an already connected socket.
    pub fn from_socket(socket: Socket) -> Self {
        Self { socket }
    }

    /// Creates a connected pair of Unix stream sockets.
    pub fn pair() -> io::Result<(Stream, Stream)> {
        let (a, b) = Socket::pair()?;
        Ok((Self::from_socket(a), Self::from_socket(b)))
    }

    /// Establishes a TCP connection to `address`.
    ///
    /// The address must be a string accepted by `SocketAddr::from_str`,
    /// e.g. `"127.0.0.1:8080"` or `"[::1]:8080"`.
    ///
    /// The connection is started without blocking; the task then waits for
    /// the socket to become writable and checks `SO_ERROR`.
    pub async fn connect(address: &str) -> io::Result<Self> {
        let (storage, _) = sys_parse_sockaddr(address)?;
        let addr = sockaddr_storage_to_socketaddr(&storage)?;

        let domain = storage.ss_family as i32;
        let fd = sys_stream_socket(domain)?;
        if let Err(e) = sys_ipv6_is_necessary(fd, domain) {
            sys_close(fd);
            return Err(e);
        }

        let socket = Socket::from_raw(fd);

        match sys_connect(fd, &addr) {
            Ok(()) => return Ok(Self::from_socket(socket)),
            Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(err) => return Err(err),
        }

        // An empty write resolves as soon as the connection is established
        // or has failed; a failure surfaces either here or in SO_ERROR.
        wait(socket.send(Vec::new())).await.into_wrote()?;

        match socket.take_error()? {
            Some(err) => Err(err),
            None => Ok(Self::from_socket(socket)),
        }
    }

    /// Reads up to `max` bytes. An empty result means the peer closed the
    /// connection.
    pub async fn read(&self, max: usize) -> io::Result<Vec<u8>> {
        wait(self.socket.recv(max)).await.into_read()
    }

    /// Performs one send of `data`, returning how many bytes went out.
    pub async fn write(&self, data: &[u8]) -> io::Result<usize> {
        wait(self.socket.send(data)).await.into_wrote()
    }

    /// Writes the entire buffer, suspending as many times as needed.
    ///
    /// # Errors
    ///
    /// Returns `WriteZero` if a send reports progress of zero.
    pub async fn write_all(&self, mut buffer: &[u8]) -> io::Result<()> {
        while !buffer.is_empty() {
            let n = self.write(buffer).await?;

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned zero bytes",
                ));
            }

            buffer = &buffer[n..];
        }

        Ok(())
    }

    /// Reads one byte at a time until a newline (kept) or end-of-stream.
    ///
    /// An empty result means the peer closed the connection before sending
    /// anything.
    pub async fn read_line(&self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let byte = self.read(1).await?;
            if byte.is_empty() {
                return Ok(line);
            }

            line.extend_from_slice(&byte);
            if byte[0] == b'\n' {
                return Ok(line);
            }
        }
    }

    /// Shuts down the read, write, or both halves of this connection.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.socket.shutdown(how)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }

    /// The underlying socket.
    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    pub fn into_socket(self) -> Socket {
        self.socket
    }
}

impl AsRawFd for Stream {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.fd()
    }
}

impl From<Socket> for Stream {
    fn from(socket: Socket) -> Self {
        Self::from_socket(socket)
    }
}

