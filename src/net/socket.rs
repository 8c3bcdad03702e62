use crate::reactor::poller::platform::{
    sys_close, sys_peername, sys_pipe, sys_read, sys_set_nonblocking, sys_set_recv_buffer,
    sys_set_send_buffer, sys_shutdown, sys_socketpair, sys_sockname, sys_take_error, sys_write,
};
use crate::runtime::context;
use crate::runtime::intent::Intent;

use std::io;
use std::mem;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

/// An owned non-blocking descriptor: a TCP socket, one end of a Unix socket
/// pair, or one end of a pipe.
///
/// `Socket` never blocks. Its I/O methods come in two shapes: the `try_*`
/// methods perform the call immediately and may fail with `WouldBlock`,
/// while [`recv`](Self::recv), [`send`](Self::send) and
/// [`accept`](Self::accept) only describe the operation as an [`Intent`]
/// for a task to hand to the scheduler.
///
/// The descriptor is closed on drop.
#[derive(Debug)]
pub struct Socket {
    fd: RawFd,
}

impl Socket {
    pub(crate) fn from_raw(fd: RawFd) -> Self {
        Self { fd }
    }

    /// Takes ownership of a standard library socket or pipe end and switches
    /// it to non-blocking mode.
    pub fn from_std<T: IntoRawFd>(io: T) -> io::Result<Self> {
        let fd = io.into_raw_fd();

        if let Err(e) = sys_set_nonblocking(fd) {
            sys_close(fd);
            return Err(e);
        }

        Ok(Self { fd })
    }

    /// Creates a connected pair of Unix stream sockets.
    pub fn pair() -> io::Result<(Socket, Socket)> {
        let (a, b) = sys_socketpair()?;
        Ok((Self::from_raw(a), Self::from_raw(b)))
    }

    /// Creates a pipe, returning `(read_end, write_end)`.
    pub fn pipe() -> io::Result<(Socket, Socket)> {
        let (read, write) = sys_pipe()?;
        Ok((Self::from_raw(read), Self::from_raw(write)))
    }

    /// The underlying descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Describes a receive of up to `max` bytes.
    pub fn recv(&self, max: usize) -> Intent {
        Intent::Read { fd: self.fd, max }
    }

    /// Describes a single send attempt of `data`.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Intent {
        Intent::Write {
            fd: self.fd,
            data: data.into(),
        }
    }

    /// Describes accepting one connection on this listening socket.
    pub fn accept(&self) -> Intent {
        Intent::Accept { fd: self.fd }
    }

    /// Reads into `buf` right away.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        sys_read(self.fd, buf)
    }

    /// Writes from `buf` right away.
    pub fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        sys_write(self.fd, buf)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        sys_sockname(self.fd)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        sys_peername(self.fd)
    }

    /// Shuts down the read, write, or both halves of this connection.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        sys_shutdown(self.fd, how)
    }

    /// Sets `SO_SNDBUF`. The kernel may round the value.
    pub fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
        sys_set_send_buffer(self.fd, size)
    }

    /// Sets `SO_RCVBUF`. The kernel may round the value.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        sys_set_recv_buffer(self.fd, size)
    }

    /// Reads and clears the pending socket error (`SO_ERROR`).
    pub fn take_error(&self) -> io::Result<Option<io::Error>> {
        sys_take_error(self.fd)
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl IntoRawFd for Socket {
    fn into_raw_fd(self) -> RawFd {
        let fd = self.fd;
        mem::forget(self);
        fd
    }
}

impl Drop for Socket {
    /// Closes the descriptor.
    fn drop(&mut self) {
        context::record_close(self.fd);
        sys_close(self.fd);
    }
}
