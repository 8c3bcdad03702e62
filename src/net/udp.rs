use super::Socket;
use crate::reactor::poller::platform::{
    sys_bind, sys_close, sys_datagram_socket, sys_ipv6_is_necessary, sys_parse_sockaddr,
    sys_recv_from, sys_send_to,
};

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

/// A non-blocking UDP socket.
///
/// Datagrams carry a peer address that the read and write intents have no
/// room for, so UDP is used from reactor [`Handler`](crate::reactor::Handler)s,
/// which call the `try_*` methods once the socket is reported ready.
#[derive(Debug)]
pub struct UdpSocket {
    socket: Socket,
}

impl UdpSocket {
    /// Binds a UDP socket to `address`, e.g. `"127.0.0.1:0"`.
    pub fn bind(address: &str) -> io::Result<Self> {
        let (storage, len) = sys_parse_sockaddr(address)?;
        let domain = storage.ss_family as i32;

        let fd = sys_datagram_socket(domain)?;

        let setup = sys_ipv6_is_necessary(fd, domain).and_then(|()| sys_bind(fd, &storage, len));
        if let Err(e) = setup {
            sys_close(fd);
            return Err(e);
        }

        Ok(Self {
            socket: Socket::from_raw(fd),
        })
    }

    /// Receives one datagram of at most `max` bytes.
    pub fn try_recv_from(&self, max: usize) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; max];
        let (n, addr) = sys_recv_from(self.socket.fd(), &mut buf)?;
        buf.truncate(n);

        Ok((buf, addr))
    }

    /// Sends one datagram to `addr`.
    pub fn try_send_to(&self, data: &[u8], addr: &SocketAddr) -> io::Result<usize> {
        sys_send_to(self.socket.fd(), data, addr)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl AsRawFd for UdpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.fd()
    }
}
