use libc::{
    AF_INET, AF_INET6, AF_UNIX, F_GETFL, F_SETFL, FD_CLOEXEC, F_SETFD, IPPROTO_IPV6, IPV6_V6ONLY,
    O_NONBLOCK, SHUT_RD, SHUT_RDWR, SHUT_WR, SO_ERROR, SO_RCVBUF, SO_REUSEADDR, SO_SNDBUF,
    SOCK_DGRAM, SOCK_STREAM, SOL_SOCKET, accept, bind, c_int, close, connect, fcntl, getpeername,
    getsockname, getsockopt, listen, localtime_r, nfds_t, pipe, poll, pollfd, read, recvfrom,
    sendto, setsockopt, shutdown, sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage, socket,
    socketpair, socklen_t, time, tm, write,
};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::str::FromStr;
use std::{io, mem, ptr};

/// Backlog handed to `listen(2)`.
pub(crate) const LISTEN_BACKLOG: c_int = 128;

fn cvt(rc: c_int) -> io::Result<c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn cvt_size(rc: isize) -> io::Result<usize> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Reads from a file descriptor into the given buffer.
///
/// The file descriptor **must** be non-blocking.
pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    cvt_size(unsafe { read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) })
}

/// Writes the buffer to a file descriptor.
///
/// The file descriptor **must** be non-blocking.
pub(crate) fn sys_write(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    cvt_size(unsafe { write(fd, buffer.as_ptr() as *const _, buffer.len()) })
}

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Sets a file descriptor to non-blocking mode and marks it close-on-exec.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = cvt(unsafe { fcntl(fd, F_GETFL) })?;
    cvt(unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) })?;
    cvt(unsafe { fcntl(fd, F_SETFD, FD_CLOEXEC) })?;

    Ok(())
}

/// Creates a non-blocking socket of the given domain and type.
pub(crate) fn sys_socket(domain: c_int, ty: c_int) -> io::Result<RawFd> {
    let fd = cvt(unsafe { socket(domain, ty, 0) })?;

    if let Err(e) = sys_set_nonblocking(fd) {
        sys_close(fd);
        return Err(e);
    }

    Ok(fd)
}

/// Creates a non-blocking stream socket.
pub(crate) fn sys_stream_socket(domain: c_int) -> io::Result<RawFd> {
    sys_socket(domain, SOCK_STREAM)
}

/// Creates a non-blocking datagram socket.
pub(crate) fn sys_datagram_socket(domain: c_int) -> io::Result<RawFd> {
    sys_socket(domain, SOCK_DGRAM)
}

/// Creates a connected pair of non-blocking Unix stream sockets.
pub(crate) fn sys_socketpair() -> io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as c_int; 2];
    cvt(unsafe { socketpair(AF_UNIX, SOCK_STREAM, 0, fds.as_mut_ptr()) })?;

    for fd in fds {
        if let Err(e) = sys_set_nonblocking(fd) {
            sys_close(fds[0]);
            sys_close(fds[1]);
            return Err(e);
        }
    }

    Ok((fds[0], fds[1]))
}

/// Creates a non-blocking pipe, returning `(read_end, write_end)`.
pub(crate) fn sys_pipe() -> io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as c_int; 2];
    cvt(unsafe { pipe(fds.as_mut_ptr()) })?;

    for fd in fds {
        if let Err(e) = sys_set_nonblocking(fd) {
            sys_close(fds[0]);
            sys_close(fds[1]);
            return Err(e);
        }
    }

    Ok((fds[0], fds[1]))
}

/// Binds a socket to an address.
pub(crate) fn sys_bind(fd: RawFd, addr: &sockaddr_storage, len: socklen_t) -> io::Result<()> {
    cvt(unsafe { bind(fd, addr as *const _ as *const sockaddr, len) }).map(drop)
}

/// Marks a socket as a listening socket.
pub(crate) fn sys_listen(fd: RawFd) -> io::Result<()> {
    cvt(unsafe { listen(fd, LISTEN_BACKLOG) }).map(drop)
}

/// Accepts a new incoming connection.
///
/// The returned client socket is automatically set to non-blocking mode.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let client_fd = cvt(unsafe { accept(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;

    if let Err(e) = sys_set_nonblocking(client_fd) {
        sys_close(client_fd);
        return Err(e);
    }

    match sockaddr_storage_to_socketaddr(&storage) {
        Ok(addr) => Ok((client_fd, addr)),
        Err(e) => {
            sys_close(client_fd);
            Err(e)
        }
    }
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    cvt(unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;
    sockaddr_storage_to_socketaddr(&storage)
}

/// Returns the remote address of a connected socket.
pub(crate) fn sys_peername(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    cvt(unsafe { getpeername(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;
    sockaddr_storage_to_socketaddr(&storage)
}

/// Initiates a non-blocking connection.
pub(crate) fn sys_connect(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);

    cvt(unsafe { connect(fd, &storage as *const _ as *const sockaddr, len) }).map(drop)
}

/// Reads and clears the pending error of a socket (`SO_ERROR`).
pub(crate) fn sys_take_error(fd: RawFd) -> io::Result<Option<io::Error>> {
    let mut value: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    cvt(unsafe {
        getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            &mut value as *mut _ as *mut _,
            &mut len,
        )
    })?;

    if value == 0 {
        Ok(None)
    } else {
        Ok(Some(io::Error::from_raw_os_error(value)))
    }
}

/// Shuts down a socket.
pub(crate) fn sys_shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => SHUT_RD,
        Shutdown::Write => SHUT_WR,
        Shutdown::Both => SHUT_RDWR,
    };

    cvt(unsafe { shutdown(fd, how) }).map(drop)
}

fn sys_setsockopt_int(fd: RawFd, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
    cvt(unsafe {
        setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const _,
            mem::size_of::<c_int>() as socklen_t,
        )
    })
    .map(drop)
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    sys_setsockopt_int(fd, SOL_SOCKET, SO_REUSEADDR, 1)
}

/// Sets `SO_SNDBUF`.
pub(crate) fn sys_set_send_buffer(fd: RawFd, size: usize) -> io::Result<()> {
    sys_setsockopt_int(fd, SOL_SOCKET, SO_SNDBUF, size.min(c_int::MAX as usize) as c_int)
}

/// Sets `SO_RCVBUF`.
pub(crate) fn sys_set_recv_buffer(fd: RawFd, size: usize) -> io::Result<()> {
    sys_setsockopt_int(fd, SOL_SOCKET, SO_RCVBUF, size.min(c_int::MAX as usize) as c_int)
}

/// Enables IPv6 dual-stack support when required.
pub(crate) fn sys_ipv6_is_necessary(fd: RawFd, domain: c_int) -> io::Result<()> {
    if domain == AF_INET6 {
        sys_setsockopt_int(fd, IPPROTO_IPV6, IPV6_V6ONLY, 0)?;
    }
    Ok(())
}

/// Receives one datagram, returning its length and sender.
pub(crate) fn sys_recv_from(fd: RawFd, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let n = cvt_size(unsafe {
        recvfrom(
            fd,
            buffer.as_mut_ptr() as *mut _,
            buffer.len(),
            0,
            &mut storage as *mut _ as *mut sockaddr,
            &mut len,
        )
    })?;

    Ok((n, sockaddr_storage_to_socketaddr(&storage)?))
}

/// Sends one datagram to `addr`.
pub(crate) fn sys_send_to(fd: RawFd, buffer: &[u8], addr: &SocketAddr) -> io::Result<usize> {
    let (storage, len) = socketaddr_to_storage(addr);

    cvt_size(unsafe {
        sendto(
            fd,
            buffer.as_ptr() as *const _,
            buffer.len(),
            0,
            &storage as *const _ as *const sockaddr,
            len,
        )
    })
}

/// Blocks in `poll(2)` without a timeout.
///
/// Returns the number of entries with non-zero `revents`.
pub(crate) fn sys_poll(fds: &mut [pollfd]) -> io::Result<usize> {
    let n = unsafe { poll(fds.as_mut_ptr(), fds.len() as nfds_t, -1) };
    cvt(n).map(|n| n as usize)
}

/// The current local time in `ctime(3)` layout, without the trailing
/// newline: `Mon Oct 19 14:03:05 2026`.
pub(crate) fn sys_ctime() -> io::Result<String> {
    const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let now = unsafe { time(ptr::null_mut()) };
    if now == -1 {
        return Err(io::Error::last_os_error());
    }

    let mut local: tm = unsafe { mem::zeroed() };
    if unsafe { localtime_r(&now, &mut local) }.is_null() {
        return Err(io::Error::last_os_error());
    }

    let day = DAYS.get(local.tm_wday as usize);
    let month = MONTHS.get(local.tm_mon as usize);
    let (Some(day), Some(month)) = (day, month) else {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "broken-down time out of range"));
    };

    Ok(format!(
        "{day} {month} {:2} {:02}:{:02}:{:02} {}",
        local.tm_mday,
        local.tm_hour,
        local.tm_min,
        local.tm_sec,
        local.tm_year + 1900
    ))
}

/// Parses a socket address string into a `sockaddr_storage`.
pub(crate) fn sys_parse_sockaddr(address: &str) -> io::Result<(sockaddr_storage, socklen_t)> {
    let addr = SocketAddr::from_str(address)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid socket addr"))?;

    Ok(socketaddr_to_storage(&addr))
}

/// Converts a `sockaddr_storage` to a Rust `SocketAddr`.
pub(crate) fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Converts a `SocketAddr` to a `sockaddr_storage`.
pub(crate) fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }

        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();

            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}

/// Returns `true` for errors that mean "not ready yet, try again later".
pub(crate) fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
