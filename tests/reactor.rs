mod util;

#[cfg(test)]
mod tests {
    use super::util::{connect, trace_init};

    use spindle::net::Socket;
    use spindle::reactor::handlers::{TcpEchoClient, TcpServer, UdpEchoServer, UdpTimeServer};
    use spindle::reactor::{Changes, EventLoop, Handler};

    use std::io::{self, Read, Write};
    use std::net::{Shutdown, UdpSocket};
    use std::os::fd::RawFd;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn udp_request(server: &str, payload: &[u8]) -> Vec<u8> {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind client");
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("Failed to set timeout");
        socket
            .send_to(payload, server)
            .expect("Failed to send datagram");

        let mut buf = [0u8; 512];
        let (n, _) = socket.recv_from(&mut buf).expect("Failed to receive reply");
        buf[..n].to_vec()
    }

    #[test]
    fn test_servers_share_one_loop() {
        trace_init();

        let mut event_loop = EventLoop::new();

        let tcp = TcpServer::bind("127.0.0.1:0", TcpEchoClient::new).expect("Failed to bind tcp");
        let echo = UdpEchoServer::bind("127.0.0.1:0").expect("Failed to bind udp echo");
        let time = UdpTimeServer::bind("127.0.0.1:0").expect("Failed to bind udp time");

        let tcp_addr = tcp.local_addr().expect("Failed to get address").to_string();
        let echo_addr = echo.local_addr().expect("Failed to get address").to_string();
        let time_addr = time.local_addr().expect("Failed to get address").to_string();

        event_loop.add(tcp);
        event_loop.add(echo);
        event_loop.add(time);

        let client = thread::spawn(move || {
            let echoed = udp_request(&echo_addr, b"hello udp");
            let stamp = udp_request(&time_addr, b"");

            let mut stream = connect(&tcp_addr);
            stream.write_all(b"hello tcp").expect("Failed to write");
            let mut reply = [0u8; 9];
            stream.read_exact(&mut reply).expect("Failed to read echo");

            (echoed, stamp, reply)
        });

        let mut connected = false;
        loop {
            event_loop
                .turn()
                .expect("Failed to turn event loop")
                .expect("servers always want readiness");

            match event_loop.len() {
                4 => connected = true,
                3 if connected => break,
                _ => {}
            }
        }

        let (echoed, stamp, reply) = client.join().expect("Client thread panicked");

        assert_eq!(echoed, b"hello udp");
        assert_eq!(&reply, b"hello tcp");

        // `ctime(3)` layout: "Mon Oct 19 14:03:05 2026".
        let stamp = String::from_utf8(stamp).expect("Failed to decode time");
        let fields: Vec<&str> = stamp.split_whitespace().collect();
        assert_eq!(stamp.len(), 24, "{stamp:?}");
        assert_eq!(fields.len(), 5, "{stamp:?}");
        assert!(["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"].contains(&fields[0]));
        assert_eq!(fields[3].split(':').count(), 3);

        let this_year = 1970 + SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Failed to read clock")
            .as_secs()
            / 31_556_952;
        let year: u64 = fields[4].parse().expect("Failed to parse year");
        assert!(this_year.abs_diff(year) <= 1);
    }

    #[test]
    fn test_echo_client_buffers_large_payload() {
        const TOTAL: usize = 256 * 1024;

        let (ours, theirs) = UnixStream::pair().expect("Failed to create pair");
        let socket = Socket::from_std(ours).expect("Failed to adopt socket");

        let mut event_loop = EventLoop::new();
        event_loop.add(TcpEchoClient::from_socket(socket));

        let mut writer = theirs.try_clone().expect("Failed to clone stream");
        let sender = thread::spawn(move || {
            let payload: Vec<u8> = (0..TOTAL).map(|i| (i % 199) as u8).collect();
            writer.write_all(&payload).expect("Failed to write");
            payload
        });

        let receiver = thread::spawn(move || {
            let mut reader = theirs;
            let mut echoed = vec![0u8; TOTAL];
            reader.read_exact(&mut echoed).expect("Failed to read echo");
            reader
                .shutdown(Shutdown::Both)
                .expect("Failed to shut down");
            echoed
        });

        event_loop.run().expect("Failed to run event loop");

        let payload = sender.join().expect("Sender panicked");
        let echoed = receiver.join().expect("Receiver panicked");

        assert_eq!(echoed, payload);
        assert!(event_loop.is_empty(), "the client leaves once its peer closes");
    }

    /// Joins a reader for a second descriptor the first time it runs, and
    /// records every callback in order.
    struct Spawner {
        socket: Socket,
        child: Option<Socket>,
        log: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
    }

    impl Handler for Spawner {
        fn fd(&self) -> RawFd {
            self.socket.fd()
        }

        fn wants_to_receive(&self) -> bool {
            true
        }

        fn handle_receive(&mut self, changes: &mut Changes) -> io::Result<()> {
            let mut buf = [0u8; 16];
            let _ = self.socket.try_read(&mut buf)?;
            self.log.borrow_mut().push("spawner");

            if let Some(socket) = self.child.take() {
                changes.join(Child {
                    socket,
                    log: self.log.clone(),
                });
            }

            changes.leave_current();
            Ok(())
        }
    }

    struct Child {
        socket: Socket,
        log: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
    }

    impl Handler for Child {
        fn fd(&self) -> RawFd {
            self.socket.fd()
        }

        fn wants_to_receive(&self) -> bool {
            true
        }

        fn handle_receive(&mut self, changes: &mut Changes) -> io::Result<()> {
            let mut buf = [0u8; 16];
            let _ = self.socket.try_read(&mut buf)?;
            self.log.borrow_mut().push("child");
            changes.leave_current();
            Ok(())
        }
    }

    #[test]
    fn test_joined_handler_runs_from_next_tick() {
        let (a, a_peer) = Socket::pair().expect("Failed to create pair");
        let (b, b_peer) = Socket::pair().expect("Failed to create pair");

        // Both descriptors are readable before the first tick.
        a_peer.try_write(b"x").expect("Failed to write");
        b_peer.try_write(b"y").expect("Failed to write");

        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut event_loop = EventLoop::new();
        event_loop.add(Spawner {
            socket: a,
            child: Some(b),
            log: log.clone(),
        });

        let first = event_loop
            .turn()
            .expect("Failed to turn")
            .expect("spawner wants readiness");
        assert_eq!(first.dispatched, 1);
        assert_eq!(first.joined, 1);
        assert_eq!(first.left, 1);
        assert_eq!(*log.borrow(), ["spawner"]);

        let second = event_loop
            .turn()
            .expect("Failed to turn")
            .expect("child wants readiness");
        assert_eq!(second.dispatched, 1);
        assert_eq!(*log.borrow(), ["spawner", "child"]);

        assert!(event_loop.turn().expect("Failed to turn").is_none());
    }
}
