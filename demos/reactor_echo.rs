//! Handler-based servers sharing one event loop: a TCP echo server, a UDP
//! echo server and a UDP time server.

use clap::Parser;
use spindle::reactor::EventLoop;
use spindle::reactor::handlers::{TcpEchoClient, TcpServer, UdpEchoServer, UdpTimeServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:16000")]
    tcp: String,

    #[arg(long, default_value = "127.0.0.1:15000")]
    udp_echo: String,

    #[arg(long, default_value = "127.0.0.1:14000")]
    udp_time: String,

    /// Tracing filter directives.
    #[arg(long, env = "RUST_LOG", default_value = "reactor_echo=info,spindle=debug")]
    log: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .init();

    let mut event_loop = EventLoop::new();
    event_loop.add(TcpServer::bind(&args.tcp, TcpEchoClient::new)?);
    event_loop.add(UdpEchoServer::bind(&args.udp_echo)?);
    event_loop.add(UdpTimeServer::bind(&args.udp_time)?);

    info!(tcp = %args.tcp, udp_echo = %args.udp_echo, udp_time = %args.udp_time, "serving");
    event_loop.run()?;

    Ok(())
}
