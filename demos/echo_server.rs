//! Line-based TCP echo server: every line a client sends comes back
//! prefixed with `GOT:`.
//!
//! ```text
//! cargo run --example echo_server -- --addr 127.0.0.1:25000
//! ```

use clap::Parser;
use spindle::net::{Listener, Stream};
use spindle::task;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Echo every line back to the client, prefixed with GOT:")]
struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:25000")]
    addr: String,

    /// Tracing filter directives.
    #[arg(long, env = "RUST_LOG", default_value = "echo_server=info,spindle=info")]
    log: String,
}

#[spindle::main(task_capacity = 1024)]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .init();

    let listener = match Listener::bind(&args.addr) {
        Ok(listener) => listener,
        Err(err) => {
            warn!(addr = %args.addr, %err, "failed to bind");
            return;
        }
    };
    info!(addr = %args.addr, "echo server listening");

    loop {
        match listener.accept().await {
            Ok((client, addr)) => {
                info!(%addr, "connection");
                task::spawn(serve(client));
            }
            Err(err) => warn!(%err, "accept failed"),
        }
    }
}

async fn serve(client: Stream) {
    loop {
        let line = match client.read_line().await {
            Ok(line) if line.is_empty() => break,
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "read failed");
                break;
            }
        };

        let reply = [&b"GOT:"[..], &line[..]].concat();
        if let Err(err) = client.write_all(&reply).await {
            warn!(%err, "write failed");
            break;
        }
    }

    info!("connection closed");
}
