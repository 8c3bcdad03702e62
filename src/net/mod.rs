//! Socket facade.
//!
//! This module exposes sockets as things tasks can suspend on rather than
//! blocking calls:
//! - [`Socket`] describes operations as [`Intent`](crate::Intent)s for
//!   hand-written tasks,
//! - [`Stream`] and [`Listener`] wrap the same intents in `async` methods,
//! - [`LineReader`] builds line-oriented reads out of one-byte intents,
//! - [`UdpSocket`] serves datagram handlers of the reactor event loop.
//!
//! These types never block the thread and should be used instead of
//! blocking `std::net` sockets.

mod line;
mod listener;
mod socket;
mod stream;
mod udp;

pub use line::{LineReader, LineStep};
pub use listener::Listener;
pub use socket::Socket;
pub use stream::Stream;
pub use udp::UdpSocket;
