//! Byte-stream transports for line-oriented instrument protocols.
//!
//! Provides a unified interface over the two links used by bench power analyzers:
//! - Raw TCP sockets (LAN-attached analyzers)
//! - Telnet over TCP (RS-232 to Ethernet bridges)
//!
//! This is the lowest layer of powerlog. Everything else builds on top of
//! the [`Transport`] trait and the [`Connection`] type provided here.

pub mod accumulate;
pub mod error;
pub mod tcp;
pub mod telnet;
pub mod traits;

pub use accumulate::receive_until;
pub use error::{Result, TransportError};
pub use tcp::{side_channel_break, TcpTransport, BREAK_OK};
pub use telnet::TelnetTransport;
pub use traits::{Connection, LinkKind, Transport, TransportConfig};
