use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;
use crate::tcp::TcpTransport;
use crate::telnet::TelnetTransport;

/// A connected byte link to an instrument.
///
/// Implementations own the underlying socket. Every method other than
/// [`close`](Transport::close) and [`is_open`](Transport::is_open) fails with
/// [`TransportError::NotConnected`](crate::TransportError::NotConnected) once
/// the link has been closed.
pub trait Transport {
    /// Write the exact byte sequence.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read until `terminator` is observed and return the payload without it.
    fn receive_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Bytes>;

    /// Issue an out-of-band break. Best effort: failures are reported as `false`.
    fn send_break(&mut self) -> bool;

    /// Release the connection. Idempotent.
    fn close(&mut self);

    /// Close the link and open a fresh one to the same endpoint.
    fn reconnect(&mut self) -> Result<()>;

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }

    fn receive_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Bytes> {
        (**self).receive_until(terminator, timeout)
    }

    fn send_break(&mut self) -> bool {
        (**self).send_break()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn reconnect(&mut self) -> Result<()> {
        (**self).reconnect()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Timeouts applied to a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Maximum time to establish the TCP connection.
    pub connect_timeout: Duration,
    /// Deadline for every blocking read, including the break side channel.
    pub read_timeout: Duration,
    /// Optional write timeout; `None` blocks until the kernel accepts the data.
    pub write_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(2),
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// How the instrument is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Plain TCP socket; break goes to a side channel on `port + 1`.
    Raw,
    /// Telnet over TCP; break is the Telnet `BRK` command.
    Telnet,
}

/// A connected link of either kind.
#[derive(Debug)]
pub struct Connection {
    inner: ConnectionInner,
}

#[derive(Debug)]
enum ConnectionInner {
    Raw(TcpTransport),
    Telnet(TelnetTransport),
}

impl Connection {
    /// Open a link of the given kind to `host:port`.
    pub fn open(kind: LinkKind, host: &str, port: u16, config: TransportConfig) -> Result<Self> {
        let inner = match kind {
            LinkKind::Raw => ConnectionInner::Raw(TcpTransport::connect(host, port, config)?),
            LinkKind::Telnet => {
                ConnectionInner::Telnet(TelnetTransport::connect(host, port, config)?)
            }
        };
        Ok(Self { inner })
    }

    /// The kind of link this connection uses.
    pub fn kind(&self) -> LinkKind {
        match &self.inner {
            ConnectionInner::Raw(_) => LinkKind::Raw,
            ConnectionInner::Telnet(_) => LinkKind::Telnet,
        }
    }

    /// `host:port` of the instrument.
    pub fn peer(&self) -> String {
        match &self.inner {
            ConnectionInner::Raw(t) => format!("{}:{}", t.host(), t.port()),
            ConnectionInner::Telnet(t) => format!("{}:{}", t.host(), t.port()),
        }
    }
}

impl Transport for Connection {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.inner {
            ConnectionInner::Raw(t) => t.send(bytes),
            ConnectionInner::Telnet(t) => t.send(bytes),
        }
    }

    fn receive_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Bytes> {
        match &mut self.inner {
            ConnectionInner::Raw(t) => t.receive_until(terminator, timeout),
            ConnectionInner::Telnet(t) => t.receive_until(terminator, timeout),
        }
    }

    fn send_break(&mut self) -> bool {
        match &mut self.inner {
            ConnectionInner::Raw(t) => t.send_break(),
            ConnectionInner::Telnet(t) => t.send_break(),
        }
    }

    fn close(&mut self) {
        match &mut self.inner {
            ConnectionInner::Raw(t) => t.close(),
            ConnectionInner::Telnet(t) => t.close(),
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        match &mut self.inner {
            ConnectionInner::Raw(t) => t.reconnect(),
            ConnectionInner::Telnet(t) => t.reconnect(),
        }
    }

    fn is_open(&self) -> bool {
        match &self.inner {
            ConnectionInner::Raw(t) => t.is_open(),
            ConnectionInner::Telnet(t) => t.is_open(),
        }
    }
}
