use bytes::BytesMut;
use powerlog_transport::{Transport, TransportError};
use tracing::{debug, warn};

use crate::codec::{encode_line, LineConfig};
use crate::error::{LineError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Outcome of waiting for one response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A complete line, terminator stripped. May be empty.
    Line(String),
    /// No terminator arrived before the deadline.
    ///
    /// `discarded` is the length of the unterminated partial line that was
    /// dropped; non-zero means the byte stream position is no longer trusted.
    TimedOut { discarded: usize },
}

impl Reply {
    /// Response text; empty for a timeout.
    pub fn text(&self) -> &str {
        match self {
            Reply::Line(line) => line,
            Reply::TimedOut { .. } => "",
        }
    }

    /// Consume into the response text; empty for a timeout.
    pub fn into_text(self) -> String {
        match self {
            Reply::Line(line) => line,
            Reply::TimedOut { .. } => String::new(),
        }
    }

    /// Whether the deadline expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Reply::TimedOut { .. })
    }
}

/// Result of an operation-complete confirmed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The instrument answered `1`.
    Confirmed,
    /// The instrument answered something else (empty on timeout).
    Unexpected(String),
}

impl Completion {
    /// Whether the operation-complete check passed.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Completion::Confirmed)
    }
}

/// A terminator-framed command session over a [`Transport`].
///
/// One logical caller at a time: `query` is a send followed by a receive and
/// nothing prevents another send from interleaving if the session is shared.
#[derive(Debug)]
pub struct LineSession<T> {
    transport: T,
    config: LineConfig,
    buf: BytesMut,
    desynchronized: bool,
}

impl<T: Transport> LineSession<T> {
    /// Create a session with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, LineConfig::default())
    }

    /// Create a session with explicit configuration.
    pub fn with_config(transport: T, config: LineConfig) -> Self {
        Self {
            transport,
            config,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            desynchronized: false,
        }
    }

    /// Send one command line. No response is read.
    pub fn send(&mut self, command: &str) -> Result<()> {
        self.buf.clear();
        encode_line(command, self.config.terminator, &mut self.buf)?;
        debug!(command, "send");
        self.transport.send(&self.buf)?;
        Ok(())
    }

    /// Wait for one response line.
    ///
    /// A timeout is reported as [`Reply::TimedOut`] and logged, not raised:
    /// pollers treat it as "nothing this tick". All other transport failures
    /// propagate.
    pub fn receive_line(&mut self) -> Result<Reply> {
        match self
            .transport
            .receive_until(self.config.terminator.as_bytes(), self.config.read_timeout)
        {
            Ok(bytes) => {
                let len = bytes.len();
                let line = String::from_utf8(bytes.to_vec()).map_err(|_| LineError::Encoding(len))?;
                debug!(%line, "receive");
                Ok(Reply::Line(line))
            }
            Err(TransportError::Timeout { timeout, discarded }) => {
                if discarded > 0 {
                    self.desynchronized = true;
                }
                warn!(?timeout, discarded, "receive timed out");
                Ok(Reply::TimedOut { discarded })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Send a command and wait for its response line.
    ///
    /// A timeout here marks the session desynchronized even when no bytes
    /// arrived: the reply may still come and would answer the next query.
    pub fn query(&mut self, command: &str) -> Result<Reply> {
        self.send(command)?;
        let reply = self.receive_line()?;
        if reply.is_timeout() {
            self.desynchronized = true;
            warn!(command, "reply missed its deadline; session needs reconnect");
        }
        Ok(reply)
    }

    /// Send a command chained with the operation-complete query and check for `1`.
    ///
    /// Any other reply is logged and returned as [`Completion::Unexpected`];
    /// the session stays usable.
    pub fn send_command(&mut self, command: &str) -> Result<Completion> {
        let chained = format!("{command};{}", self.config.opc_query);
        let reply = self.query(&chained)?;
        if reply.text() == "1" {
            return Ok(Completion::Confirmed);
        }
        warn!(command, reply = reply.text(), "opc returned unexpected value");
        Ok(Completion::Unexpected(reply.into_text()))
    }

    /// Send an out-of-band break through the transport.
    pub fn send_break(&mut self) -> bool {
        self.transport.send_break()
    }

    /// Whether the byte stream position is lost since the last reconnect.
    ///
    /// Set when a timeout dropped part of a line, or when a query got no
    /// reply in time. The next line may then be a stale response, so the
    /// caller should reconnect instead of reading on.
    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Reopen the transport and start from a clean byte stream.
    pub fn reconnect(&mut self) -> Result<()> {
        self.transport.reconnect()?;
        self.desynchronized = false;
        Ok(())
    }

    /// Close the underlying transport. Idempotent.
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Whether the underlying transport is open.
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the session and return the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Current session configuration.
    pub fn config(&self) -> &LineConfig {
        &self.config
    }
}
