//! Telnet transport (RFC 854) for RS-232 to Ethernet bridges.
//!
//! The bridge forwards the instrument's serial line. Option negotiation is
//! refused wholesale, so the session stays in plain NVT mode.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::accumulate::{receive_until, READ_CHUNK_SIZE};
use crate::error::{Result, TransportError};
use crate::tcp::open_stream;
use crate::traits::{Transport, TransportConfig};

// Telnet protocol constants
pub const IAC: u8 = 255; // Interpret As Command
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250; // Subnegotiation Begin
pub const BRK: u8 = 243;
const SE: u8 = 240; // Subnegotiation End

/// The two-byte Telnet break sequence.
pub const BREAK_SEQUENCE: [u8; 2] = [IAC, BRK];

/// Telnet transport.
#[derive(Debug)]
pub struct TelnetTransport {
    stream: Option<TcpStream>,
    host: String,
    port: u16,
    config: TransportConfig,
    buf: BytesMut,
    decoder: TelnetDecoder,
}

impl TelnetTransport {
    /// Connect to a Telnet endpoint (blocking).
    pub fn connect(host: &str, port: u16, config: TransportConfig) -> Result<Self> {
        let stream = open_stream(host, port, &config)?;
        info!(host, port, "connected to telnet bridge");
        Ok(Self {
            stream: Some(stream),
            host: host.to_string(),
            port,
            config,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            decoder: TelnetDecoder::default(),
        })
    }

    /// Host this transport was connected to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port this transport was connected to.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Transport for TelnetTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(&escape(bytes))?;
        stream.flush()?;
        Ok(())
    }

    fn receive_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Bytes> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let decoder = &mut self.decoder;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        receive_until(&mut self.buf, terminator, timeout, |buf, remaining| {
            stream.set_read_timeout(Some(remaining))?;
            let n = stream.read(&mut chunk)?;
            let replies = decoder.feed(&chunk[..n], buf);
            if !replies.is_empty() {
                stream.write_all(&replies)?;
            }
            Ok(n)
        })
    }

    /// Write `IAC BRK` straight to the socket, bypassing line framing and escaping.
    fn send_break(&mut self) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        match stream.write_all(&BREAK_SEQUENCE).and_then(|()| stream.flush()) {
            Ok(()) => {
                debug!(host = %self.host, port = self.port, "sent telnet break");
                true
            }
            Err(err) => {
                warn!(error = %err, "telnet break failed");
                false
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            self.buf.clear();
            self.decoder = TelnetDecoder::default();
            debug!(host = %self.host, port = self.port, "closed telnet connection");
        }
    }

    /// The bridge usually accepts a single client, so the old socket is shut
    /// down before the new one is opened.
    fn reconnect(&mut self) -> Result<()> {
        self.close();
        self.stream = Some(open_stream(&self.host, self.port, &self.config)?);
        info!(host = %self.host, port = self.port, "reconnected to telnet bridge");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for TelnetTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Double every `IAC` byte in outgoing data.
fn escape(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(data.len() + 2);
    for &byte in data {
        if byte == IAC {
            escaped.push(IAC);
        }
        escaped.push(byte);
    }
    escaped
}

/// Strips Telnet commands from the inbound byte stream.
///
/// Keeps incomplete command sequences across reads.
#[derive(Debug, Default)]
pub struct TelnetDecoder {
    pending: Vec<u8>,
}

impl TelnetDecoder {
    /// Decode `raw`, appending payload bytes to `out`.
    ///
    /// Returns the negotiation replies to send back: every `DO` is answered with
    /// `WONT` and every `WILL` with `DONT`.
    pub fn feed(&mut self, raw: &[u8], out: &mut BytesMut) -> Vec<u8> {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(raw);

        let mut replies = Vec::new();
        let mut i = 0;
        while i < data.len() {
            if data[i] != IAC {
                out.extend_from_slice(&data[i..=i]);
                i += 1;
                continue;
            }
            let Some(&command) = data.get(i + 1) else {
                break;
            };
            match command {
                IAC => {
                    out.extend_from_slice(&[IAC]);
                    i += 2;
                }
                DO | DONT | WILL | WONT => {
                    let Some(&option) = data.get(i + 2) else {
                        break;
                    };
                    match command {
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    i += 3;
                }
                SB => {
                    let end = data[i + 2..]
                        .windows(2)
                        .position(|w| w == [IAC, SE])
                        .map(|pos| i + 2 + pos + 2);
                    match end {
                        Some(end) => i = end,
                        None => break,
                    }
                }
                _ => i += 2,
            }
        }

        if i < data.len() {
            self.pending = data[i..].to_vec();
        }
        replies
    }
}
