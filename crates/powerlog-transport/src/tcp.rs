use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::accumulate::{receive_until, READ_CHUNK_SIZE};
use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportConfig};

/// Success reply of the break side channel.
pub const BREAK_OK: &str = "0 ok";

const BREAK_REQUEST: &[u8] = b"break\n";

/// Raw TCP transport.
///
/// The instrument speaks its line protocol directly on the socket. Break is
/// requested on a separate short-lived connection to `port + 1`.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    host: String,
    port: u16,
    config: TransportConfig,
    buf: BytesMut,
}

impl TcpTransport {
    /// Connect to `host:port` (blocking).
    pub fn connect(host: &str, port: u16, config: TransportConfig) -> Result<Self> {
        let stream = open_stream(host, port, &config)?;
        info!(host, port, "connected to instrument");
        Ok(Self {
            stream: Some(stream),
            host: host.to_string(),
            port,
            config,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
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

    /// Active configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    fn receive_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Bytes> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        receive_until(&mut self.buf, terminator, timeout, |buf, remaining| {
            stream.set_read_timeout(Some(remaining))?;
            let n = stream.read(&mut chunk)?;
            buf.extend_from_slice(&chunk[..n]);
            Ok(n)
        })
    }

    fn send_break(&mut self) -> bool {
        if self.stream.is_none() {
            return false;
        }
        side_channel_break(&self.host, self.port, &self.config)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            self.buf.clear();
            debug!(host = %self.host, port = self.port, "closed instrument connection");
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        self.close();
        self.stream = Some(open_stream(&self.host, self.port, &self.config)?);
        info!(host = %self.host, port = self.port, "reconnected to instrument");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Request a break on the side channel at `port + 1`.
///
/// Opens its own connection, sends `break`, and waits for one line. Returns
/// `true` only when that line is exactly [`BREAK_OK`]; any other reply, a
/// timeout or a connection failure yields `false`.
pub fn side_channel_break(host: &str, port: u16, config: &TransportConfig) -> bool {
    let Some(break_port) = port.checked_add(1) else {
        warn!(port, "no side channel port above data port");
        return false;
    };

    match request_break(host, break_port, config) {
        Ok(reply) if reply == BREAK_OK => {
            debug!(host, port = break_port, "break acknowledged");
            true
        }
        Ok(reply) => {
            warn!(host, port = break_port, %reply, "break not acknowledged");
            false
        }
        Err(err) => {
            warn!(host, port = break_port, error = %err, "break request failed");
            false
        }
    }
}

fn request_break(host: &str, port: u16, config: &TransportConfig) -> Result<String> {
    let mut stream = open_stream(host, port, config)?;
    stream.write_all(BREAK_REQUEST)?;
    stream.flush()?;

    let mut buf = BytesMut::with_capacity(256);
    let mut chunk = [0u8; 256];
    let line = receive_until(&mut buf, b"\n", config.read_timeout, |buf, remaining| {
        stream.set_read_timeout(Some(remaining))?;
        let n = stream.read(&mut chunk)?;
        buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    });
    let _ = stream.shutdown(Shutdown::Both);

    Ok(String::from_utf8_lossy(&line?).into_owned())
}

pub(crate) fn open_stream(host: &str, port: u16, config: &TransportConfig) -> Result<TcpStream> {
    let addr = format!("{host}:{port}");
    let connect_err = |source| TransportError::Connect {
        addr: addr.clone(),
        source,
    };

    let mut last_err = None;
    for candidate in (host, port).to_socket_addrs().map_err(connect_err)? {
        match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(config.read_timeout))?;
                stream.set_write_timeout(config.write_timeout)?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(connect_err(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "host resolved to no addresses",
        )
    })))
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn short_config() -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_millis(200),
            write_timeout: Some(Duration::from_secs(1)),
        }
    }

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn send_and_receive_line() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "*idn?\n");
            let mut stream = stream;
            stream.write_all(b"ZES ZIMMER,LMG670,0,1.0\n").unwrap();
        });

        let mut transport = TcpTransport::connect("127.0.0.1", port, short_config()).unwrap();
        transport.send(b"*idn?\n").unwrap();
        let line = transport
            .receive_until(b"\n", Duration::from_secs(1))
            .unwrap();
        assert_eq!(line.as_ref(), b"ZES ZIMMER,LMG670,0,1.0");

        server.join().unwrap();
    }

    #[test]
    fn receive_times_out_on_silent_peer() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"230.1;").unwrap();
            thread::sleep(Duration::from_millis(300));
        });

        let mut transport = TcpTransport::connect("127.0.0.1", port, short_config()).unwrap();
        let err = transport
            .receive_until(b"\n", Duration::from_millis(100))
            .unwrap_err();
        assert!(err.is_timeout());

        server.join().unwrap();
    }

    #[test]
    fn connect_refused_is_connect_error() {
        let (listener, port) = listener();
        drop(listener);
        let err = TcpTransport::connect("127.0.0.1", port, short_config()).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn close_is_idempotent_and_blocks_io() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let _ = listener.accept().unwrap();
        });

        let mut transport = TcpTransport::connect("127.0.0.1", port, short_config()).unwrap();
        server.join().unwrap();
        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert!(matches!(
            transport.send(b"x\n"),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.receive_until(b"\n", Duration::from_millis(10)),
            Err(TransportError::NotConnected)
        ));
        assert!(!transport.send_break());
    }

    #[test]
    fn reconnect_opens_a_fresh_stream() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (first, _) = listener.accept().unwrap();
            drop(first);
            let (mut second, _) = listener.accept().unwrap();
            second.write_all(b"fresh\n").unwrap();
        });

        let mut transport = TcpTransport::connect("127.0.0.1", port, short_config()).unwrap();
        transport.reconnect().unwrap();
        assert!(transport.is_open());
        let line = transport
            .receive_until(b"\n", Duration::from_secs(1))
            .unwrap();
        assert_eq!(line.as_ref(), b"fresh");

        server.join().unwrap();
    }

    fn break_server(reply: &'static [u8]) -> (u16, thread::JoinHandle<()>) {
        // The side channel must sit on data port + 1, so probe for an adjacent free pair.
        for _ in 0..32 {
            let (data, port) = listener();
            let Some(side_port) = port.checked_add(1) else {
                continue;
            };
            let Ok(side) = TcpListener::bind(("127.0.0.1", side_port)) else {
                continue;
            };
            let handle = thread::spawn(move || {
                let _data = data;
                let (stream, _) = side.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                assert_eq!(line, "break\n");
                let mut stream = stream;
                stream.write_all(reply).unwrap();
                thread::sleep(Duration::from_millis(300));
            });
            return (port, handle);
        }
        panic!("no adjacent free port pair found");
    }

    #[test]
    fn side_channel_break_accepts_only_ok() {
        let (port, handle) = break_server(b"0 ok\n");
        assert!(side_channel_break("127.0.0.1", port, &short_config()));
        handle.join().unwrap();

        let (port, handle) = break_server(b"1 busy\n");
        assert!(!side_channel_break("127.0.0.1", port, &short_config()));
        handle.join().unwrap();
    }

    #[test]
    fn side_channel_break_timeout_is_false() {
        let (port, handle) = break_server(b"0 o");
        assert!(!side_channel_break("127.0.0.1", port, &short_config()));
        handle.join().unwrap();
    }

    #[test]
    fn side_channel_break_unreachable_is_false() {
        let (listener, port) = listener();
        drop(listener);
        assert!(!side_channel_break("127.0.0.1", port.wrapping_sub(1), &short_config()));
    }
}
