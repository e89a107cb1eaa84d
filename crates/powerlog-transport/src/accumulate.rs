use std::io::ErrorKind;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// Size of a single socket read while accumulating a line.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Accumulate bytes until `terminator` appears, then return the line without it.
///
/// `read_chunk` is handed the accumulation buffer and the time left before the
/// deadline. It appends whatever payload it received and returns the number of
/// raw bytes read from the wire; `Ok(0)` means end of stream. Bytes following
/// the first terminator stay in `buf` for the next call.
///
/// When the deadline passes first, the unterminated bytes are dropped and
/// [`TransportError::Timeout`] is returned. A partial line is never handed out
/// as if it were complete.
pub fn receive_until<F>(
    buf: &mut BytesMut,
    terminator: &[u8],
    timeout: Duration,
    mut read_chunk: F,
) -> Result<Bytes>
where
    F: FnMut(&mut BytesMut, Duration) -> std::io::Result<usize>,
{
    debug_assert!(!terminator.is_empty());
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(line) = take_line(buf, terminator) {
            return Ok(line);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(expire(buf, timeout));
        }

        match read_chunk(buf, remaining) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => debug!(bytes = n, buffered = buf.len(), "received chunk"),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(expire(buf, timeout));
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

fn take_line(buf: &mut BytesMut, terminator: &[u8]) -> Option<Bytes> {
    let pos = buf
        .windows(terminator.len())
        .position(|window| window == terminator)?;
    let mut line = buf.split_to(pos + terminator.len());
    line.truncate(pos);
    Some(line.freeze())
}

fn expire(buf: &mut BytesMut, timeout: Duration) -> TransportError {
    let discarded = buf.len();
    if discarded > 0 {
        warn!(discarded, "dropping unterminated partial line after timeout");
    }
    buf.clear();
    TransportError::Timeout { timeout, discarded }
}
