use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::error::{LineError, Result};

/// Lower-case operation-complete query.
pub const OPC_QUERY_LOWER: &str = "*opc?";

/// Upper-case operation-complete query.
pub const OPC_QUERY_UPPER: &str = "*OPC?";

/// End-of-string sequence appended to commands and stripped from responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
}

impl Terminator {
    /// The terminator bytes on the wire.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Terminator::Lf => b"\n",
            Terminator::CrLf => b"\r\n",
        }
    }
}

/// Session framing configuration. Fixed per device family, never negotiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineConfig {
    /// Line terminator.
    pub terminator: Terminator,
    /// Deadline for receiving one response line.
    pub read_timeout: Duration,
    /// Query appended by [`LineSession::send_command`](crate::LineSession::send_command).
    pub opc_query: &'static str,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            terminator: Terminator::Lf,
            read_timeout: Duration::from_secs(2),
            opc_query: OPC_QUERY_LOWER,
        }
    }
}

/// Encode a command into its wire form.
///
/// Wire format:
/// ```text
/// ┌────────────────────────────┬──────────────────┐
/// │ Command (ASCII, no CR/LF)  │ Terminator       │
/// │ e.g. "actn;utrms?;p?"      │ "\n" or "\r\n"   │
/// └────────────────────────────┴──────────────────┘
/// ```
pub fn encode_line(command: &str, terminator: Terminator, dst: &mut BytesMut) -> Result<()> {
    if !command.is_ascii() || command.contains(['\r', '\n']) {
        return Err(LineError::InvalidCommand(command.to_string()));
    }
    let term = terminator.as_bytes();
    dst.reserve(command.len() + term.len());
    dst.put_slice(command.as_bytes());
    dst.put_slice(term);
    Ok(())
}
