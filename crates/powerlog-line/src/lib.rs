//! Line framing for instrument command sessions.
//!
//! Every command goes out as ASCII text followed by a fixed terminator and
//! every response comes back as one terminated line:
//! - `\n` for LAN analyzers
//! - `\r\n` for analyzers behind an RS-232 bridge
//!
//! The protocol has no request identifiers, so a session allows one
//! outstanding query at a time.

pub mod codec;
pub mod error;
pub mod session;

pub use codec::{encode_line, LineConfig, Terminator, OPC_QUERY_LOWER, OPC_QUERY_UPPER};
pub use error::{LineError, Result};
pub use session::{Completion, LineSession, Reply};
