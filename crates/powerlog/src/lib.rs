//! Driver and logger for ZES Zimmer LMG power analyzers.
//!
//! powerlog talks to LMG670 and LMG95 analyzers over raw TCP or a Telnet
//! serial bridge, switches between the SCPI and short-command dialects, and
//! streams measurement frames.
//!
//! # Crate Structure
//!
//! - [`transport`]: raw TCP and Telnet links, out-of-band break
//! - [`line`]: terminator framing, queries and operation-complete commands
//! - [`driver`]: dialect tracking, device families and the [`driver::Instrument`] API

/// Re-export transport types.
pub mod transport {
    pub use powerlog_transport::*;
}

/// Re-export line framing types.
pub mod line {
    pub use powerlog_line::*;
}

/// Re-export driver types.
pub mod driver {
    pub use powerlog_driver::*;
}
