//! Instrument driver for ZES Zimmer LMG power analyzers.
//!
//! This is the device layer. It tracks which command dialect the analyzer
//! currently parses, sequences resets and range setup, arms a value
//! selection, and turns streamed lines into measurement frames.

pub mod connector;
pub mod dialect;
pub mod error;
pub mod family;
pub mod identity;
pub mod instrument;
pub mod measurement;
pub mod selection;
#[cfg(test)]
mod testing;

pub use connector::{connect, connect_with_config};
pub use dialect::{Dialect, DialectCommands, DialectState};
pub use error::{DriverError, Result};
pub use family::{DeviceFamily, RangePolicy};
pub use identity::Identity;
pub use instrument::{Instrument, InstrumentState};
pub use measurement::{is_no_data, parse_frame, reading, split_fields, Sentinel};
pub use selection::ValueSelection;
