//! Command dialect state machine.
//!
//! The analyzer parses either SCPI or its vendor short-command language and
//! needs an explicit switch command before it accepts the other one. The
//! switch is only sent on an actual change; some firmware loses framing on a
//! redundant switch.

use powerlog_line::LineSession;
use powerlog_transport::Transport;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Command language the instrument currently parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Scpi,
    Short,
}

/// Switch commands for one device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectCommands {
    pub to_short: &'static str,
    pub to_scpi: &'static str,
}

/// Per-connection dialect tracker. Starts in SCPI.
#[derive(Debug, Clone)]
pub struct DialectState {
    current: Dialect,
    commands: DialectCommands,
}

impl DialectState {
    pub fn new(commands: DialectCommands) -> Self {
        Self {
            current: Dialect::Scpi,
            commands,
        }
    }

    pub fn current(&self) -> Dialect {
        self.current
    }

    /// Forget the tracked dialect after a device reset.
    pub fn reset(&mut self) {
        self.current = Dialect::Scpi;
    }

    /// Switch to short commands unless already there.
    ///
    /// Returns whether a switch command was sent. The switch is fire-and-forget.
    pub fn goto_short<T: Transport>(&mut self, session: &mut LineSession<T>) -> Result<bool> {
        self.goto(Dialect::Short, session)
    }

    /// Switch to SCPI commands unless already there.
    pub fn goto_scpi<T: Transport>(&mut self, session: &mut LineSession<T>) -> Result<bool> {
        self.goto(Dialect::Scpi, session)
    }

    fn goto<T: Transport>(&mut self, target: Dialect, session: &mut LineSession<T>) -> Result<bool> {
        if self.current == target {
            return Ok(false);
        }
        let command = match target {
            Dialect::Short => self.commands.to_short,
            Dialect::Scpi => self.commands.to_scpi,
        };
        session.send(command)?;
        debug!(from = ?self.current, to = ?target, "switched command dialect");
        self.current = target;
        Ok(true)
    }
}
