use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use powerlog_line::{LineConfig, Terminator, OPC_QUERY_LOWER, OPC_QUERY_UPPER};
use powerlog_transport::{LinkKind, TransportConfig};
use serde::Serialize;

use crate::dialect::DialectCommands;
use crate::selection::ValueSelection;

/// Quantities logged per channel on multi-channel analyzers.
const LMG670_QUANTITIES: [&str; 13] = [
    "tsnorm", "durnorm", "utrms", "itrms", "udc", "idc", "ucf", "icf", "uff", "iff", "p", "pf",
    "fcyc",
];

/// Channels logged by default on multi-channel analyzers.
const LMG670_LOGGED_CHANNELS: u8 = 6;

const LMG95_QUANTITIES: [&str; 14] = [
    "count", "sctc", "cycr", "utrms", "itrms", "udc", "idc", "ucf", "icf", "uff", "iff", "p",
    "pf", "freq",
];

/// How measurement ranges are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePolicy {
    /// Channels `1..=channels` each get auto-range off plus explicit ranges.
    PerChannel { channels: u8 },
    /// One channel; a missing value means auto-range for that quantity.
    Single,
}

/// Supported analyzer families. Each is a fixed protocol profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    /// LMG670: 1 to 7 channels, LAN, raw socket.
    Lmg670,
    /// LMG95: single channel, RS-232 behind a Telnet bridge.
    Lmg95,
}

impl DeviceFamily {
    pub fn name(self) -> &'static str {
        match self {
            DeviceFamily::Lmg670 => "lmg670",
            DeviceFamily::Lmg95 => "lmg95",
        }
    }

    pub fn link(self) -> LinkKind {
        match self {
            DeviceFamily::Lmg670 => LinkKind::Raw,
            DeviceFamily::Lmg95 => LinkKind::Telnet,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            DeviceFamily::Lmg670 => 5025,
            DeviceFamily::Lmg95 => 2001,
        }
    }

    pub fn terminator(self) -> Terminator {
        match self {
            DeviceFamily::Lmg670 => Terminator::Lf,
            DeviceFamily::Lmg95 => Terminator::CrLf,
        }
    }

    /// Read deadline; the serial bridge is slower.
    pub fn read_timeout(self) -> Duration {
        match self {
            DeviceFamily::Lmg670 => Duration::from_secs(2),
            DeviceFamily::Lmg95 => Duration::from_secs(5),
        }
    }

    pub fn opc_query(self) -> &'static str {
        match self {
            DeviceFamily::Lmg670 => OPC_QUERY_LOWER,
            DeviceFamily::Lmg95 => OPC_QUERY_UPPER,
        }
    }

    pub fn dialect_commands(self) -> DialectCommands {
        match self {
            DeviceFamily::Lmg670 => DialectCommands {
                to_short: "*zlang short",
                to_scpi: "*zlang scpi",
            },
            DeviceFamily::Lmg95 => DialectCommands {
                to_short: "syst:lang short",
                to_scpi: "lang scpi",
            },
        }
    }

    /// Commands issued, each confirmed, after the break during a reset.
    pub fn reset_commands(self) -> &'static [&'static str] {
        match self {
            DeviceFamily::Lmg670 => &["*rst;*cls"],
            DeviceFamily::Lmg95 => &["*cls", "*rst"],
        }
    }

    pub fn range_policy(self) -> RangePolicy {
        match self {
            DeviceFamily::Lmg670 => RangePolicy::PerChannel { channels: 7 },
            DeviceFamily::Lmg95 => RangePolicy::Single,
        }
    }

    pub fn line_config(self) -> LineConfig {
        LineConfig {
            terminator: self.terminator(),
            read_timeout: self.read_timeout(),
            opc_query: self.opc_query(),
        }
    }

    pub fn transport_config(self) -> TransportConfig {
        TransportConfig {
            read_timeout: self.read_timeout(),
            ..TransportConfig::default()
        }
    }

    /// The quantities the logger records when none are given.
    pub fn default_selection(self) -> ValueSelection {
        match self {
            DeviceFamily::Lmg670 => {
                ValueSelection::per_channel(&LMG670_QUANTITIES, 1..=LMG670_LOGGED_CHANNELS)
            }
            DeviceFamily::Lmg95 => ValueSelection::from_static(&LMG95_QUANTITIES),
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lmg670" | "670" => Ok(DeviceFamily::Lmg670),
            "lmg95" | "95" => Ok(DeviceFamily::Lmg95),
            other => Err(format!("unknown device family: {other}")),
        }
    }
}
