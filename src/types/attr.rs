//! Per-packet and per-type replay attributes.

use std::str::FromStr;

use super::Timeval;

/// What the replay engine does with a packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Action {
    /// Send or expect the packet exactly as captured.
    #[default]
    Replay,
    /// Leave the packet out entirely.
    Skip,
    /// Let the emulated peer produce or consume the packet.
    Emulate,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replay" => Ok(Action::Replay),
            "skip" => Ok(Action::Skip),
            "emulate" => Ok(Action::Emulate),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Action::Replay => "replay",
            Action::Skip => "skip",
            Action::Emulate => "emulate",
        })
    }
}

/// Mutable attributes attached to a sequence node or a type override slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attr {
    /// Time since the first packet of the sequence.
    pub ts_rel: Timeval,
    /// Time since the previous packet; configuration may override it.
    pub ts_diff: Timeval,
    pub action: Action,
}
