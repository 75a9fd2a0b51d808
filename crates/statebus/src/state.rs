//! Host run-state enum and its wire encoding.

use std::fmt;
use std::str::FromStr;

/// Run state of the host process, stored as a single enum byte.
///
/// Two instances live in the segment: the *current* state (written by the
/// host) and the *requested* state (written by an external process). The
/// host polls the requested byte and, when it decides to honor a request,
/// writes the current byte to match. No transition table is enforced at
/// this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostState {
    NotRunning = 0,
    Running = 1,
    Paused = 2,
    Switching = 3,
    Stopped = 4,
}

impl HostState {
    /// All states, in wire order.
    pub const ALL: [HostState; 5] = [
        HostState::NotRunning,
        HostState::Running,
        HostState::Paused,
        HostState::Switching,
        HostState::Stopped,
    ];

    /// The enum byte written to the segment.
    #[inline]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    /// Decode a stored byte. `None` for bytes outside the known range.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(HostState::NotRunning),
            1 => Some(HostState::Running),
            2 => Some(HostState::Paused),
            3 => Some(HostState::Switching),
            4 => Some(HostState::Stopped),
            _ => None,
        }
    }

    /// Wire name of the state.
    pub const fn name(self) -> &'static str {
        match self {
            HostState::NotRunning => "not_running",
            HostState::Running => "running",
            HostState::Paused => "paused",
            HostState::Switching => "switching",
            HostState::Stopped => "stopped",
        }
    }

    /// Look a state up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.name() == name)
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A state name that matched none of the known states.
#[derive(Debug, thiserror::Error)]
#[error("unknown host state name: {0:?}")]
pub struct UnknownStateName(pub String);

impl FromStr for HostState {
    type Err = UnknownStateName;

    /// Strict counterpart of the name-keyed accessor surface: an unknown
    /// name is an error instead of a silent no-op.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownStateName(s.to_owned()))
    }
}
