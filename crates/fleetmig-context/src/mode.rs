//! Run mode and verbosity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether mutations are carried out or only described
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Describe every mutation, perform none
    #[default]
    Preview,
    /// Perform mutations
    Live,
}

impl RunMode {
    /// Mode selected by a `--live` style flag
    #[inline]
    #[must_use]
    pub fn from_live_flag(live: bool) -> Self {
        if live {
            Self::Live
        } else {
            Self::Preview
        }
    }

    /// Whether mutations are carried out
    #[inline]
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Preview => f.write_str("dry-run"),
            RunMode::Live => f.write_str("LIVE"),
        }
    }
}

/// How much detail to log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    /// Progress only
    #[default]
    Normal,
    /// Skipped documents, rendered scripts, shell tracing on remote hosts
    Debug,
    /// Everything
    Trace,
}

impl Verbosity {
    /// Verbosity from the number of `-v` flags
    #[must_use]
    pub fn from_occurrences(count: u8) -> Self {
        match count {
            0 => Self::Normal,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Whether debug output is enabled
    #[inline]
    #[must_use]
    pub fn is_debug(self) -> bool {
        self >= Self::Debug
    }

    /// Default `tracing` filter directive for this verbosity
    #[must_use]
    pub fn default_directive(self) -> &'static str {
        match self {
            Self::Normal => "info",
            Self::Debug => "info,fleetmig=debug",
            Self::Trace => "debug,fleetmig=trace",
        }
    }
}
