//! Error types for remote dispatch

use std::path::PathBuf;

/// A target could not be reached or the command could not be launched
///
/// Never used for a command that ran and exited non-zero; that is a
/// result code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection or authentication failed
    #[error("cannot reach {host}: {reason}")]
    Unreachable {
        /// `user@host` that was dialled
        host: String,
        /// Transport diagnostics
        reason: String,
    },

    /// The local transport program could not be started
    #[error("failed to launch {program}: {reason}")]
    Launch {
        /// Program name
        program: String,
        /// OS error text
        reason: String,
    },

    /// Copying a file to the target failed
    #[error("copying {} to {destination}: {reason}", local.display())]
    Copy {
        /// Local source path
        local: PathBuf,
        /// `user@host:path` destination
        destination: String,
        /// Transport diagnostics
        reason: String,
    },

    /// The task running this target ended without a result
    #[error("dispatch to {0} did not complete")]
    Aborted(String),
}

impl TransportError {
    /// Create an unreachable error
    #[inline]
    pub fn unreachable(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            host: host.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced to the caller after a dispatch completes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// At least one target reported a transport error or non-zero code
    #[error("one or more machines had a problem")]
    TargetsFailed {
        /// Number of problem targets
        count: usize,
    },
}
