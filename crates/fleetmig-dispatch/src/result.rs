//! Per-target results

use crate::error::TransportError;
use crate::target::RemoteTarget;

/// What a launched command produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Exit code
    pub code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl RunOutput {
    /// Successful run with `stdout`
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Run that exited with `code`
    #[must_use]
    pub fn exited(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Outcome of one job on one target; immutable once collected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Target the job ran against
    pub target: RemoteTarget,
    /// Exit code; zero when the transport failed
    pub code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Transport failure, distinct from a non-zero code
    pub error: Option<TransportError>,
}

impl CommandResult {
    /// Result of a command that ran
    #[must_use]
    pub fn completed(target: RemoteTarget, output: RunOutput) -> Self {
        Self {
            target,
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
            error: None,
        }
    }

    /// Result of a target that could not be run on
    #[must_use]
    pub fn failed(target: RemoteTarget, error: TransportError) -> Self {
        Self {
            target,
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error),
        }
    }

    /// Put `line` in front of the captured stdout
    #[must_use]
    pub fn with_stdout_prefix(mut self, line: &str) -> Self {
        if line.is_empty() {
            return self;
        }
        self.stdout = if self.stdout.is_empty() {
            line.to_string()
        } else {
            format!("{line}\n{}", self.stdout)
        };
        self
    }

    /// No transport error and a zero exit code
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.code == 0
    }

    /// Transport error or non-zero exit code
    #[inline]
    #[must_use]
    pub fn is_problem(&self) -> bool {
        !self.is_clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_code_is_a_problem_without_error() {
        let result = CommandResult::completed(RemoteTarget::new("a"), RunOutput::exited(2, "boom"));
        assert!(result.is_problem());
        assert!(result.error.is_none());
    }

    #[test]
    fn transport_failure_has_zero_code() {
        let result = CommandResult::failed(
            RemoteTarget::new("b"),
            TransportError::unreachable("ubuntu@b", "no route to host"),
        );
        assert!(result.is_problem());
        assert_eq!(result.code, 0);
    }

    #[test]
    fn stdout_prefix_joins_with_newline() {
        let result = CommandResult::completed(RemoteTarget::new("a"), RunOutput::ok("moved"))
            .with_stdout_prefix("scp a b");
        assert_eq!(result.stdout, "scp a b\nmoved");

        let result = CommandResult::completed(RemoteTarget::new("a"), RunOutput::default())
            .with_stdout_prefix("scp a b");
        assert_eq!(result.stdout, "scp a b");
    }
}
