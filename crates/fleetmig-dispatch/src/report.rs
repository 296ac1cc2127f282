//! Operator-facing rendering of dispatch results
//!
//! Clean results are rendered first and problems last, so failures are what
//! the operator sees at the bottom of the terminal.

use crate::error::DispatchError;
use crate::result::CommandResult;
use std::fmt::{self, Write};

/// Clean/problem partition of a result set
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    results: &'a [CommandResult],
}

impl<'a> Report<'a> {
    /// Report over `results`
    #[must_use]
    pub fn new(results: &'a [CommandResult]) -> Self {
        Self { results }
    }

    /// Results with no transport error and a zero code
    pub fn clean(&self) -> impl Iterator<Item = &'a CommandResult> {
        self.results.iter().filter(|r| r.is_clean())
    }

    /// Results with a transport error or a non-zero code
    pub fn problems(&self) -> impl Iterator<Item = &'a CommandResult> {
        self.results.iter().filter(|r| r.is_problem())
    }

    /// Number of problem results
    #[must_use]
    pub fn problem_count(&self) -> usize {
        self.problems().count()
    }

    /// The sentinel error if any target had a problem
    ///
    /// # Errors
    /// `DispatchError::TargetsFailed` when the problem group is non-empty.
    pub fn check(&self) -> Result<(), DispatchError> {
        match self.problem_count() {
            0 => Ok(()),
            count => Err(DispatchError::TargetsFailed { count }),
        }
    }
}

fn write_block(out: &mut impl Write, heading: &str, text: &str) -> fmt::Result {
    let text = text.trim_end_matches('\n');
    if text.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {heading}:")?;
    for line in text.split('\n') {
        writeln!(out, "    {line}")?;
    }
    Ok(())
}

/// Render one result: label header, then error, code and output sections
///
/// # Errors
/// Only if the writer fails.
pub fn write_result(out: &mut impl Write, result: &CommandResult) -> fmt::Result {
    writeln!(out, "{}", result.target.label())?;
    if let Some(err) = &result.error {
        writeln!(out, "  ERROR: {err}")?;
    }
    if result.code != 0 {
        writeln!(out, "  Code: {}", result.code)?;
    }
    write_block(out, "stdout", &result.stdout)?;
    write_block(out, "stderr", &result.stderr)
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in self.clean().chain(self.problems()) {
            write_result(f, result)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::result::RunOutput;
    use crate::target::RemoteTarget;
    use pretty_assertions::assert_eq;

    fn target(machine: &str) -> RemoteTarget {
        RemoteTarget::new(format!("10.0.0.{machine}"))
            .with_label("model")
            .with_label(machine)
    }

    #[test]
    fn problems_render_last() {
        let results = vec![
            CommandResult::failed(target("1"), TransportError::unreachable("ubuntu@10.0.0.1", "timeout")),
            CommandResult::completed(target("2"), RunOutput::ok("line one\nline two\n")),
            CommandResult::completed(target("3"), RunOutput::exited(3, "oops")),
        ];
        let report = Report::new(&results);

        assert_eq!(
            report.to_string(),
            "model 2\n\
             \x20 stdout:\n\
             \x20   line one\n\
             \x20   line two\n\
             model 1\n\
             \x20 ERROR: cannot reach ubuntu@10.0.0.1: timeout\n\
             model 3\n\
             \x20 Code: 3\n\
             \x20 stderr:\n\
             \x20   oops\n"
        );
        assert_eq!(report.check(), Err(DispatchError::TargetsFailed { count: 2 }));
    }

    #[test]
    fn all_clean_checks_ok() {
        let results = vec![CommandResult::completed(target("0"), RunOutput::default())];
        let report = Report::new(&results);
        assert_eq!(report.to_string(), "model 0\n");
        assert_eq!(report.check(), Ok(()));
    }
}
