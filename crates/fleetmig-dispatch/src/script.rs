//! Remote script construction
//!
//! The dispatcher has no dry-run of its own. Dry runs are expressed in the
//! script: body lines that mutate the host start with the [`DO_OP`] marker,
//! which a live render strips and a preview render turns into an `echo`. A
//! preview job also never uploads; it echoes the copy it would have made.

use crate::ssh::shell_quote;
use fleetmig_context::{Context, RunMode};
use std::path::PathBuf;

/// Marker in front of every mutating command
pub const DO_OP: &str = "do-op ";

const PREVIEW_PREFIX: &str = "echo '  run: '";

/// A file copied to the remote user's home directory before the script runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Local file
    pub local: PathBuf,
    /// File name under the remote home directory
    pub remote_name: String,
}

impl Upload {
    /// Upload `local` as `~/<remote_name>`
    #[must_use]
    pub fn new(local: impl Into<PathBuf>, remote_name: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote_name: remote_name.into(),
        }
    }

    /// Upload `local` under its own file name
    #[must_use]
    pub fn keep_name(local: impl Into<PathBuf>) -> Self {
        let local = local.into();
        let remote_name = local
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        Self { local, remote_name }
    }

    /// Destination path relative to the remote home directory
    #[must_use]
    pub fn remote_path(&self) -> String {
        format!("~/{}", self.remote_name)
    }
}

/// What the dispatcher runs on every target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    /// Full script text
    pub script: String,
    /// File to copy first, if any
    pub upload: Option<Upload>,
}

impl RemoteJob {
    /// Job that only runs `script`
    #[must_use]
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            upload: None,
        }
    }
}

/// Script body with `do-op` markers, rendered per run mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    body: String,
}

impl Script {
    /// Script from a body
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// Shell options line; traces commands at debug verbosity
    #[must_use]
    pub fn preamble(context: &Context) -> &'static str {
        if context.verbosity().is_debug() {
            "set -xeu\n"
        } else {
            "set -eu\n"
        }
    }

    /// Body with markers stripped (live) or turned into echoes (preview)
    #[must_use]
    pub fn body(&self, mode: RunMode) -> String {
        match mode {
            RunMode::Live => self.body.replace(DO_OP, ""),
            RunMode::Preview => self.body.replace(DO_OP, PREVIEW_PREFIX),
        }
    }

    /// Full script text for `context`
    #[must_use]
    pub fn render(&self, context: &Context) -> String {
        format!("{}{}", Self::preamble(context), self.body(context.mode()))
    }

    /// Job running this script
    #[must_use]
    pub fn job(&self, context: &Context) -> RemoteJob {
        RemoteJob::new(self.render(context))
    }

    /// Job copying `upload` first; a preview job echoes the copy instead
    #[must_use]
    pub fn job_with_upload(&self, context: &Context, upload: Upload) -> RemoteJob {
        match context.mode() {
            RunMode::Live => RemoteJob {
                script: self.render(context),
                upload: Some(upload),
            },
            RunMode::Preview => {
                let copy = format!("scp {} {}", upload.local.display(), upload.remote_path());
                RemoteJob::new(format!(
                    "{}echo {}\n{}",
                    Self::preamble(context),
                    shell_quote(&copy),
                    self.body(RunMode::Preview)
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmig_context::Verbosity;
    use pretty_assertions::assert_eq;

    const BODY: &str = "echo start\ndo-op mkdir -p /var/lib/juju/tools\n";

    #[test]
    fn live_strips_markers() {
        let script = Script::new(BODY).render(&Context::live());
        assert_eq!(script, "set -eu\necho start\nmkdir -p /var/lib/juju/tools\n");
    }

    #[test]
    fn preview_echoes_markers() {
        let script = Script::new(BODY).render(&Context::preview());
        assert_eq!(
            script,
            "set -eu\necho start\necho '  run: 'mkdir -p /var/lib/juju/tools\n"
        );
        assert!(!script.contains(DO_OP));
    }

    #[test]
    fn debug_traces() {
        let context = Context::live().with_verbosity(Verbosity::Debug);
        assert!(Script::new(BODY).render(&context).starts_with("set -xeu\n"));
    }

    #[test]
    fn preview_job_never_uploads() {
        let upload = Upload::new("/tmp/juju.tgz", "juju-2.0.0-xenial-amd64.tgz");
        let script = Script::new(BODY);

        let live = script.job_with_upload(&Context::live(), upload.clone());
        assert_eq!(live.upload, Some(upload.clone()));

        let preview = script.job_with_upload(&Context::preview(), upload);
        assert_eq!(preview.upload, None);
        assert!(preview
            .script
            .starts_with("set -eu\necho 'scp /tmp/juju.tgz ~/juju-2.0.0-xenial-amd64.tgz'\n"));
    }

    #[test]
    fn upload_keeps_file_name() {
        let upload = Upload::keep_name("/usr/local/bin/fleetmig");
        assert_eq!(upload.remote_name, "fleetmig");
        assert_eq!(upload.remote_path(), "~/fleetmig");
    }
}
