//! Remote transport seam

use crate::error::TransportError;
use crate::result::RunOutput;
use async_trait::async_trait;
use std::path::Path;

/// Copies files to and runs scripts on remote hosts
///
/// Implementations must be safe to call concurrently for different hosts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Copy `local` to `remote_path` on `user_host`
    ///
    /// # Errors
    /// `TransportError` if the copy did not complete.
    async fn copy_file(
        &self,
        local: &Path,
        user_host: &str,
        remote_path: &str,
    ) -> Result<(), TransportError>;

    /// Run `script` as root on `user_host`
    ///
    /// A non-zero exit is reported in [`RunOutput::code`], not as an error.
    ///
    /// # Errors
    /// `TransportError` only if the host could not be reached or the
    /// command could not be launched.
    async fn run_script(&self, user_host: &str, script: &str) -> Result<RunOutput, TransportError>;
}
