//! Parallel fan-out of one job to many targets
//!
//! Every target gets its own task. Tasks send `(index, result)` to a single
//! collector over a channel; once every task has been joined the collector
//! fills a slot per target, so the result set always has one entry per
//! target, in target order. A task that ends without sending (it panicked)
//! leaves its slot to be filled with [`TransportError::Aborted`].

use crate::error::TransportError;
use crate::result::CommandResult;
use crate::script::RemoteJob;
use crate::target::RemoteTarget;
use crate::transport::Transport;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Default remote login user
pub const DEFAULT_USER: &str = "ubuntu";

/// Runs a job on every target concurrently
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    user: String,
}

impl Dispatcher {
    /// Dispatcher logging in as [`DEFAULT_USER`]
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            user: DEFAULT_USER.to_string(),
        }
    }

    /// Log in as `user`
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// `user@address` for a target
    #[must_use]
    pub fn user_host(&self, target: &RemoteTarget) -> String {
        format!("{}@{}", self.user, target.address)
    }

    /// Run `job` on every target and wait for all of them
    ///
    /// Returns exactly one result per target, in target order. Transport
    /// failures and non-zero exits are recorded in the results and never
    /// stop other targets.
    pub async fn dispatch(&self, targets: &[RemoteTarget], job: &RemoteJob) -> Vec<CommandResult> {
        let job = Arc::new(job.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, target)| {
                let tx = tx.clone();
                let transport = Arc::clone(&self.transport);
                let job = Arc::clone(&job);
                let user_host = self.user_host(&target);
                debug!(target = %target, "dispatching");
                tokio::spawn(async move {
                    let result = run_job(transport.as_ref(), &user_host, target, &job).await;
                    // The collector outlives every task.
                    let _ = tx.send((index, result));
                })
            })
            .collect();
        drop(tx);

        info!(targets = targets.len(), "waiting for remote jobs to finish");
        for joined in join_all(handles).await {
            if let Err(err) = joined {
                error!(error = %err, "dispatch task failed");
            }
        }

        let mut slots: Vec<Option<CommandResult>> = vec![None; targets.len()];
        while let Some((index, result)) = rx.recv().await {
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    CommandResult::failed(target.clone(), TransportError::Aborted(target.label()))
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

async fn run_job(
    transport: &dyn Transport,
    user_host: &str,
    target: RemoteTarget,
    job: &RemoteJob,
) -> CommandResult {
    let mut copy_line = String::new();
    if let Some(upload) = &job.upload {
        let remote_path = upload.remote_path();
        copy_line = format!("scp {} {user_host}:{remote_path}", upload.local.display());
        if let Err(err) = transport
            .copy_file(&upload.local, user_host, &remote_path)
            .await
        {
            return CommandResult::failed(target, err).with_stdout_prefix(&copy_line);
        }
    }

    match transport.run_script(user_host, &job.script).await {
        Ok(output) => CommandResult::completed(target, output).with_stdout_prefix(&copy_line),
        Err(err) => CommandResult::failed(target, err).with_stdout_prefix(&copy_line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::RunOutput;
    use async_trait::async_trait;
    use std::path::Path;

    /// Echoes the host back, panics for `panic`
    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        async fn copy_file(&self, _: &Path, _: &str, _: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn run_script(&self, user_host: &str, _: &str) -> Result<RunOutput, TransportError> {
            assert!(!user_host.ends_with("@panic"), "transport bug");
            Ok(RunOutput::ok(user_host))
        }
    }

    #[tokio::test]
    async fn results_follow_target_order() {
        let dispatcher = Dispatcher::new(Arc::new(Echo)).with_user("root");
        let targets: Vec<_> = (0..16).map(|i| RemoteTarget::new(format!("h{i}"))).collect();

        let results = dispatcher.dispatch(&targets, &RemoteJob::new("true")).await;

        assert_eq!(results.len(), 16);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.stdout, format!("root@h{i}"));
        }
    }

    #[tokio::test]
    async fn panicking_task_becomes_aborted_result() {
        let dispatcher = Dispatcher::new(Arc::new(Echo));
        let targets = vec![RemoteTarget::new("ok"), RemoteTarget::new("panic")];

        let results = dispatcher.dispatch(&targets, &RemoteJob::new("true")).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_clean());
        assert_eq!(
            results[1].error,
            Some(TransportError::Aborted("panic".into()))
        );
    }

    #[tokio::test]
    async fn no_targets_no_results() {
        let dispatcher = Dispatcher::new(Arc::new(Echo));
        assert!(dispatcher.dispatch(&[], &RemoteJob::new("true")).await.is_empty());
    }
}
