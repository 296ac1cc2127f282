//! fleetmig dispatch - parallel remote script execution
//!
//! Provides:
//! - [`Transport`]: the copy/run seam, with [`SshTransport`] as the real one
//! - [`Script`]: `do-op` marked scripts rendered for live or preview runs
//! - [`Dispatcher`]: one task per target, exactly one [`CommandResult`] each
//! - [`Report`]: clean-first rendering and the final failure sentinel
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetmig_context::Context;
//! use fleetmig_dispatch::{Dispatcher, RemoteTarget, Report, Script, SshTransport};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), fleetmig_dispatch::DispatchError> {
//! let dispatcher = Dispatcher::new(Arc::new(SshTransport::new("/var/lib/juju/system-identity")));
//! let targets = vec![RemoteTarget::new("10.0.0.2").with_label("model").with_label("1")];
//! let job = Script::new("do-op touch /tmp/marker\n").job(&Context::preview());
//!
//! let results = dispatcher.dispatch(&targets, &job).await;
//! let report = Report::new(&results);
//! print!("{report}");
//! report.check()
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod dispatcher;
pub mod error;
pub mod report;
pub mod result;
pub mod script;
pub mod ssh;
pub mod target;
pub mod transport;

pub use dispatcher::{Dispatcher, DEFAULT_USER};
pub use error::{DispatchError, TransportError};
pub use report::{write_result, Report};
pub use result::{CommandResult, RunOutput};
pub use script::{RemoteJob, Script, Upload, DO_OP};
pub use ssh::{shell_quote, SshTransport};
pub use target::RemoteTarget;
pub use transport::Transport;
