//! fleetmig context - per-invocation run settings
//!
//! Carries what library code would otherwise read from process-wide state:
//! - [`RunMode`]: live mutation or preview
//! - [`Verbosity`]: how much to log, and whether remote scripts trace
//! - [`AuditSink`]: where operation records go

#![warn(unreachable_pub)]

pub mod audit;
pub mod context;
pub mod mode;

pub use audit::{
    AuditError, AuditFields, AuditRecord, AuditSink, JsonLinesAuditSink, MemoryAuditSink,
    TeeAuditSink, TracingAuditSink,
};
pub use context::Context;
pub use mode::{RunMode, Verbosity};
