//! Explicit run context threaded through the engine and the dispatcher

use crate::audit::{AuditSink, TracingAuditSink};
use crate::mode::{RunMode, Verbosity};
use std::fmt;
use std::sync::Arc;

/// Run mode, verbosity and audit sink for one command invocation
#[derive(Clone)]
pub struct Context {
    mode: RunMode,
    verbosity: Verbosity,
    audit: Arc<dyn AuditSink>,
}

impl Context {
    /// Context with normal verbosity that audits through `tracing`
    #[must_use]
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            verbosity: Verbosity::Normal,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Preview context
    #[inline]
    #[must_use]
    pub fn preview() -> Self {
        Self::new(RunMode::Preview)
    }

    /// Live context
    #[inline]
    #[must_use]
    pub fn live() -> Self {
        Self::new(RunMode::Live)
    }

    /// Set verbosity
    #[inline]
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set audit sink
    #[inline]
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Run mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Whether mutations are carried out
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.mode.is_live()
    }

    /// Verbosity
    #[inline]
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Audit sink
    #[inline]
    #[must_use]
    pub fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::preview()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("mode", &self.mode)
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditRecord, MemoryAuditSink};
    use fleetmig_store::Operation;

    #[test]
    fn builders() {
        let sink = Arc::new(MemoryAuditSink::new());
        let ctx = Context::live()
            .with_verbosity(Verbosity::Debug)
            .with_audit(sink.clone());

        assert!(ctx.is_live());
        assert_eq!(ctx.verbosity(), Verbosity::Debug);

        ctx.audit()
            .record(&AuditRecord::from(&Operation::remove("c", "1")))
            .unwrap();
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn default_is_preview() {
        assert_eq!(Context::default().mode(), RunMode::Preview);
    }
}
