//! Operation audit records and sinks
//!
//! Every operation the transaction runner handles is described by one
//! [`AuditRecord`], in apply order. Records are identical whether the
//! operation was applied or only previewed, so a dry-run log can be diffed
//! against a live one.

use fleetmig_store::{Change, Document, Operation, OperationKind, Precondition};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

/// Audit sink errors
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Writing the record failed
    #[error("writing audit record: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the record failed
    #[error("encoding audit record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fields an operation sets and unsets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFields {
    /// Fields set, or the full body of an insert
    pub set: Document,
    /// Fields removed
    pub unset: Vec<String>,
}

/// Structured description of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Target collection
    pub collection: String,
    /// Target id
    pub id: String,
    /// Insert, update or remove
    pub operation_kind: OperationKind,
    /// Asserted document state
    pub precondition: Precondition,
    /// Field changes
    pub fields: AuditFields,
}

impl From<&Operation> for AuditRecord {
    fn from(op: &Operation) -> Self {
        let fields = match &op.change {
            Change::Insert(doc) => AuditFields {
                set: doc.clone(),
                unset: Vec::new(),
            },
            Change::Update(update) => AuditFields {
                set: update.set.clone(),
                unset: update.unset.clone(),
            },
            Change::Remove => AuditFields::default(),
        };
        Self {
            collection: op.collection.clone(),
            id: op.id.clone(),
            operation_kind: op.kind(),
            precondition: op.precondition,
            fields,
        }
    }
}

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    /// Record one operation
    ///
    /// # Errors
    /// Fails if the record cannot be stored.
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Empty sink
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all records so far
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Remove and return all records
    pub fn take(&self) -> Vec<AuditRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Emits each record as a `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let fields = serde_json::to_string(&record.fields)?;
        info!(
            target: "fleetmig::audit",
            collection = %record.collection,
            id = %record.id,
            kind = %record.operation_kind,
            precondition = %record.precondition,
            fields = %fields,
            "operation"
        );
        Ok(())
    }
}

/// Writes one JSON object per line
#[derive(Debug)]
pub struct JsonLinesAuditSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesAuditSink<W> {
    /// Sink writing to `writer`
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> AuditSink for JsonLinesAuditSink<W> {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Forwards every record to several sinks in order
#[derive(Default, Clone)]
pub struct TeeAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl TeeAuditSink {
    /// Empty tee
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl std::fmt::Debug for TeeAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeeAuditSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditSink for TeeAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        for sink in &self.sinks {
            sink.record(record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmig_store::Update;
    use pretty_assertions::assert_eq;

    #[test]
    fn update_record_carries_set_and_unset() {
        let op = Operation::update(
            "units",
            "u1",
            Update::new().set("application", "db").unset("service"),
        );
        let record = AuditRecord::from(&op);

        assert_eq!(record.operation_kind, OperationKind::Update);
        assert_eq!(record.precondition, Precondition::MustExist);
        assert_eq!(record.fields.set, Document::new().with("application", "db"));
        assert_eq!(record.fields.unset, vec!["service".to_string()]);
    }

    #[test]
    fn insert_record_carries_body() {
        let body = Document::new().with("refcount", 2);
        let record = AuditRecord::from(&Operation::insert("refcounts", "m:c#x", body.clone()));
        assert_eq!(record.fields.set, body);
        assert!(record.fields.unset.is_empty());
    }

    #[test]
    fn json_lines_are_one_record_per_line() {
        let sink = JsonLinesAuditSink::new(Vec::new());
        sink.record(&AuditRecord::from(&Operation::remove("services", "m:db")))
            .unwrap();
        sink.record(&AuditRecord::from(&Operation::remove("services", "m:web")))
            .unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.id, "m:db");
        assert_eq!(first.operation_kind, OperationKind::Remove);

        let raw: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert!(raw.get("operationKind").is_some());
        assert!(raw.get("operation_kind").is_none());
    }

    #[test]
    fn tee_forwards_to_all() {
        let a = Arc::new(MemoryAuditSink::new());
        let b = Arc::new(MemoryAuditSink::new());
        let tee = TeeAuditSink::new().with(a.clone()).with(b.clone());

        tee.record(&AuditRecord::from(&Operation::remove("c", "1")))
            .unwrap();

        assert_eq!(a.records().len(), 1);
        assert_eq!(b.take().len(), 1);
        assert!(b.records().is_empty());
    }
}
