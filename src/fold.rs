//! The fold engine: deterministic materialization of a JSON document from
//! an ordered run of effective operations.
//!
//! The fold walks the operations in their replica-wide total order and
//! threads an `Option<Value>` document through them:
//!
//! - the first CREATE seeds the document; later CREATEs lose silently;
//! - an UPDATE transforms a present document and is dropped otherwise;
//! - a READ changes nothing;
//! - a DELETE seals the fold: the document is absent from that point on
//!   and every later operation in the window is ignored, whatever its
//!   timestamp. Re-creation needs a fresh replica identity.
//!
//! A patch that fails to apply never aborts the fold. The operation is
//! skipped and the failure is collected in a [`FoldReport`] for callers
//! that want to look.

use serde_json::Value;

use crate::operation::{Operation, PatchApplyError};

/// Per-fold diagnostics.
///
/// Collected fresh on every materialization; the engine never raises patch
/// failures to the caller by default.
#[derive(Debug, Default)]
pub struct FoldReport {
    /// Operations skipped because their patch did not apply.
    pub skipped: Vec<PatchApplyError>,
    /// Timestamp of the DELETE that sealed the fold, when one was reached.
    pub sealed_at: Option<u64>,
}

impl FoldReport {
    /// True when every considered patch applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Fold `ops` (already in total order) into a document, considering only
/// operations with a timestamp at or below `ts_limit`.
pub(crate) fn materialize<'a>(
    ops: impl Iterator<Item = &'a Operation>,
    ts_limit: u64,
) -> (Option<Value>, FoldReport) {
    let mut report = FoldReport::default();
    let mut doc: Option<Value> = None;

    for op in ops {
        if op.timestamp() > ts_limit {
            break;
        }
        if op.is_deleted() {
            report.sealed_at = Some(op.timestamp());
            return (None, report);
        }
        // Only the first CREATE seeds the document; an UPDATE before the
        // seed has nothing to transform.
        let applicable = match op {
            Operation::Create { .. } => doc.is_none(),
            Operation::Update { .. } => doc.is_some(),
            _ => false,
        };
        if !applicable {
            continue;
        }
        match op.process(doc.as_ref()) {
            Ok(next) => doc = next,
            Err(err) => report.skipped.push(err),
        }
    }

    (doc, report)
}
