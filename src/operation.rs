use core::cmp::Ordering;
use core::fmt;

use json_patch::Patch;
use serde_json::Value;
use thiserror::Error;

/// The four kinds of operation an operation log can hold.
///
/// The declaration order doubles as the tie-break rank when two operations
/// carry the same timestamp: a CREATE is folded before any UPDATE, and a
/// DELETE is folded last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// Seeds the document from the empty value.
    Create,
    /// Observational; leaves the document untouched.
    Read,
    /// Transforms the document through a JSON patch.
    Update,
    /// Makes the document absent for the rest of the fold window.
    Delete,
}

impl OperationKind {
    /// Stable uppercase name, as used in the textual rendering.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::Read => "READ",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised when a CREATE or UPDATE patch does not apply to the
/// document it was folded onto.
///
/// The fold recovers locally: the operation is skipped and the error is
/// routed to the per-fold [`FoldReport`](crate::FoldReport) instead of the
/// caller.
#[derive(Debug, Error)]
#[error("{kind} patch at timestamp {timestamp} did not apply: {source}")]
pub struct PatchApplyError {
    /// Kind of the operation whose patch failed.
    pub kind: OperationKind,
    /// Timestamp of the failing operation.
    pub timestamp: u64,
    /// The underlying patch engine error.
    #[source]
    pub source: json_patch::PatchError,
}

/// A single timestamped entry of the operation log.
///
/// Operations are immutable once constructed and compare by value: two
/// operations are equal exactly when their kind, timestamp, and patch
/// content all match. The `Ord` implementation is the total order every
/// replica folds in, so it must be identical everywhere:
///
/// 1. timestamp, ascending;
/// 2. kind (CREATE < READ < UPDATE < DELETE);
/// 3. the canonical text of the patch (empty for READ and DELETE).
///
/// # Example
///
/// ```
/// use crdt_oplog::Operation;
///
/// let patch = serde_json::from_value(serde_json::json!([
///     { "op": "add", "path": "", "value": { "n": 1 } }
/// ]))
/// .unwrap();
///
/// let create = Operation::create(10, patch);
/// assert_eq!(create.timestamp(), 10);
/// assert!(create.is_created());
/// ```
#[derive(Debug, Clone)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Operation {
    /// Seed the document from the empty value.
    Create {
        /// Caller-assigned monotonic timestamp.
        timestamp: u64,
        /// RFC 6902 patch producing the initial document.
        patch: Patch,
    },
    /// Observe the document without changing it.
    Read {
        /// Caller-assigned monotonic timestamp.
        timestamp: u64,
    },
    /// Transform the document.
    Update {
        /// Caller-assigned monotonic timestamp.
        timestamp: u64,
        /// RFC 6902 patch to apply to the current document.
        patch: Patch,
    },
    /// Make the document absent from this timestamp on.
    Delete {
        /// Caller-assigned monotonic timestamp.
        timestamp: u64,
    },
}

impl Operation {
    /// Build a CREATE operation.
    #[must_use]
    pub fn create(timestamp: u64, patch: Patch) -> Self {
        Operation::Create { timestamp, patch }
    }

    /// Build a READ operation.
    #[must_use]
    pub fn read(timestamp: u64) -> Self {
        Operation::Read { timestamp }
    }

    /// Build an UPDATE operation.
    #[must_use]
    pub fn update(timestamp: u64, patch: Patch) -> Self {
        Operation::Update { timestamp, patch }
    }

    /// Build a DELETE operation.
    #[must_use]
    pub fn delete(timestamp: u64) -> Self {
        Operation::Delete { timestamp }
    }

    /// The operation's timestamp.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        match self {
            Operation::Create { timestamp, .. }
            | Operation::Read { timestamp }
            | Operation::Update { timestamp, .. }
            | Operation::Delete { timestamp } => *timestamp,
        }
    }

    /// The operation's kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Read { .. } => OperationKind::Read,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
        }
    }

    /// True only for CREATE.
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Operation::Create { .. })
    }

    /// True only for DELETE.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, Operation::Delete { .. })
    }

    /// The patch payload, when the kind carries one.
    #[must_use]
    pub fn patch(&self) -> Option<&Patch> {
        match self {
            Operation::Create { patch, .. } | Operation::Update { patch, .. } => Some(patch),
            Operation::Read { .. } | Operation::Delete { .. } => None,
        }
    }

    /// One fold step.
    ///
    /// READ returns the document unchanged, DELETE returns the absent
    /// document. CREATE builds the initial document from the empty value,
    /// and UPDATE applies its patch to a present document; an UPDATE
    /// against an absent document is a no-op yielding the absent document.
    ///
    /// A patch that does not fit the document's shape is reported as a
    /// [`PatchApplyError`]; the input document is left untouched.
    pub fn process(&self, doc: Option<&Value>) -> Result<Option<Value>, PatchApplyError> {
        match self {
            Operation::Read { .. } => Ok(doc.cloned()),
            Operation::Delete { .. } => Ok(None),
            Operation::Create { timestamp, patch } => {
                let mut next = Value::Null;
                json_patch::patch(&mut next, &patch.0).map_err(|source| PatchApplyError {
                    kind: OperationKind::Create,
                    timestamp: *timestamp,
                    source,
                })?;
                Ok(Some(next))
            }
            Operation::Update { timestamp, patch } => match doc {
                Some(value) => {
                    let mut next = value.clone();
                    json_patch::patch(&mut next, &patch.0).map_err(|source| PatchApplyError {
                        kind: OperationKind::Update,
                        timestamp: *timestamp,
                        source,
                    })?;
                    Ok(Some(next))
                }
                None => Ok(None),
            },
        }
    }

    /// Canonical text of the patch payload, the final ordering tie-break.
    ///
    /// READ and DELETE contribute the empty string. Patch serialization
    /// goes through `serde_json` with sorted object keys, so equal patches
    /// always render identically on every replica.
    #[must_use]
    pub fn patch_text(&self) -> String {
        match self.patch() {
            Some(patch) => serde_json::to_string(patch).unwrap_or_default(),
            None => String::new(),
        }
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp() == other.timestamp()
            && self.kind() == other.kind()
            && self.patch() == other.patch()
    }
}

impl Eq for Operation {}

impl Ord for Operation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp()
            .cmp(&other.timestamp())
            .then(self.kind().cmp(&other.kind()))
            .then_with(|| self.patch_text().cmp(&other.patch_text()))
    }
}

impl PartialOrd for Operation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Operation {
    /// JSON-like rendering with stable field order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"type\":\"{}\",\"timestamp\":{}",
            self.kind(),
            self.timestamp()
        )?;
        if self.patch().is_some() {
            write!(f, ",\"patch\":{}", self.patch_text())?;
        }
        write!(f, "}}")
    }
}
