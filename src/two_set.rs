use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use crate::fold::{self, FoldReport};
use crate::operation::{Operation, OperationKind};
use crate::Crdt;

/// A two-set operation log.
///
/// One set holds operations proposed as effective (the add set), the other
/// holds tombstones (the remove set). An operation in the remove set is
/// never effective, no matter when or how often it lands in the add set.
/// The effective set is always computed on demand as the difference of the
/// two, iterated in the replica-wide total order of [`Operation`].
///
/// Both mutation paths are idempotent, and [`merge`](Crdt::merge) is a
/// plain set union on each side, so any two replicas that have exchanged
/// their sets hold the same log.
///
/// # Example
///
/// ```
/// use crdt_oplog::prelude::*;
///
/// let patch = serde_json::from_value(serde_json::json!([
///     { "op": "add", "path": "", "value": { "n": 1 } }
/// ]))
/// .unwrap();
///
/// let mut log = OperationTwoSet::new();
/// log.add(Operation::create(10, patch));
/// log.add(Operation::delete(30));
///
/// assert_eq!(log.count(OperationKind::Create), 1);
/// assert!(log.is_created());
/// assert!(log.is_deleted());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationTwoSet {
    add_set: BTreeSet<Operation>,
    rem_set: BTreeSet<Operation>,
}

impl OperationTwoSet {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose an operation as effective.
    ///
    /// Returns `true` if the add set changed. Adding the same operation
    /// again leaves the log untouched.
    pub fn add(&mut self, op: Operation) -> bool {
        self.add_set.insert(op)
    }

    /// Tombstone an operation.
    ///
    /// The operation does not need to be in the add set yet; with
    /// out-of-order delivery the tombstone may arrive first and simply
    /// waits for its counterpart. Returns `true` if the remove set changed.
    pub fn remove(&mut self, op: Operation) -> bool {
        self.rem_set.insert(op)
    }

    /// The operations that participate in a fold, in total order.
    pub fn effective(&self) -> impl Iterator<Item = &Operation> {
        self.add_set.difference(&self.rem_set)
    }

    /// Iterate the add set in total order.
    pub fn add_set(&self) -> impl Iterator<Item = &Operation> {
        self.add_set.iter()
    }

    /// Iterate the remove set in total order.
    pub fn rem_set(&self) -> impl Iterator<Item = &Operation> {
        self.rem_set.iter()
    }

    /// Number of operations in the add set.
    #[must_use]
    pub fn add_count(&self) -> usize {
        self.add_set.len()
    }

    /// Number of operations in the remove set.
    #[must_use]
    pub fn rem_count(&self) -> usize {
        self.rem_set.len()
    }

    /// Number of effective operations.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.effective().count()
    }

    /// Number of effective operations of the given kind.
    #[must_use]
    pub fn count(&self, kind: OperationKind) -> usize {
        self.effective().filter(|op| op.kind() == kind).count()
    }

    /// Empty both sets.
    pub fn clear(&mut self) {
        self.add_set.clear();
        self.rem_set.clear();
    }

    /// True when no operation is effective.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effective().next().is_none()
    }

    /// True when a CREATE is effective.
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.effective().any(Operation::is_created)
    }

    /// True when a DELETE is effective.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.effective().any(Operation::is_deleted)
    }

    /// Materialize the document from the full effective set.
    #[must_use]
    pub fn document(&self) -> Option<Value> {
        self.document_at(u64::MAX)
    }

    /// Materialize the document from effective operations with a timestamp
    /// at or below `ts_limit`.
    ///
    /// Patches that fail to apply are skipped; use
    /// [`document_at_reported`](Self::document_at_reported) to observe them.
    #[must_use]
    pub fn document_at(&self, ts_limit: u64) -> Option<Value> {
        fold::materialize(self.effective(), ts_limit).0
    }

    /// Like [`document_at`](Self::document_at), also returning the fold
    /// diagnostics.
    pub fn document_at_reported(&self, ts_limit: u64) -> (Option<Value>, FoldReport) {
        fold::materialize(self.effective(), ts_limit)
    }
}

impl Crdt for OperationTwoSet {
    fn merge(&mut self, other: &Self) {
        for op in &other.add_set {
            self.add_set.insert(op.clone());
        }
        for op in &other.rem_set {
            self.rem_set.insert(op.clone());
        }
    }
}

fn write_ops<'a>(
    f: &mut fmt::Formatter<'_>,
    ops: impl Iterator<Item = &'a Operation>,
) -> fmt::Result {
    f.write_str("[")?;
    for (i, op) in ops.enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{op}")?;
    }
    f.write_str("]")
}

impl fmt::Display for OperationTwoSet {
    /// JSON-like rendering with stable key order, each set in total order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{\"addSet\":")?;
        write_ops(f, self.add_set.iter())?;
        f.write_str(",\"remSet\":")?;
        write_ops(f, self.rem_set.iter())?;
        f.write_str(",\"opSet\":")?;
        write_ops(f, self.effective())?;
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use json_patch::Patch;
    use serde_json::json;

    fn patch(ops: Value) -> Patch {
        serde_json::from_value(ops).unwrap()
    }

    fn create(ts: u64) -> Operation {
        Operation::create(ts, patch(json!([{ "op": "add", "path": "", "value": { "n": 1 } }])))
    }

    fn update(ts: u64, n: u64) -> Operation {
        Operation::update(ts, patch(json!([{ "op": "replace", "path": "/n", "value": n }])))
    }

    #[test]
    fn new_log_is_empty() {
        let log = OperationTwoSet::new();
        assert!(log.is_empty());
        assert_eq!(log.op_count(), 0);
    }

    #[test]
    fn add_is_idempotent() {
        let mut log = OperationTwoSet::new();
        assert!(log.add(create(10)));
        assert!(!log.add(create(10)));
        assert_eq!(log.add_count(), 1);
        assert_eq!(log.count(OperationKind::Create), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut log = OperationTwoSet::new();
        assert!(log.remove(update(20, 2)));
        assert!(!log.remove(update(20, 2)));
        assert_eq!(log.rem_count(), 1);
    }

    #[test]
    fn remove_dominates_add_in_either_order() {
        let mut add_first = OperationTwoSet::new();
        add_first.add(update(20, 2));
        add_first.remove(update(20, 2));
        assert_eq!(add_first.op_count(), 0);

        let mut remove_first = OperationTwoSet::new();
        remove_first.remove(update(20, 2));
        remove_first.add(update(20, 2));
        assert_eq!(remove_first.op_count(), 0);
    }

    #[test]
    fn effective_iterates_in_total_order() {
        let mut log = OperationTwoSet::new();
        log.add(update(20, 2));
        log.add(create(10));
        log.add(Operation::delete(30));

        let timestamps: Vec<u64> = log.effective().map(Operation::timestamp).collect();
        assert_eq!(timestamps, vec![10, 20, 30]);
    }

    #[test]
    fn clear_empties_both_sets() {
        let mut log = OperationTwoSet::new();
        log.add(create(10));
        log.remove(update(20, 2));
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.add_count(), 0);
        assert_eq!(log.rem_count(), 0);
    }

    #[test]
    fn created_and_deleted_inspect_the_effective_set() {
        let mut log = OperationTwoSet::new();
        log.add(create(10));
        assert!(log.is_created());
        assert!(!log.is_deleted());

        log.add(Operation::delete(30));
        assert!(log.is_deleted());

        // Tombstoning the CREATE takes it out of the effective set.
        log.remove(create(10));
        assert!(!log.is_created());
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = OperationTwoSet::new();
        a.add(create(10));
        a.add(update(20, 2));
        a.remove(update(20, 2));

        let mut b = OperationTwoSet::new();
        b.add(update(25, 3));

        let mut left = a.clone();
        left.merge(&b);

        let mut right = b.clone();
        right.merge(&a);

        assert_eq!(left, right);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = OperationTwoSet::new();
        a.add(create(10));

        let mut b = OperationTwoSet::new();
        b.add(update(20, 2));

        a.merge(&b);
        let after_first = a.clone();
        a.merge(&b);

        assert_eq!(a, after_first);
    }

    #[test]
    fn merged_tombstone_still_dominates() {
        let mut a = OperationTwoSet::new();
        a.add(update(20, 2));

        let mut b = OperationTwoSet::new();
        b.remove(update(20, 2));

        a.merge(&b);
        assert_eq!(a.op_count(), 0);
    }

    #[test]
    fn display_has_stable_key_order() {
        let mut log = OperationTwoSet::new();
        log.add(Operation::read(5));
        log.remove(Operation::delete(9));

        let text = log.to_string();
        assert_eq!(
            text,
            "{\"addSet\":[{\"type\":\"READ\",\"timestamp\":5}],\
             \"remSet\":[{\"type\":\"DELETE\",\"timestamp\":9}],\
             \"opSet\":[{\"type\":\"READ\",\"timestamp\":5}]}"
        );
    }

    #[test]
    fn serde_round_trip() {
        let mut log = OperationTwoSet::new();
        log.add(create(10));
        log.remove(update(20, 2));

        let text = serde_json::to_string(&log).unwrap();
        let back: OperationTwoSet = serde_json::from_str(&text).unwrap();
        assert_eq!(log, back);
    }
}
