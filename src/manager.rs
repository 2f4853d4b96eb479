use std::borrow::Cow;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::fold::FoldReport;
use crate::operation::{Operation, OperationKind, PatchApplyError};
use crate::two_set::OperationTwoSet;
use crate::Crdt;

/// Opaque token naming the native value shape a manager reconstitutes
/// from JSON.
///
/// Two managers over the same Rust type but different schema identities
/// are never equal; the identity is what travels when replicas compare
/// state, not the type itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct SchemaId(Cow<'static, str>);

impl SchemaId {
    /// Name a schema explicitly.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Derive the schema identity from the Rust type name.
    #[must_use]
    pub fn of<T>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    /// The schema name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-manager behavior switches.
///
/// Both default to off, matching the engine's recover-locally posture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Log mapper failures in [`CrdtManager::value_at`] at warn level
    /// instead of dropping them silently.
    pub log_mapper_errors: bool,
    /// Make the fallible accessors ([`CrdtManager::try_document_at`])
    /// surface fold patch failures instead of absorbing them.
    pub strict: bool,
}

/// Conversion between the JSON document and the native value failed.
#[derive(Debug, Error)]
pub enum MapperError {
    /// The native value did not serialize to a JSON tree.
    #[error("value of `{schema}` did not serialize to a JSON tree: {source}")]
    ToTree {
        /// Schema whose value failed to serialize.
        schema: SchemaId,
        /// The underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
    /// The JSON document did not match the schema.
    #[error("document did not match `{schema}`: {source}")]
    FromTree {
        /// Schema the document was checked against.
        schema: SchemaId,
        /// The underlying deserializer error.
        #[source]
        source: serde_json::Error,
    },
}

/// A default value was requested but the schema registered no constructor.
#[derive(Debug, Error)]
#[error("schema `{schema}` has no default constructor registered")]
pub struct ConstructionError {
    /// Schema that lacks a constructor.
    pub schema: SchemaId,
}

/// Typed façade binding one operation log to a native value shape `T`.
///
/// The manager owns its log exclusively. Mutation happens by appending
/// (or retracting) operations built with the factory methods; reads
/// materialize the JSON document through the fold and convert it back to
/// `T`. The caller supplies every timestamp; the manager never invents
/// one.
///
/// # Example
///
/// ```
/// use crdt_oplog::prelude::*;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
/// struct Counter {
///     n: u32,
/// }
///
/// let mut replica = CrdtManager::<Counter>::new();
/// let create = replica.make_create_with(10, &Counter { n: 1 }).unwrap();
/// replica.append(create);
///
/// let update = replica.make_update(20, &Counter { n: 2 }).unwrap();
/// replica.append(update);
///
/// assert_eq!(replica.value(), Some(Counter { n: 2 }));
/// assert_eq!(replica.value_at(15), Some(Counter { n: 1 }));
/// ```
pub struct CrdtManager<T> {
    store: OperationTwoSet,
    schema: SchemaId,
    make_default: Option<fn() -> T>,
    options: ManagerOptions,
}

impl<T> CrdtManager<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create an empty manager whose schema identity is the Rust type name.
    #[must_use]
    pub fn new() -> Self {
        Self::with_schema(SchemaId::of::<T>())
    }

    /// Create an empty manager with an explicit schema identity.
    #[must_use]
    pub fn with_schema(schema: SchemaId) -> Self {
        Self {
            store: OperationTwoSet::new(),
            schema,
            make_default: None,
            options: ManagerOptions::default(),
        }
    }

    /// Register the constructor used by [`make_create`](Self::make_create).
    #[must_use]
    pub fn with_default(mut self, make_default: fn() -> T) -> Self {
        self.make_default = Some(make_default);
        self
    }

    /// Set the behavior switches.
    #[must_use]
    pub fn with_options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    /// The schema identity.
    #[must_use]
    pub fn schema(&self) -> &SchemaId {
        &self.schema
    }

    /// The behavior switches.
    #[must_use]
    pub fn options(&self) -> ManagerOptions {
        self.options
    }

    /// The underlying operation log.
    #[must_use]
    pub fn store(&self) -> &OperationTwoSet {
        &self.store
    }

    /// Append an operation to the log. Returns whether the log changed.
    pub fn append(&mut self, op: Operation) -> bool {
        self.store.add(op)
    }

    /// Tombstone an operation. Returns whether the log changed.
    pub fn retract(&mut self, op: Operation) -> bool {
        self.store.remove(op)
    }

    /// Empty the log.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Number of effective operations of the given kind.
    #[must_use]
    pub fn count(&self, kind: OperationKind) -> usize {
        self.store.count(kind)
    }

    /// True when no operation is effective.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// True when a CREATE is effective.
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.store.is_created()
    }

    /// True when a DELETE is effective.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.store.is_deleted()
    }

    /// The materialized JSON document.
    #[must_use]
    pub fn document(&self) -> Option<Value> {
        self.store.document()
    }

    /// The materialized JSON document as of `ts_limit`.
    #[must_use]
    pub fn document_at(&self, ts_limit: u64) -> Option<Value> {
        self.store.document_at(ts_limit)
    }

    /// The document as of `ts_limit`, with fold failures surfaced when the
    /// manager is strict.
    ///
    /// With `strict` off this is [`document_at`](Self::document_at) in
    /// `Result` clothing and never fails.
    pub fn try_document_at(&self, ts_limit: u64) -> Result<Option<Value>, PatchApplyError> {
        let (doc, report) = self.store.document_at_reported(ts_limit);
        if self.options.strict {
            if let Some(err) = report.skipped.into_iter().next() {
                return Err(err);
            }
        }
        Ok(doc)
    }

    /// The document as of `ts_limit` plus the fold diagnostics.
    pub fn document_at_reported(&self, ts_limit: u64) -> (Option<Value>, FoldReport) {
        self.store.document_at_reported(ts_limit)
    }

    /// The current native value.
    ///
    /// Absent when the document is absent, and also when the document no
    /// longer matches the schema; the raw JSON stays reachable through
    /// [`document`](Self::document).
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.value_at(u64::MAX)
    }

    /// The native value as of `ts_limit`.
    #[must_use]
    pub fn value_at(&self, ts_limit: u64) -> Option<T> {
        let doc = self.document_at(ts_limit)?;
        match serde_json::from_value(doc) {
            Ok(value) => Some(value),
            Err(err) => {
                if self.options.log_mapper_errors {
                    tracing::warn!(
                        schema = %self.schema,
                        error = %err,
                        "document no longer matches the schema; yielding no value"
                    );
                }
                None
            }
        }
    }

    /// The native value as of `ts_limit`, surfacing mapper failures.
    pub fn try_value_at(&self, ts_limit: u64) -> Result<Option<T>, MapperError> {
        match self.document_at(ts_limit) {
            None => Ok(None),
            Some(doc) => serde_json::from_value(doc).map(Some).map_err(|source| {
                MapperError::FromTree {
                    schema: self.schema.clone(),
                    source,
                }
            }),
        }
    }

    /// Build a CREATE seeding the document with the registered default
    /// value.
    pub fn make_create(&self, timestamp: u64) -> Result<Operation, ConstructionError> {
        let make_default = self.make_default.ok_or_else(|| ConstructionError {
            schema: self.schema.clone(),
        })?;
        let value = make_default();
        let tree = serde_json::to_value(&value).unwrap_or(Value::Null);
        Ok(Operation::create(timestamp, seed_patch(&tree)))
    }

    /// Build a CREATE seeding the document from `value`.
    pub fn make_create_with(&self, timestamp: u64, value: &T) -> Result<Operation, MapperError> {
        let tree = self.to_tree(value)?;
        Ok(Operation::create(timestamp, seed_patch(&tree)))
    }

    /// Build a READ.
    #[must_use]
    pub fn make_read(&self, timestamp: u64) -> Operation {
        Operation::read(timestamp)
    }

    /// Build an UPDATE whose patch is the diff between the current
    /// document and `value`.
    pub fn make_update(&self, timestamp: u64, value: &T) -> Result<Operation, MapperError> {
        let after = self.to_tree(value)?;
        let before = self.document().unwrap_or(Value::Null);
        Ok(Operation::update(timestamp, json_patch::diff(&before, &after)))
    }

    /// Build a DELETE.
    #[must_use]
    pub fn make_delete(&self, timestamp: u64) -> Operation {
        Operation::delete(timestamp)
    }

    fn to_tree(&self, value: &T) -> Result<Value, MapperError> {
        serde_json::to_value(value).map_err(|source| MapperError::ToTree {
            schema: self.schema.clone(),
            source,
        })
    }
}

/// Patch seeding a document from the empty value.
fn seed_patch(tree: &Value) -> json_patch::Patch {
    json_patch::diff(&Value::Null, tree)
}

impl<T> Default for CrdtManager<T>
where
    T: Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CrdtManager<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            schema: self.schema.clone(),
            make_default: self.make_default,
            options: self.options,
        }
    }
}

impl<T> fmt::Debug for CrdtManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrdtManager")
            .field("schema", &self.schema)
            .field("options", &self.options)
            .field("store", &self.store)
            .finish()
    }
}

/// Managers are equal when their logs and schema identities are equal.
impl<T> PartialEq for CrdtManager<T> {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.store == other.store
    }
}

impl<T> Eq for CrdtManager<T> {}

impl<T> Crdt for CrdtManager<T> {
    fn merge(&mut self, other: &Self) {
        self.store.merge(&other.store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Task {
        title: String,
        done: bool,
    }

    fn task(title: &str, done: bool) -> Task {
        Task {
            title: title.into(),
            done,
        }
    }

    #[test]
    fn create_then_read_back() {
        let mut replica = CrdtManager::<Task>::new();
        let create = replica.make_create_with(10, &task("write", false)).unwrap();
        replica.append(create);

        assert_eq!(replica.value(), Some(task("write", false)));
        assert!(replica.is_created());
        assert_eq!(replica.count(OperationKind::Create), 1);
    }

    #[test]
    fn update_diffs_against_current_document() {
        let mut replica = CrdtManager::<Task>::new();
        let create = replica.make_create_with(10, &task("write", false)).unwrap();
        replica.append(create);

        let update = replica.make_update(20, &task("write", true)).unwrap();
        replica.append(update);

        assert_eq!(replica.value(), Some(task("write", true)));
        assert_eq!(replica.value_at(15), Some(task("write", false)));
    }

    #[test]
    fn delete_hides_the_value() {
        let mut replica = CrdtManager::<Task>::new();
        let create = replica.make_create_with(10, &task("write", false)).unwrap();
        replica.append(create);
        replica.append(replica.make_delete(30));

        assert_eq!(replica.value(), None);
        assert!(replica.is_deleted());
        assert_eq!(replica.document(), None);
    }

    #[test]
    fn default_create_requires_a_constructor() {
        let bare = CrdtManager::<Task>::new();
        let err = bare.make_create(10).unwrap_err();
        assert_eq!(err.schema, *bare.schema());

        let mut replica = CrdtManager::<Task>::new().with_default(Task::default);
        let create = replica.make_create(10).unwrap();
        replica.append(create);
        assert_eq!(replica.value(), Some(Task::default()));
    }

    #[test]
    fn mapper_mismatch_soft_fails_but_keeps_the_document() {
        let mut replica = CrdtManager::<Task>::new();
        replica.append(Operation::create(
            10,
            serde_json::from_value(json!([
                { "op": "add", "path": "", "value": { "unexpected": true } }
            ]))
            .unwrap(),
        ));

        assert_eq!(replica.value(), None);
        assert_eq!(replica.document(), Some(json!({ "unexpected": true })));
        assert!(matches!(
            replica.try_value_at(u64::MAX),
            Err(MapperError::FromTree { .. })
        ));
    }

    #[test]
    fn strict_manager_surfaces_fold_failures() {
        let bad_update = Operation::update(
            20,
            serde_json::from_value(json!([
                { "op": "replace", "path": "/missing", "value": 1 }
            ]))
            .unwrap(),
        );

        let mut lenient = CrdtManager::<Task>::new();
        let create = lenient.make_create_with(10, &task("write", false)).unwrap();
        lenient.append(create);
        lenient.append(bad_update.clone());
        assert!(lenient.try_document_at(u64::MAX).is_ok());

        let mut strict = lenient
            .clone()
            .with_options(ManagerOptions {
                strict: true,
                ..ManagerOptions::default()
            });
        strict.append(bad_update);
        assert!(strict.try_document_at(u64::MAX).is_err());
        // The plain accessor keeps the recover-locally posture.
        assert_eq!(strict.value(), Some(task("write", false)));
    }

    #[test]
    fn equality_needs_matching_schema_and_store() {
        let mut a = CrdtManager::<Task>::new();
        let create = a.make_create_with(10, &task("write", false)).unwrap();
        a.append(create.clone());

        let mut b = CrdtManager::<Task>::new();
        b.append(create.clone());
        assert_eq!(a, b);

        let mut c = CrdtManager::<Task>::with_schema(SchemaId::new("task/v2"));
        c.append(create);
        assert_ne!(a, c);
    }

    #[test]
    fn merge_goes_through_the_store() {
        let mut a = CrdtManager::<Task>::new();
        let create = a.make_create_with(10, &task("write", false)).unwrap();
        a.append(create);

        let mut b = a.clone();
        let update = a.make_update(20, &task("write", true)).unwrap();
        a.append(update);

        b.merge(&a);
        assert_eq!(b.value(), Some(task("write", true)));
    }

    #[test]
    fn retract_excludes_an_appended_operation() {
        let mut replica = CrdtManager::<Task>::new();
        let create = replica.make_create_with(10, &task("write", false)).unwrap();
        replica.append(create);

        let update = replica.make_update(20, &task("write", true)).unwrap();
        replica.append(update.clone());
        assert_eq!(replica.value(), Some(task("write", true)));

        replica.retract(update);
        assert_eq!(replica.value(), Some(task("write", false)));
    }
}
