//! # crdt-oplog
//!
//! An operation-log CRDT for versioned JSON documents.
//!
//! Independent replicas accept local CREATE / READ / UPDATE / DELETE
//! operations against a logically shared JSON document, with no locking
//! and no coordination. Each replica keeps the operations in a two-set
//! log ([`OperationTwoSet`]); exchanging and set-unioning those logs is
//! enough for every replica to materialize the same document, because the
//! fold applies operations in a replica-wide total order.
//!
//! ## Quick Start
//!
//! ```
//! use crdt_oplog::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
//! struct Note {
//!     text: String,
//! }
//!
//! let mut replica = CrdtManager::<Note>::new();
//!
//! let create = replica
//!     .make_create_with(10, &Note { text: "draft".into() })
//!     .unwrap();
//! replica.append(create);
//!
//! let update = replica
//!     .make_update(20, &Note { text: "final".into() })
//!     .unwrap();
//! replica.append(update);
//!
//! assert_eq!(replica.value(), Some(Note { text: "final".into() }));
//!
//! // Time travel: the document as of any timestamp.
//! assert_eq!(replica.value_at(15), Some(Note { text: "draft".into() }));
//! ```
//!
//! ## Pieces
//!
//! - [`Operation`] - a timestamped CREATE / READ / UPDATE / DELETE with an
//!   optional RFC 6902 patch payload, totally ordered across replicas.
//! - [`OperationTwoSet`] - the two-set log: an add set, a remove set, and
//!   an effective set computed on demand; merge is set union.
//! - The fold engine - materializes the document as of any timestamp;
//!   DELETE seals a fold window for good (see [`FoldReport`]).
//! - [`CrdtManager`] - the typed façade converting between native values
//!   and JSON trees, with factories that build operations for you.
//! - [`clock`] - a hybrid logical clock producing the monotonic `u64`
//!   timestamps the log expects from its caller.
//!
//! Timestamps are caller-provided; the engine never invents one. When two
//! replicas pick colliding timestamps the fold stays deterministic: ties
//! break by operation kind, then by the canonical patch text.

mod fold;
mod manager;
mod operation;
mod two_set;

pub mod clock;
pub mod prelude;

pub use fold::FoldReport;
pub use manager::{ConstructionError, CrdtManager, ManagerOptions, MapperError, SchemaId};
pub use operation::{Operation, OperationKind, PatchApplyError};
pub use two_set::OperationTwoSet;

// The patch payload type is part of the public surface.
pub use json_patch::Patch;

/// Core trait every replicated type in this crate implements.
///
/// Merging pulls another replica's state into this one. For the guarantees
/// of the crate to hold, merge must be commutative, associative, and
/// idempotent: any two replicas that have exchanged state in any order,
/// any number of times, end up observably identical.
pub trait Crdt {
    /// Merge another replica's state into this one.
    fn merge(&mut self, other: &Self);
}
