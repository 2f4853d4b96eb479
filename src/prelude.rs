//! Convenient re-exports for common usage.
//!
//! ```
//! use crdt_oplog::prelude::*;
//! ```

pub use crate::Crdt;
pub use crate::CrdtManager;
pub use crate::ManagerOptions;
pub use crate::Operation;
pub use crate::OperationKind;
pub use crate::OperationTwoSet;
pub use crate::SchemaId;
