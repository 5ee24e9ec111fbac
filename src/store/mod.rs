//! Backing-store access: engine seam, adapter, TTL reconciliation

mod adapter;
mod engine;
mod memory;
mod ttl;

pub use adapter::{ConnectionState, StoreAdapter};
pub use engine::{DataEngine, FindQuery, SortOrder, TtlIndex};
pub use memory::MemoryEngine;
pub use ttl::{TtlReconciler, TTL_FIELD, TTL_INDEX_NAME};
