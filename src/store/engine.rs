//! Seam to the document-store engine.
//!
//! The engine owns CRUD, indexing, and durability; everything above it only
//! needs the operations declared here. Implementations are injected into the
//! adapter, so the service layer is testable against [`MemoryEngine`]
//! and swappable for a real driver without touching the protocol code.
//!
//! [`MemoryEngine`]: super::MemoryEngine

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Document;

/// Sort direction for a query field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Wire encoding used in command payloads: `1` ascending, `-1` descending.
    pub fn from_wire(direction: i64) -> Option<Self> {
        match direction {
            1 => Some(Self::Ascending),
            -1 => Some(Self::Descending),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i64 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// A filter/sort/pagination request against one collection.
///
/// Stages apply in order: filter, sort, skip, limit. `limit: None` reads
/// everything that matches (used by backup).
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    /// Equality predicate; empty matches all documents
    pub filter: Document,
    /// Sort fields in significance order; ties keep the store's natural order
    pub sort: Vec<(String, SortOrder)>,
    /// Documents to skip after sorting
    pub skip: u64,
    /// Maximum documents to return; `None` is unbounded
    pub limit: Option<u64>,
}

/// An expiration index bound to one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlIndex {
    /// Index name
    pub name: String,
    /// Timestamp field the expiration clock reads
    pub field: String,
    /// Document age at which the store deletes it
    pub expire_after_secs: u64,
}

/// Raw operations against the backing document store.
///
/// Errors are engine-level (`anyhow`); the adapter translates them into the
/// service taxonomy at the boundary.
#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Liveness probe; used by the adapter's connect path.
    async fn ping(&self) -> Result<()>;

    /// Names of all collections, in stable order.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Create a collection; succeeds if it already exists.
    async fn create_collection(&self, name: &str) -> Result<()>;

    /// Drop a collection and its data; succeeds if it never existed.
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Insert one document, returning the store-assigned id as a string.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<String>;

    /// Bulk-insert documents as given, returning how many were written.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize>;

    /// Run a filter/sort/pagination query.
    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>>;

    /// Count all documents in a collection.
    async fn count_documents(&self, collection: &str) -> Result<u64>;

    /// The collection's TTL index, if one exists.
    async fn ttl_index(&self, collection: &str) -> Result<Option<TtlIndex>>;

    /// Create a TTL index on the collection.
    async fn create_ttl_index(&self, collection: &str, index: TtlIndex) -> Result<()>;

    /// Change an existing TTL index's expiration in place.
    async fn update_ttl_index(&self, collection: &str, name: &str, expire_after_secs: u64)
        -> Result<()>;

    /// Release engine resources. Called once, from the stop path.
    async fn shutdown(&self) -> Result<()>;
}
