//! TTL index reconciliation.
//!
//! Keeps each collection's expiration index converged with the configured
//! retention policy: inspect, then create, leave, or update in place. The
//! check-then-act is optimistic by design; a racing reconcile can only
//! re-create the same logical index, never a second one.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::{StoreAdapter, TtlIndex};

/// Name of the per-collection expiration index
pub const TTL_INDEX_NAME: &str = "created_at_ttl";

/// Timestamp field the expiration clock reads
pub const TTL_FIELD: &str = "created_at";

const SECONDS_PER_DAY: u64 = 86_400;

/// Converges collection TTL indexes to the retention policy
pub struct TtlReconciler {
    adapter: Arc<StoreAdapter>,
    retention_days: u64,
}

impl TtlReconciler {
    pub fn new(adapter: Arc<StoreAdapter>, retention_days: u64) -> Self {
        Self {
            adapter,
            retention_days,
        }
    }

    /// Expiration the policy currently demands.
    pub fn expire_after_secs(&self) -> u64 {
        self.retention_days * SECONDS_PER_DAY
    }

    /// Ensure `collection` carries exactly one TTL index matching policy.
    ///
    /// Best effort and non-blocking: failures are logged and reported as
    /// `false`, never raised. The write path must not depend on index
    /// maintenance succeeding; an insert still happens without a guaranteed
    /// TTL when this fails.
    pub async fn ensure(&self, collection: &str) -> bool {
        let expected = self.expire_after_secs();

        let existing = match self.adapter.ttl_index(collection).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!("TTL inspection failed for '{}': {}", collection, e);
                return false;
            }
        };

        match existing {
            Some(index) if index.name == TTL_INDEX_NAME => {
                if index.expire_after_secs == expected {
                    debug!("TTL index on '{}' already matches policy", collection);
                    return true;
                }
                match self
                    .adapter
                    .update_ttl_index(collection, TTL_INDEX_NAME, expected)
                    .await
                {
                    Ok(()) => {
                        debug!(
                            "TTL index on '{}' updated: {}s -> {}s",
                            collection, index.expire_after_secs, expected
                        );
                        true
                    }
                    Err(e) => {
                        warn!("TTL update failed for '{}': {}", collection, e);
                        false
                    }
                }
            }
            _ => {
                let index = TtlIndex {
                    name: TTL_INDEX_NAME.to_string(),
                    field: TTL_FIELD.to_string(),
                    expire_after_secs: expected,
                };
                match self.adapter.create_ttl_index(collection, index).await {
                    Ok(()) => {
                        debug!(
                            "TTL index created on '{}' ({} days)",
                            collection, self.retention_days
                        );
                        true
                    }
                    Err(e) => {
                        warn!("TTL creation failed for '{}': {}", collection, e);
                        false
                    }
                }
            }
        }
    }
}
