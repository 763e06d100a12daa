//! The record-store interface the engine consumes.

use crate::models::{Transaction, TransactionFilter};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The write failed. `persisted` lists ids that were flushed before the
    /// failure and are not rolled back.
    #[error("write rejected after {} records: {reason}", persisted.len())]
    WriteRejected {
        persisted: Vec<String>,
        reason: String,
    },
}

/// Outcome of an insert-if-absent batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: Vec<String>,
    /// Ids that already existed; those records were not written.
    pub conflicts: Vec<String>,
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError>;

    async fn get(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError>;

    /// Insert every record whose id is absent; never overwrite.
    async fn insert_many(&self, records: &[Transaction]) -> Result<InsertReport, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
