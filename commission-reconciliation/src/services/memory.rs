//! In-process transaction store.

use crate::engine::normalize;
use crate::models::{Transaction, TransactionFilter};
use crate::services::store::{InsertReport, StoreError, TransactionStore};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<Transaction>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, bypassing the insert-if-absent check.
    pub fn with_transactions(records: Vec<Transaction>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn snapshot(&self) -> Vec<Transaction> {
        self.records.read().await.clone()
    }
}

fn text_matches(wanted: Option<&String>, actual: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(w) => normalize::norm_key(Some(w)).is_some() && normalize::same_key(Some(w), actual),
    }
}

fn filter_matches(filter: &TransactionFilter, tx: &Transaction) -> bool {
    text_matches(filter.policy_number.as_ref(), tx.policy_number.as_deref())
        && text_matches(filter.customer.as_ref(), tx.customer.as_deref())
        && filter
            .reconciliation_id
            .as_ref()
            .map_or(true, |id| tx.reconciliation_id.as_ref() == Some(id))
        && filter
            .reverses_transaction_id
            .as_ref()
            .map_or(true, |id| tx.reverses_transaction_id.as_ref() == Some(id))
        && filter
            .statement_from
            .map_or(true, |from| tx.statement_date.is_some_and(|d| d >= from))
        && filter
            .statement_to
            .map_or(true, |to| tx.statement_date.is_some_and(|d| d <= to))
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError> {
        let records = self.records.read().await;
        let mut found: Vec<Transaction> = records
            .iter()
            .filter(|t| filter_matches(filter, t))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.transaction_id.cmp(&b.transaction_id));
        Ok(found)
    }

    async fn get(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|t| t.transaction_id == transaction_id)
            .cloned())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn insert_many(&self, records: &[Transaction]) -> Result<InsertReport, StoreError> {
        let mut stored = self.records.write().await;
        let mut report = InsertReport::default();
        for record in records {
            if stored.iter().any(|t| t.transaction_id == record.transaction_id) {
                report.conflicts.push(record.transaction_id.clone());
                continue;
            }
            let mut record = record.clone();
            if record.created_utc.is_none() {
                record.created_utc = Some(Utc::now());
            }
            report.inserted.push(record.transaction_id.clone());
            stored.push(record);
        }
        debug!(
            inserted = report.inserted.len(),
            conflicts = report.conflicts.len(),
            "In-memory insert"
        );
        Ok(report)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
