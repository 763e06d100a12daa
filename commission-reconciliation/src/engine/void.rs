//! Reversal of applied statement entries.
//!
//! A void never touches the entry it reverses: it is a new `-VOID-` record
//! with the negated amount, dated on the day it is recorded, in a
//! `VOID-IMPORT` batch of its own.

use crate::engine::ids;
use crate::error::ReconciliationError;
use crate::models::{EntryKind, Transaction, TransactionFilter, VoidBatchResult, VoidRequest};
use crate::services::metrics::record_void;
use crate::services::store::TransactionStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};

/// Build the void for one statement entry.
pub fn void_entry(
    original: &Transaction,
    request: &VoidRequest,
    void_batch_id: &str,
) -> Result<Transaction, ReconciliationError> {
    let not_voidable = |reason: &str| ReconciliationError::NotVoidable {
        transaction_id: original.transaction_id.clone(),
        reason: reason.to_string(),
    };

    if !matches!(original.kind(), EntryKind::Statement { .. }) {
        return Err(not_voidable("only statement entries can be voided"));
    }
    let amount = original
        .amount_paid
        .ok_or_else(|| not_voidable("entry has no paid amount"))?;

    let root_id = original.root_id();
    Ok(Transaction {
        transaction_id: ids::void_id(root_id, request.void_date, &ids::generate_nonce()),
        policy_number: original.policy_number.clone(),
        customer: original.customer.clone(),
        carrier: original.carrier.clone(),
        mga: original.mga.clone(),
        transaction_type: original.transaction_type.clone(),
        effective_date: original.effective_date,
        amount_paid: Some(-amount),
        statement_date: Some(request.void_date),
        reconciliation_id: Some(void_batch_id.to_string()),
        reverses_transaction_id: Some(original.transaction_id.clone()),
        notes: Some(format!(
            "VOID of {}: {}",
            original.transaction_id, request.reason
        )),
        ..Default::default()
    })
}

/// Store-backed voiding of single entries and whole batches.
#[derive(Clone)]
pub struct VoidService {
    store: Arc<dyn TransactionStore>,
}

impl VoidService {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    async fn existing_void(&self, transaction_id: &str) -> Result<Option<String>, ReconciliationError> {
        let voids = self
            .store
            .query(&TransactionFilter::reversing(transaction_id))
            .await?;
        Ok(voids
            .into_iter()
            .find(|t| matches!(t.kind(), EntryKind::Void { .. }))
            .map(|t| t.transaction_id))
    }

    #[instrument(skip(self, request), fields(transaction_id = %transaction_id))]
    pub async fn void_transaction(
        &self,
        transaction_id: &str,
        request: &VoidRequest,
    ) -> Result<Transaction, ReconciliationError> {
        let original = self
            .store
            .get(transaction_id)
            .await?
            .ok_or_else(|| ReconciliationError::NotFound(transaction_id.to_string()))?;

        if let Some(void_id) = self.existing_void(transaction_id).await? {
            return Err(ReconciliationError::AlreadyVoided {
                transaction_id: transaction_id.to_string(),
                void_id,
            });
        }

        let batch_id = ids::void_batch_id(request.void_date, &ids::generate_nonce());
        let void = void_entry(&original, request, &batch_id)?;

        let report = self.store.insert_many(std::slice::from_ref(&void)).await?;
        if !report.conflicts.is_empty() {
            return Err(ReconciliationError::PersistenceConflict {
                transaction_id: void.transaction_id,
            });
        }

        record_void("single");
        info!(void_id = %void.transaction_id, void_batch_id = %batch_id, "Statement entry voided");
        Ok(void)
    }

    /// Void every statement entry of a reconciliation batch that has not
    /// been voided yet, under one new void batch id.
    #[instrument(skip(self, request), fields(reconciliation_id = %reconciliation_id))]
    pub async fn void_batch(
        &self,
        reconciliation_id: &str,
        request: &VoidRequest,
    ) -> Result<VoidBatchResult, ReconciliationError> {
        let entries: Vec<Transaction> = self
            .store
            .query(&TransactionFilter::by_reconciliation(reconciliation_id))
            .await?
            .into_iter()
            .filter(|t| matches!(t.kind(), EntryKind::Statement { .. }))
            .collect();
        if entries.is_empty() {
            return Err(ReconciliationError::NotFound(reconciliation_id.to_string()));
        }

        let batch_id = ids::void_batch_id(request.void_date, &ids::generate_nonce());
        let mut voids = Vec::new();
        let mut already_voided = Vec::new();
        for entry in &entries {
            if self.existing_void(&entry.transaction_id).await?.is_some() {
                already_voided.push(entry.transaction_id.clone());
                continue;
            }
            voids.push(void_entry(entry, request, &batch_id)?);
        }

        let report = if voids.is_empty() {
            Default::default()
        } else {
            self.store.insert_many(&voids).await?
        };

        let total_reversed: Decimal = voids
            .iter()
            .filter(|v| report.inserted.contains(&v.transaction_id))
            .filter_map(|v| v.amount_paid)
            .map(|a| -a)
            .sum();

        record_void("batch");
        info!(
            void_batch_id = %batch_id,
            voided = report.inserted.len(),
            already_voided = already_voided.len(),
            "Reconciliation batch voided"
        );

        Ok(VoidBatchResult {
            void_reconciliation_id: batch_id,
            original_reconciliation_id: reconciliation_id.to_string(),
            voided: report.inserted,
            already_voided,
            total_reversed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stmt() -> Transaction {
        Transaction {
            transaction_id: "ABC123D-STMT-20240101".to_string(),
            policy_number: Some("1AA338948".to_string()),
            customer: Some("Starr Custom Tinting".to_string()),
            effective_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            amount_paid: Some(Decimal::from(180)),
            statement_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            reconciliation_id: Some("STMT-RECON-20240101".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn void_carries_its_own_date() {
        let void_date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let request = VoidRequest {
            reason: "Duplicate statement".to_string(),
            void_date,
        };
        let void = void_entry(&stmt(), &request, "VOID-IMPORT-20240131-0000ABCD").unwrap();

        assert_eq!(void.statement_date, Some(void_date));
        assert_eq!(void.kind().embedded_date(), Some(void_date));
        assert!(void.transaction_id.starts_with("ABC123D-VOID-20240131-"));
        assert_eq!(void.amount_paid, Some(Decimal::from(-180)));
        assert_eq!(void.reverses_transaction_id.as_deref(), Some("ABC123D-STMT-20240101"));
        assert_eq!(
            void.notes.as_deref(),
            Some("VOID of ABC123D-STMT-20240101: Duplicate statement")
        );
        assert_eq!(
            void.reconciliation_id.as_deref(),
            Some("VOID-IMPORT-20240131-0000ABCD")
        );
    }

    #[test]
    fn roots_are_not_voidable() {
        let root = Transaction {
            transaction_id: "ABC123D".to_string(),
            ..Default::default()
        };
        let request = VoidRequest {
            reason: "x".to_string(),
            void_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        };
        assert!(matches!(
            void_entry(&root, &request, "VOID-IMPORT-20240131-0000ABCD"),
            Err(ReconciliationError::NotVoidable { .. })
        ));
    }
}
