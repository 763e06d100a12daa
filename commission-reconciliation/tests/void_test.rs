//! Voiding single statement entries and whole batches.

mod common;

use commission_reconciliation::engine::VoidService;
use commission_reconciliation::error::ReconciliationError;
use commission_reconciliation::models::{BatchState, EntryKind, TransactionFilter, VoidRequest};
use commission_reconciliation::services::{InMemoryStore, TransactionStore};
use common::*;
use serde_json::json;
use std::sync::Arc;

fn request(reason: &str, y: i32, m: u32, d: u32) -> VoidRequest {
    VoidRequest {
        reason: reason.to_string(),
        void_date: date(y, m, d),
    }
}

/// One root paid in full by a January 31 statement.
async fn settled_policy() -> (Arc<InMemoryStore>, String, String) {
    init_tracing();
    let root = root_tx("Acme Roofing", "P-100", date(2024, 1, 10), "180");
    let store = Arc::new(InMemoryStore::with_transactions(vec![root.clone()]));
    let rows = vec![raw_row(Some("Acme Roofing"), Some("P-100"), Some("01/10/2024"), json!(180))];
    let result = session(store.clone(), &batch_config(date(2024, 1, 31)))
        .run(rows)
        .await
        .unwrap();
    assert_eq!(result.state, BatchState::Committed);
    (store, root.transaction_id, result.committed_transaction_ids[0].clone())
}

#[tokio::test]
async fn void_is_dated_when_recorded_not_when_paid() {
    let (store, root_id, stmt_id) = settled_policy().await;
    let service = VoidService::new(store.clone());

    let void = service
        .void_transaction(&stmt_id, &request("duplicate payment", 2024, 3, 1))
        .await
        .unwrap();

    assert_eq!(void.statement_date, Some(date(2024, 3, 1)));
    assert!(void.transaction_id.starts_with(&format!("{}-VOID-20240301-", root_id)));
    match void.kind() {
        EntryKind::Void { date: d, nonce } => {
            assert_eq!(d, Some(date(2024, 3, 1)));
            assert_eq!(nonce.map(|n| n.len()), Some(8));
        }
        other => panic!("expected a void, got {:?}", other),
    }
    assert_eq!(void.amount_paid, Some(dec("-180")));
    assert_eq!(void.reverses_transaction_id.as_deref(), Some(stmt_id.as_str()));
    assert!(void
        .reconciliation_id
        .as_deref()
        .unwrap()
        .starts_with("VOID-IMPORT-20240301-"));
    assert_eq!(
        void.notes.as_deref(),
        Some(format!("VOID of {}: duplicate payment", stmt_id).as_str())
    );

    let root = store.get(&root_id).await.unwrap().unwrap();
    assert_eq!(balance_of(store.as_ref(), &root).await, dec("180"));
}

#[tokio::test]
async fn voided_entry_keeps_its_original_values() {
    let (store, _, stmt_id) = settled_policy().await;
    let before = store.get(&stmt_id).await.unwrap().unwrap();

    VoidService::new(store.clone())
        .void_transaction(&stmt_id, &request("posted twice", 2024, 2, 15))
        .await
        .unwrap();

    let after = store.get(&stmt_id).await.unwrap().unwrap();
    assert_eq!(after, before);
    let reversals = store
        .query(&TransactionFilter::reversing(stmt_id.clone()))
        .await
        .unwrap();
    assert_eq!(reversals.len(), 1);
}

#[tokio::test]
async fn second_void_is_rejected() {
    let (store, _, stmt_id) = settled_policy().await;
    let service = VoidService::new(store.clone());

    let first = service
        .void_transaction(&stmt_id, &request("wrong policy", 2024, 2, 1))
        .await
        .unwrap();
    let err = service
        .void_transaction(&stmt_id, &request("wrong policy", 2024, 2, 2))
        .await
        .unwrap_err();

    match err {
        ReconciliationError::AlreadyVoided { transaction_id, void_id } => {
            assert_eq!(transaction_id, stmt_id);
            assert_eq!(void_id, first.transaction_id);
        }
        other => panic!("expected AlreadyVoided, got {:?}", other),
    }
    assert_eq!(store.snapshot().await.len(), 3);
}

#[tokio::test]
async fn unknown_and_root_ids_cannot_be_voided() {
    let (store, root_id, _) = settled_policy().await;
    let service = VoidService::new(store.clone());

    let missing = service
        .void_transaction("NOPE123-STMT-20240131", &request("typo", 2024, 2, 1))
        .await
        .unwrap_err();
    assert!(matches!(missing, ReconciliationError::NotFound(_)));

    let root = service
        .void_transaction(&root_id, &request("typo", 2024, 2, 1))
        .await
        .unwrap_err();
    assert!(matches!(root, ReconciliationError::NotVoidable { .. }));
    assert_eq!(store.snapshot().await.len(), 2);
}

#[tokio::test]
async fn batch_void_skips_entries_already_voided() {
    init_tracing();
    let a = root_tx("Acme Roofing", "P-100", date(2024, 1, 10), "100");
    let b = root_tx("Birch Dental", "P-200", date(2024, 1, 12), "90");
    let store = Arc::new(InMemoryStore::with_transactions(vec![a.clone(), b.clone()]));
    let rows = vec![
        raw_row(Some("Acme Roofing"), Some("P-100"), Some("01/10/2024"), json!(100)),
        raw_row(Some("Birch Dental"), Some("P-200"), Some("01/12/2024"), json!(90)),
    ];
    let result = session(store.clone(), &batch_config(date(2024, 1, 31)))
        .run(rows)
        .await
        .unwrap();

    let service = VoidService::new(store.clone());
    let single = &result.committed_transaction_ids[0];
    service
        .void_transaction(single, &request("bounced", 2024, 2, 5))
        .await
        .unwrap();

    let batch = service
        .void_batch(&result.reconciliation_id, &request("wrong statement", 2024, 2, 10))
        .await
        .unwrap();

    assert_eq!(batch.original_reconciliation_id, "STMT-RECON-20240131");
    assert!(batch.void_reconciliation_id.starts_with("VOID-IMPORT-20240210-"));
    assert_eq!(batch.already_voided, vec![single.clone()]);
    assert_eq!(batch.voided.len(), 1);
    assert_eq!(batch.total_reversed, dec("90"));

    assert_eq!(balance_of(store.as_ref(), &a).await, dec("100"));
    assert_eq!(balance_of(store.as_ref(), &b).await, dec("90"));

    let again = service
        .void_batch(&result.reconciliation_id, &request("again", 2024, 2, 11))
        .await
        .unwrap();
    assert!(again.voided.is_empty());
    assert_eq!(again.already_voided.len(), 2);
    assert!(again.total_reversed.is_zero());
}

#[tokio::test]
async fn voiding_unknown_batch_is_not_found() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let err = VoidService::new(store)
        .void_batch("STMT-RECON-20990101", &request("nothing", 2024, 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconciliationError::NotFound(_)));
}
