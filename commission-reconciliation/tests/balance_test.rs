//! Balance conservation across reconciliation and voiding.

mod common;

use commission_reconciliation::engine::{BalanceCalculator, BalanceConfig, VoidService};
use commission_reconciliation::models::{BatchConfig, EntryKind, VoidRequest};
use commission_reconciliation::services::InMemoryStore;
use common::*;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn batch_lowers_balances_by_paid_and_void_restores_them() {
    init_tracing();
    let a = root_tx("Acme Roofing", "P-100", date(2024, 1, 10), "400");
    let b = root_tx("Birch Dental", "P-200", date(2024, 1, 12), "250.50");
    let store = Arc::new(InMemoryStore::with_transactions(vec![a.clone(), b.clone()]));

    let before = balance_of(store.as_ref(), &a).await + balance_of(store.as_ref(), &b).await;

    let rows = vec![
        raw_row(Some("Acme Roofing"), Some("P-100"), Some("01/10/2024"), json!("150.25")),
        raw_row(Some("Birch Dental"), Some("P-200"), Some("01/12/2024"), json!("250.50")),
    ];
    let result = session(store.clone(), &batch_config(date(2024, 3, 31)))
        .run(rows)
        .await
        .unwrap();
    assert_eq!(result.total_paid, dec("400.75"));

    let after = balance_of(store.as_ref(), &a).await + balance_of(store.as_ref(), &b).await;
    assert_eq!(before - after, result.total_paid);

    let voids = VoidService::new(store.clone())
        .void_batch(
            &result.reconciliation_id,
            &VoidRequest {
                reason: "wrong carrier".to_string(),
                void_date: date(2024, 4, 30),
            },
        )
        .await
        .unwrap();
    assert_eq!(voids.voided.len(), 2);
    assert_eq!(voids.total_reversed, dec("400.75"));

    let restored = balance_of(store.as_ref(), &a).await + balance_of(store.as_ref(), &b).await;
    assert_eq!(restored, before);
}

#[tokio::test]
async fn statement_entries_on_another_term_leave_balance_alone() {
    init_tracing();
    let term_2023 = root_tx("Acme Roofing", "P-100", date(2023, 1, 10), "300");
    let term_2024 = root_tx("Acme Roofing", "P-100", date(2024, 1, 10), "300");
    let store = Arc::new(InMemoryStore::with_transactions(vec![
        term_2023.clone(),
        term_2024.clone(),
    ]));

    let rows = vec![raw_row(Some("Acme Roofing"), Some("P-100"), Some("01/10/2024"), json!(300))];
    session(store.clone(), &batch_config(date(2024, 2, 29)))
        .run(rows)
        .await
        .unwrap();

    assert_eq!(balance_of(store.as_ref(), &term_2023).await, dec("300"));
    assert!(balance_of(store.as_ref(), &term_2024).await.is_zero());
}

#[tokio::test]
async fn portfolio_excludes_totals_row() {
    init_tracing();
    let a = root_tx("Acme Roofing", "P-100", date(2024, 1, 10), "100");
    let b = root_tx("Birch Dental", "P-200", date(2024, 1, 12), "200");
    let c = root_tx("Cedar Bakery", "P-300", date(2024, 1, 14), "300");
    let mut totals = root_tx("Grand Total", "", date(2024, 1, 1), "600");
    totals.policy_number = None;
    let store = Arc::new(InMemoryStore::with_transactions(vec![
        a,
        b,
        c,
        totals.clone(),
    ]));

    let rows = vec![raw_row(Some("Acme Roofing"), Some("P-100"), Some("01/10/2024"), json!(100))];
    session(store.clone(), &batch_config(date(2024, 2, 29)))
        .run(rows)
        .await
        .unwrap();

    let all = store.snapshot().await;
    let calculator = BalanceCalculator::new(BalanceConfig {
        known_total: Some(dec("600")),
        ..Default::default()
    });
    let summary = calculator.portfolio_summary(&all);

    assert_eq!(summary.total_credit, dec("600"));
    assert_eq!(summary.total_debit, dec("100"));
    assert_eq!(summary.total_outstanding, dec("500"));
    assert_eq!(summary.settled_policies, 1);
    assert_eq!(summary.outstanding_policies, 2);
    assert_eq!(summary.excluded_rows, vec![totals.transaction_id]);
}

#[tokio::test]
async fn computed_totals_row_is_dropped_without_configured_total() {
    init_tracing();
    let roots = vec![
        root_tx("Acme Roofing", "P-100", date(2024, 1, 10), "100"),
        root_tx("Birch Dental", "P-200", date(2024, 1, 12), "200"),
        root_tx("Cedar Bakery", "P-300", date(2024, 1, 14), "300"),
        root_tx("Portfolio", "P-999", date(2024, 1, 1), "600"),
    ];
    let store = InMemoryStore::with_transactions(roots.clone());

    let summary = balances().portfolio_summary(&store.snapshot().await);

    assert_eq!(summary.total_credit, dec("600"));
    assert_eq!(summary.excluded_rows, vec![roots[3].transaction_id.clone()]);
}

#[tokio::test]
async fn import_root_without_policy_is_settled_by_its_payment() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let config = BatchConfig {
        create_missing_policies: true,
        ..batch_config(date(2024, 1, 31))
    };
    let rows = vec![raw_row(Some("Delta Auto"), Some("nan"), None, json!("310.25"))];
    let result = session(store.clone(), &config).run(rows).await.unwrap();
    assert_eq!(result.created, 1);

    let all = store.snapshot().await;
    let root = all
        .iter()
        .find(|t| t.kind() == EntryKind::Import)
        .cloned()
        .expect("import root");
    assert!(root.policy_number.is_none());
    assert!(balance_of(store.as_ref(), &root).await.is_zero());

    let summary = balances().portfolio_summary(&all);
    assert_eq!(summary.settled_policies, 1);
    assert_eq!(summary.outstanding_policies, 0);
    assert!(summary.total_outstanding.is_zero());
}
