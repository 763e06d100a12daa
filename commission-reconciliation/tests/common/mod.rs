//! Common test utilities for commission-reconciliation integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use commission_reconciliation::config::{ReconciliationConfig, ReconciliationSettings, StoreConfig};
use commission_reconciliation::engine::ids::generate_root_id;
use commission_reconciliation::engine::{
    BalanceCalculator, BalanceConfig, Matcher, MatcherConfig, ReconciliationSession,
};
use commission_reconciliation::models::{
    BatchConfig, RawStatementRow, Transaction, TransactionFilter,
};
use commission_reconciliation::services::{
    InMemoryStore, InsertReport, StoreError, TransactionStore,
};
use commission_reconciliation::startup::{build_router, AppState};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use std::str::FromStr;
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,commission_reconciliation=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn test_config() -> ReconciliationConfig {
    ReconciliationConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "commission-reconciliation-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store: StoreConfig::Memory,
        reconciliation: ReconciliationSettings::default(),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("valid decimal")
}

/// A NEW-business root transaction with a fresh id.
pub fn root_tx(customer: &str, policy: &str, effective: NaiveDate, commission: &str) -> Transaction {
    Transaction {
        transaction_id: generate_root_id(),
        customer: Some(customer.to_string()),
        policy_number: Some(policy.to_string()),
        carrier: Some("Progressive".to_string()),
        transaction_type: Some("NEW".to_string()),
        effective_date: Some(effective),
        commission_due: Some(dec(commission)),
        ..Default::default()
    }
}

/// A statement row as the column-mapping layer hands it over.
pub fn raw_row(
    customer: Option<&str>,
    policy: Option<&str>,
    effective: Option<&str>,
    amount: Value,
) -> RawStatementRow {
    RawStatementRow {
        customer: customer.map(|c| json!(c)),
        policy_number: policy.map(|p| json!(p)),
        effective_date: effective.map(|e| json!(e)),
        paid_amount: Some(amount),
        ..Default::default()
    }
}

pub fn batch_config(statement_date: NaiveDate) -> BatchConfig {
    BatchConfig {
        statement_date,
        reconciliation_prefix: "STMT".to_string(),
        carrier: Some("Progressive".to_string()),
        mga: None,
        create_missing_policies: false,
    }
}

pub fn balances() -> BalanceCalculator {
    BalanceCalculator::new(BalanceConfig::default())
}

pub fn session(store: Arc<dyn TransactionStore>, config: &BatchConfig) -> ReconciliationSession {
    ReconciliationSession::new(
        store,
        config,
        Matcher::new(MatcherConfig::default(), balances()),
        balances(),
    )
}

/// Balance of a root computed over the whole ledger.
pub async fn balance_of(store: &dyn TransactionStore, root: &Transaction) -> Decimal {
    let all = store
        .query(&TransactionFilter::default())
        .await
        .expect("query");
    balances().balance_due(root, &all)
}

pub fn test_router(store: Arc<dyn TransactionStore>) -> axum::Router {
    init_tracing();
    build_router(AppState::new(test_config(), store))
}

/// Store whose writes always fail after flushing the first `flush_before_failure`
/// records.
pub struct FailingStore {
    pub inner: InMemoryStore,
    pub flush_before_failure: usize,
}

impl FailingStore {
    pub fn new(seed: Vec<Transaction>, flush_before_failure: usize) -> Self {
        Self {
            inner: InMemoryStore::with_transactions(seed),
            flush_before_failure,
        }
    }
}

#[async_trait]
impl TransactionStore for FailingStore {
    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError> {
        self.inner.query(filter).await
    }

    async fn get(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError> {
        self.inner.get(transaction_id).await
    }

    async fn insert_many(&self, records: &[Transaction]) -> Result<InsertReport, StoreError> {
        let flushed = records.len().min(self.flush_before_failure);
        let report = self.inner.insert_many(&records[..flushed]).await?;
        Err(StoreError::WriteRejected {
            persisted: report.inserted,
            reason: "connection reset by peer".to_string(),
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection reset by peer".to_string()))
    }
}
