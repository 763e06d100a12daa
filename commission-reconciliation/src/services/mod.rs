//! Services module for commission-reconciliation.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod store;

pub use database::PgTransactionStore;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use store::{InsertReport, StoreError, TransactionStore};
