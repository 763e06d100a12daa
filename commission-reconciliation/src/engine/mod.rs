//! Reconciliation engine: matching, ledger-entry derivation and balances.
//!
//! Everything here except [`session`] and [`void::VoidService`] is pure and
//! works over slices of [`Transaction`](crate::models::Transaction).

pub mod audit;
pub mod balance;
pub mod commission;
pub mod ids;
pub mod matcher;
pub mod normalize;
pub mod reports;
pub mod session;
pub mod statement;
pub mod synthesizer;
pub mod void;

pub use audit::{audit_ledger, AuditReport};
pub use balance::{BalanceCalculator, BalanceConfig, PolicyLedger, PortfolioSummary};
pub use matcher::{MatchResult, MatchStrategy, Matcher, MatcherConfig};
pub use reports::{
    outstanding_transactions, reconciliation_history, OutstandingReport, ReconciliationHistory,
};
pub use session::ReconciliationSession;
pub use statement::parse_statement_csv;
pub use synthesizer::{LedgerSynthesizer, Synthesized};
pub use void::{void_entry, VoidService};
