//! Domain models for commission-reconciliation.

#![allow(clippy::should_implement_trait)]

pub mod batch;
pub mod statement;

pub use batch::{
    AmbiguousRow, BatchConfig, BatchContext, BatchResult, BatchState, OverpaidPolicy,
    UnmatchedRow, VoidBatchResult, VoidRequest,
};
pub use statement::{ColumnMapping, RawStatementRow, StatementRow};

use crate::engine::ids;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Transaction
// ============================================================================

/// One ledger record. Root transactions carry `commission_due`; derived
/// statement and void entries carry `amount_paid` and `statement_date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub transaction_id: String,
    pub policy_number: Option<String>,
    pub customer: Option<String>,
    pub carrier: Option<String>,
    pub mga: Option<String>,
    pub transaction_type: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub policy_origination_date: Option<NaiveDate>,
    pub prior_policy_number: Option<String>,
    pub original_effective_date: Option<NaiveDate>,
    pub premium: Option<Decimal>,
    pub agent_rate: Option<Decimal>,
    pub broker_fee_agent_comm: Option<Decimal>,
    pub commission_due: Option<Decimal>,
    pub amount_paid: Option<Decimal>,
    pub statement_date: Option<NaiveDate>,
    pub reconciliation_id: Option<String>,
    pub reverses_transaction_id: Option<String>,
    pub notes: Option<String>,
    pub created_utc: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn kind(&self) -> EntryKind {
        ids::entry_kind(&self.transaction_id)
    }

    /// Root and import transactions establish commission credit.
    pub fn is_root(&self) -> bool {
        matches!(self.kind(), EntryKind::Root | EntryKind::Import)
    }

    /// Statement and void entries move the paid side of the ledger.
    pub fn is_payment_entry(&self) -> bool {
        matches!(
            self.kind(),
            EntryKind::Statement { .. } | EntryKind::Void { .. }
        )
    }

    /// Id of the root transaction this record hangs off.
    pub fn root_id(&self) -> &str {
        ids::root_id_of(&self.transaction_id)
    }

    pub fn transaction_type(&self) -> Option<TransactionType> {
        self.transaction_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TransactionType::from_str)
    }
}

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionType {
    New,
    Renewal,
    Endorsement,
    Cancellation,
    Cancelled,
    BrokerOfRecord,
    Payment,
    Reinstatement,
    Rewrite,
    NewBusinessSubmission,
    Stl,
    PolicyChange,
    Other(String),
}

impl TransactionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "NEW",
            Self::Renewal => "RWL",
            Self::Endorsement => "END",
            Self::Cancellation => "CAN",
            Self::Cancelled => "XCL",
            Self::BrokerOfRecord => "BOR",
            Self::Payment => "PMT",
            Self::Reinstatement => "REI",
            Self::Rewrite => "REWRITE",
            Self::NewBusinessSubmission => "NBS",
            Self::Stl => "STL",
            Self::PolicyChange => "PCH",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Self::New,
            "RWL" => Self::Renewal,
            "END" => Self::Endorsement,
            "CAN" => Self::Cancellation,
            "XCL" => Self::Cancelled,
            "BOR" => Self::BrokerOfRecord,
            "PMT" => Self::Payment,
            "REI" => Self::Reinstatement,
            "REWRITE" => Self::Rewrite,
            "NBS" => Self::NewBusinessSubmission,
            "STL" => Self::Stl,
            "PCH" => Self::PolicyChange,
            other => Self::Other(other.to_string()),
        }
    }
}

/// What a transaction id says about the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Root,
    /// Root created from an orphan statement row, id ends in `-IMPORT`.
    Import,
    Statement {
        date: Option<NaiveDate>,
    },
    Void {
        date: Option<NaiveDate>,
        nonce: Option<String>,
    },
    Adjustment,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Import => "import",
            Self::Statement { .. } => "statement",
            Self::Void { .. } => "void",
            Self::Adjustment => "adjustment",
        }
    }

    /// Date embedded in a derived id, if any.
    pub fn embedded_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Statement { date } | Self::Void { date, .. } => *date,
            _ => None,
        }
    }
}

// ============================================================================
// Store filter
// ============================================================================

/// Field filters for a store query. Text filters compare trimmed and
/// case-insensitively; an empty filter returns every transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub policy_number: Option<String>,
    pub customer: Option<String>,
    pub reconciliation_id: Option<String>,
    pub reverses_transaction_id: Option<String>,
    /// Inclusive statement date bounds; records without one never match.
    pub statement_from: Option<NaiveDate>,
    pub statement_to: Option<NaiveDate>,
}

impl TransactionFilter {
    pub fn by_policy(policy_number: impl Into<String>) -> Self {
        Self {
            policy_number: Some(policy_number.into()),
            ..Default::default()
        }
    }

    pub fn by_customer(customer: impl Into<String>) -> Self {
        Self {
            customer: Some(customer.into()),
            ..Default::default()
        }
    }

    pub fn by_reconciliation(reconciliation_id: impl Into<String>) -> Self {
        Self {
            reconciliation_id: Some(reconciliation_id.into()),
            ..Default::default()
        }
    }

    pub fn reversing(transaction_id: impl Into<String>) -> Self {
        Self {
            reverses_transaction_id: Some(transaction_id.into()),
            ..Default::default()
        }
    }

    pub fn statement_between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            statement_from: Some(from),
            statement_to: Some(to),
            ..Default::default()
        }
    }
}
