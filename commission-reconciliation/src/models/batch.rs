//! Batch reconciliation configuration, lifecycle and results.

use crate::engine::ids;
use crate::error::ReconciliationError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied settings for one statement import.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub statement_date: NaiveDate,
    /// Batch id prefix; blank falls back to `STMT`.
    pub reconciliation_prefix: String,
    pub carrier: Option<String>,
    pub mga: Option<String>,
    /// Create `-IMPORT` roots for rows that match nothing.
    pub create_missing_policies: bool,
}

/// Values fixed for the whole batch and handed to every per-row call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchContext {
    pub reconciliation_id: String,
    pub statement_date: NaiveDate,
    pub carrier: Option<String>,
    pub mga: Option<String>,
}

impl BatchContext {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            reconciliation_id: ids::reconciliation_id(
                &config.reconciliation_prefix,
                config.statement_date,
            ),
            statement_date: config.statement_date,
            carrier: config.carrier.clone(),
            mga: config.mga.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Pending,
    Processing,
    Committed,
    Aborted,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }

    /// `Pending -> Processing -> Committed | Aborted`; a fatal error before
    /// processing may also abort a pending batch.
    pub fn transition(self, to: BatchState) -> Result<BatchState, ReconciliationError> {
        use BatchState::*;
        match (self, to) {
            (Pending, Processing)
            | (Pending, Aborted)
            | (Processing, Committed)
            | (Processing, Aborted) => Ok(to),
            _ => Err(ReconciliationError::InvalidState { from: self, to }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row held back because more than one policy fits it equally well.
#[derive(Debug, Clone, Serialize)]
pub struct AmbiguousRow {
    pub row_number: usize,
    pub customer: Option<String>,
    pub policy_number: Option<String>,
    pub paid_amount: Option<Decimal>,
    pub candidate_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnmatchedRow {
    pub row_number: usize,
    pub customer: Option<String>,
    pub policy_number: Option<String>,
    pub paid_amount: Option<Decimal>,
}

/// A root whose payments exceed its commission credit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverpaidPolicy {
    pub transaction_id: String,
    pub policy_number: Option<String>,
    pub credit: Decimal,
    pub paid: Decimal,
    pub balance: Decimal,
}

/// Summary of one statement import. Always returned, including when the
/// commit failed, so the operator can decide whether to re-run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub reconciliation_id: String,
    pub state: BatchState,
    pub statement_date: NaiveDate,
    pub matched: usize,
    pub created: usize,
    pub skipped_empty: usize,
    pub invalid_rows: usize,
    pub ambiguous: usize,
    pub already_settled: usize,
    pub unmatched: usize,
    pub total_paid: Decimal,
    pub ambiguous_rows: Vec<AmbiguousRow>,
    pub unmatched_rows: Vec<UnmatchedRow>,
    pub overpaid: Vec<OverpaidPolicy>,
    pub committed_transaction_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl BatchResult {
    pub fn new(context: &BatchContext) -> Self {
        Self {
            reconciliation_id: context.reconciliation_id.clone(),
            state: BatchState::Pending,
            statement_date: context.statement_date,
            matched: 0,
            created: 0,
            skipped_empty: 0,
            invalid_rows: 0,
            ambiguous: 0,
            already_settled: 0,
            unmatched: 0,
            total_paid: Decimal::ZERO,
            ambiguous_rows: Vec::new(),
            unmatched_rows: Vec::new(),
            overpaid: Vec::new(),
            committed_transaction_ids: Vec::new(),
            failure: None,
        }
    }
}

/// Reason and date for reversing statement entries.
#[derive(Debug, Clone)]
pub struct VoidRequest {
    pub reason: String,
    /// Date the void is recorded on; becomes the void's statement date.
    pub void_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoidBatchResult {
    pub void_reconciliation_id: String,
    pub original_reconciliation_id: String,
    pub voided: Vec<String>,
    pub already_voided: Vec<String>,
    pub total_reversed: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_batch_cannot_reprocess() {
        let state = BatchState::Pending
            .transition(BatchState::Processing)
            .and_then(|s| s.transition(BatchState::Committed))
            .unwrap();
        assert!(state.is_terminal());

        let err = state.transition(BatchState::Processing).unwrap_err();
        assert!(matches!(
            err,
            ReconciliationError::InvalidState {
                from: BatchState::Committed,
                to: BatchState::Processing
            }
        ));
    }

    #[test]
    fn pending_cannot_commit_directly() {
        assert!(BatchState::Pending.transition(BatchState::Committed).is_err());
        assert!(BatchState::Pending.transition(BatchState::Aborted).is_ok());
    }

    #[test]
    fn context_derives_batch_id_from_statement_date() {
        let config = BatchConfig {
            statement_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            reconciliation_prefix: " aetna ".to_string(),
            carrier: Some("Aetna".to_string()),
            mga: None,
            create_missing_policies: false,
        };
        let context = BatchContext::from_config(&config);
        assert_eq!(context.reconciliation_id, "AETNA-RECON-20240131");
    }
}
