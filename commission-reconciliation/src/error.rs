//! Reconciliation error taxonomy and its mapping onto HTTP errors.

use crate::models::BatchState;
use crate::services::store::StoreError;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// The upload could not be read; nothing was processed.
    #[error("Malformed statement file: {0}")]
    MalformedFile(String),

    #[error("Row {row_number} matches {} policies: {}", candidate_ids.len(), candidate_ids.join(", "))]
    AmbiguousMatch {
        row_number: usize,
        candidate_ids: Vec<String>,
    },

    #[error("Transaction {transaction_id} already exists")]
    PersistenceConflict { transaction_id: String },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("Row {row_number} is invalid: {reason}")]
    InvalidRow { row_number: usize, reason: String },

    #[error("Batch cannot move from {from} to {to}")]
    InvalidState { from: BatchState, to: BatchState },

    #[error("Transaction {0} not found")]
    NotFound(String),

    #[error("Transaction {transaction_id} cannot be voided: {reason}")]
    NotVoidable {
        transaction_id: String,
        reason: String,
    },

    #[error("Transaction {transaction_id} was already voided by {void_id}")]
    AlreadyVoided {
        transaction_id: String,
        void_id: String,
    },
}

impl ReconciliationError {
    /// Label used for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedFile(_) => "malformed_file",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::PersistenceConflict { .. } => "persistence_conflict",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::InvalidRow { .. } => "invalid_row",
            Self::InvalidState { .. } => "invalid_state",
            Self::NotFound(_) => "not_found",
            Self::NotVoidable { .. } => "not_voidable",
            Self::AlreadyVoided { .. } => "already_voided",
        }
    }
}

impl From<ReconciliationError> for AppError {
    fn from(err: ReconciliationError) -> Self {
        let message = err.to_string();
        match err {
            ReconciliationError::MalformedFile(_)
            | ReconciliationError::InvalidRow { .. }
            | ReconciliationError::NotVoidable { .. } => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            ReconciliationError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            ReconciliationError::AmbiguousMatch { .. }
            | ReconciliationError::PersistenceConflict { .. }
            | ReconciliationError::AlreadyVoided { .. } => {
                AppError::Conflict(anyhow::anyhow!(message))
            }
            ReconciliationError::PersistenceFailure(_) => {
                AppError::DatabaseError(anyhow::anyhow!(message))
            }
            ReconciliationError::InvalidState { .. } => {
                AppError::InternalError(anyhow::anyhow!(message))
            }
        }
    }
}
