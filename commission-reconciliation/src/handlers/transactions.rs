//! Per-transaction handlers: void, balance and ledger.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::engine::PolicyLedger;
use crate::error::ReconciliationError;
use crate::handlers::VoidRequestBody;
use crate::models::{Transaction, TransactionFilter};
use crate::services::metrics::record_error;
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub transaction_id: String,
    pub policy_number: Option<String>,
    pub customer: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub credit: Decimal,
    pub debit: Decimal,
    pub balance_due: Decimal,
    pub settled: bool,
}

/// Root transaction plus every record that can carry its payments.
async fn load_root_history(
    state: &AppState,
    transaction_id: &str,
) -> Result<(Transaction, Vec<Transaction>), AppError> {
    let root = state
        .store
        .get(transaction_id)
        .await
        .map_err(ReconciliationError::from)?
        .ok_or_else(|| ReconciliationError::NotFound(transaction_id.to_string()))?;

    if !root.is_root() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} is a derived entry; balances are kept on root transactions",
            transaction_id
        )));
    }

    // Entries copy the root's policy and customer, so either finds them.
    let filter = match (&root.policy_number, &root.customer) {
        (Some(policy), _) => Some(TransactionFilter::by_policy(policy.clone())),
        (None, Some(customer)) => Some(TransactionFilter::by_customer(customer.clone())),
        (None, None) => None,
    };
    let history = match filter {
        Some(filter) => state
            .store
            .query(&filter)
            .await
            .map_err(ReconciliationError::from)?,
        None => vec![root.clone()],
    };
    Ok((root, history))
}

/// POST /transactions/:id/void
pub async fn void_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(body): Json<VoidRequestBody>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let request = body.into_request()?;
    let void = state
        .void_service()
        .void_transaction(&transaction_id, &request)
        .await
        .map_err(|e| {
            record_error(e.kind());
            AppError::from(e)
        })?;

    Ok((StatusCode::CREATED, Json(void)))
}

/// GET /transactions/:id/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<BalanceResponse>, AppError> {
    let (root, history) = load_root_history(&state, &transaction_id).await?;
    let balances = state.balances();
    let credit = balances.credit(&root, &history);
    let debit = balances.debit(&root, &history);
    let balance_due = credit - debit;

    Ok(Json(BalanceResponse {
        transaction_id: root.transaction_id,
        policy_number: root.policy_number,
        customer: root.customer,
        effective_date: root.effective_date,
        credit,
        debit,
        balance_due,
        settled: balances.is_settled(balance_due),
    }))
}

/// GET /transactions/:id/ledger
pub async fn get_ledger(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<PolicyLedger>, AppError> {
    let (root, history) = load_root_history(&state, &transaction_id).await?;
    Ok(Json(state.balances().policy_ledger(&root, &history)))
}
