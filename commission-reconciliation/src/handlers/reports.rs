//! Reconciliation history and outstanding-balance views.

use axum::extract::{Json, Query, State};
use chrono::{Duration, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::engine::{
    outstanding_transactions, reconciliation_history, OutstandingReport, ReconciliationHistory,
};
use crate::error::ReconciliationError;
use crate::handlers::parse_request_date;
use crate::models::TransactionFilter;
use crate::startup::AppState;
use service_core::error::AppError;

const DEFAULT_HISTORY_DAYS: i64 = 30;

#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    /// Defaults to thirty days before `to`.
    #[validate(length(min = 1, max = 32))]
    pub from: Option<String>,
    /// Defaults to today.
    #[validate(length(min = 1, max = 32))]
    pub to: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OutstandingQuery {
    #[validate(length(min = 1, max = 200))]
    pub customer: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub carrier: Option<String>,
}

/// GET /reconciliations?from=&to=
pub async fn list_reconciliations(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ReconciliationHistory>, AppError> {
    query.validate()?;
    let to = match query.to.as_deref() {
        Some(s) => parse_request_date(s, "to")?,
        None => Utc::now().date_naive(),
    };
    let from = match query.from.as_deref() {
        Some(s) => parse_request_date(s, "from")?,
        None => to - Duration::days(DEFAULT_HISTORY_DAYS),
    };
    if from > to {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "from ({}) is after to ({})",
            from,
            to
        )));
    }

    let entries = state
        .store
        .query(&TransactionFilter::statement_between(from, to))
        .await
        .map_err(ReconciliationError::from)?;
    Ok(Json(reconciliation_history(&entries, from, to)))
}

/// GET /transactions/outstanding?customer=&carrier=
pub async fn list_outstanding(
    State(state): State<AppState>,
    Query(query): Query<OutstandingQuery>,
) -> Result<Json<OutstandingReport>, AppError> {
    query.validate()?;
    // Entries copy the root's customer, so a customer filter keeps every payment.
    let filter = match &query.customer {
        Some(customer) => TransactionFilter::by_customer(customer.clone()),
        None => TransactionFilter::default(),
    };
    let all = state
        .store
        .query(&filter)
        .await
        .map_err(ReconciliationError::from)?;

    Ok(Json(outstanding_transactions(
        &all,
        &state.balances(),
        query.customer.as_deref(),
        query.carrier.as_deref(),
    )))
}
