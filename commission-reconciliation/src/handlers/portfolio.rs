//! Portfolio-wide read endpoints.

use axum::extract::{Json, State};

use crate::engine::{audit_ledger, AuditReport, PortfolioSummary};
use crate::error::ReconciliationError;
use crate::models::TransactionFilter;
use crate::startup::AppState;
use service_core::error::AppError;

/// GET /portfolio/summary
pub async fn portfolio_summary(
    State(state): State<AppState>,
) -> Result<Json<PortfolioSummary>, AppError> {
    let all = state
        .store
        .query(&TransactionFilter::default())
        .await
        .map_err(ReconciliationError::from)?;
    Ok(Json(state.balances().portfolio_summary(&all)))
}

/// GET /audit
pub async fn audit(State(state): State<AppState>) -> Result<Json<AuditReport>, AppError> {
    let all = state
        .store
        .query(&TransactionFilter::default())
        .await
        .map_err(ReconciliationError::from)?;
    let report = audit_ledger(&all, &state.balances());
    if !report.is_clean() {
        tracing::warn!(
            duplicate_ids = report.duplicate_ids.len(),
            contaminated_imports = report.contaminated_imports.len(),
            date_mismatches = report.date_mismatches.len(),
            orphan_entries = report.orphan_entries.len(),
            overpaid = report.overpaid.len(),
            "Ledger audit found issues"
        );
    }
    Ok(Json(report))
}
