//! Statement import and batch void handlers.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use validator::Validate;

use crate::engine::{parse_statement_csv, ReconciliationSession};
use crate::handlers::{parse_request_date, VoidRequestBody};
use crate::models::{BatchConfig, BatchResult, ColumnMapping, RawStatementRow, VoidBatchResult};
use crate::services::metrics::record_error;
use crate::startup::AppState;
use service_core::error::AppError;

// ============================================================================
// Request DTOs
// ============================================================================

/// A statement upload: either mapped rows or raw CSV text.
#[derive(Debug, Deserialize, Validate)]
pub struct ReconcileRequest {
    #[validate(length(min = 1, max = 32))]
    pub statement_date: String,
    #[validate(length(min = 1, max = 20))]
    pub reconciliation_prefix: Option<String>,
    pub carrier: Option<String>,
    pub mga: Option<String>,
    #[serde(default)]
    pub create_missing_policies: bool,
    pub rows: Option<Vec<RawStatementRow>>,
    pub csv: Option<String>,
    pub column_mapping: Option<ColumnMapping>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Reconcile one statement.
///
/// POST /reconciliations
///
/// A store failure still answers 200 with `state = "aborted"` and the
/// partial summary.
pub async fn reconcile_statement(
    State(state): State<AppState>,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<BatchResult>, AppError> {
    req.validate()?;
    let statement_date = parse_request_date(&req.statement_date, "statement_date")?;

    let rows = match (req.rows, req.csv) {
        (Some(rows), None) => rows,
        (None, Some(csv)) => {
            let mapping = req.column_mapping.unwrap_or_default();
            parse_statement_csv(csv.as_bytes(), &mapping).map_err(|e| {
                record_error(e.kind());
                tracing::warn!(error = %e, "Rejected statement upload");
                AppError::from(e)
            })?
        }
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Provide exactly one of 'rows' or 'csv'"
            )))
        }
    };

    let config = BatchConfig {
        statement_date,
        reconciliation_prefix: req
            .reconciliation_prefix
            .unwrap_or_else(|| state.config.reconciliation.default_prefix.clone()),
        carrier: req.carrier,
        mga: req.mga,
        create_missing_policies: req.create_missing_policies,
    };

    let session = ReconciliationSession::new(
        state.store.clone(),
        &config,
        state.matcher(),
        state.balances(),
    );
    tracing::info!(
        reconciliation_id = %session.context().reconciliation_id,
        rows = rows.len(),
        "Statement import received"
    );

    let result = session.run(rows).await.map_err(|e| {
        record_error(e.kind());
        AppError::from(e)
    })?;

    Ok(Json(result))
}

/// Void every statement entry of a batch.
///
/// POST /reconciliations/:id/void
pub async fn void_reconciliation(
    State(state): State<AppState>,
    Path(reconciliation_id): Path<String>,
    Json(body): Json<VoidRequestBody>,
) -> Result<(StatusCode, Json<VoidBatchResult>), AppError> {
    let request = body.into_request()?;
    let result = state
        .void_service()
        .void_batch(&reconciliation_id, &request)
        .await
        .map_err(|e| {
            record_error(e.kind());
            AppError::from(e)
        })?;

    Ok((StatusCode::CREATED, Json(result)))
}
