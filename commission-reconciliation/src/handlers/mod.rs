//! HTTP handlers for commission-reconciliation.

pub mod portfolio;
pub mod reconcile;
pub mod reports;
pub mod transactions;

use crate::engine::normalize;
use crate::models::VoidRequest;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

pub use portfolio::{audit, portfolio_summary};
pub use reconcile::{reconcile_statement, void_reconciliation};
pub use reports::{list_outstanding, list_reconciliations};
pub use transactions::{get_balance, get_ledger, void_transaction};

/// Body of both void endpoints.
#[derive(Debug, Deserialize, Validate)]
pub struct VoidRequestBody {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    /// Defaults to today.
    pub void_date: Option<String>,
}

impl VoidRequestBody {
    pub fn into_request(self) -> Result<VoidRequest, AppError> {
        self.validate()?;
        let void_date = match self.void_date.as_deref() {
            Some(s) => parse_request_date(s, "void_date")?,
            None => Utc::now().date_naive(),
        };
        Ok(VoidRequest {
            reason: self.reason.trim().to_string(),
            void_date,
        })
    }
}

pub(crate) fn parse_request_date(value: &str, field: &str) -> Result<NaiveDate, AppError> {
    normalize::parse_date(value)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid {}: '{}'", field, value)))
}
