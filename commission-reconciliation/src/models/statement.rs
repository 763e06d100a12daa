//! Statement rows as they arrive and as the engine consumes them.

use crate::engine::normalize;
use crate::error::ReconciliationError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One statement row after column mapping, before validation. Cells keep
/// whatever JSON shape the upload produced (text, number or null).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStatementRow {
    #[serde(default)]
    pub customer: Option<Value>,
    #[serde(default)]
    pub policy_number: Option<Value>,
    #[serde(default)]
    pub effective_date: Option<Value>,
    #[serde(default)]
    pub paid_amount: Option<Value>,
    #[serde(default)]
    pub statement_date: Option<Value>,
    #[serde(default)]
    pub commission_due: Option<Value>,
}

/// A validated statement row.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRow {
    /// 1-based position in the upload.
    pub row_number: usize,
    pub customer: Option<String>,
    pub policy_number: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub paid_amount: Option<Decimal>,
    pub statement_date: Option<NaiveDate>,
    /// Carrier's estimate of the commission, used as credit for import roots.
    pub commission_due: Option<Decimal>,
}

impl StatementRow {
    /// Validate a raw row. Sentinel values ("nan", "none", blanks) become
    /// `None`; a present value that cannot be parsed is an `InvalidRow`.
    pub fn from_raw(row_number: usize, raw: &RawStatementRow) -> Result<Self, ReconciliationError> {
        let invalid = |reason: String| ReconciliationError::InvalidRow { row_number, reason };

        let paid_amount = normalize::amount_from_value(raw.paid_amount.as_ref())
            .map_err(|e| invalid(format!("paid amount: {}", e)))?;
        let commission_due = normalize::amount_from_value(raw.commission_due.as_ref())
            .map_err(|e| invalid(format!("commission: {}", e)))?;
        let effective_date = normalize::date_from_value(raw.effective_date.as_ref())
            .map_err(|e| invalid(format!("effective date: {}", e)))?;
        let statement_date = normalize::date_from_value(raw.statement_date.as_ref())
            .map_err(|e| invalid(format!("statement date: {}", e)))?;

        Ok(Self {
            row_number,
            customer: normalize::text_from_value(raw.customer.as_ref()),
            policy_number: normalize::text_from_value(raw.policy_number.as_ref()),
            effective_date,
            paid_amount,
            statement_date,
            commission_due,
        })
    }

    /// A row is empty only when customer, policy number and paid amount are
    /// all absent. A zero amount with no identity carries nothing to apply
    /// and counts as absent; a zero amount next to a customer or policy does
    /// not make the row empty.
    pub fn is_empty(&self) -> bool {
        self.customer.is_none()
            && self.policy_number.is_none()
            && self.paid_amount.map_or(true, |a| a.is_zero())
    }

    /// The statement's own totals line: no policy and a customer cell that
    /// reads like "Total" or "Grand Total".
    pub fn is_totals_line(&self) -> bool {
        self.policy_number.is_none()
            && self
                .customer
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains("total"))
    }
}

/// Header names used to pull statement fields out of an uploaded CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub customer: String,
    pub policy_number: String,
    pub effective_date: String,
    pub paid_amount: String,
    pub statement_date: String,
    pub commission_due: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            customer: "Customer".to_string(),
            policy_number: "Policy Number".to_string(),
            effective_date: "Effective Date".to_string(),
            paid_amount: "Agent Paid Amount (STMT)".to_string(),
            statement_date: "STMT DATE".to_string(),
            commission_due: "Agent Estimated Comm $".to_string(),
        }
    }
}
