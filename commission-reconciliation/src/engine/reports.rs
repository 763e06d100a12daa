//! Read-only views over the ledger: reconciliation history and
//! outstanding roots.

use crate::engine::balance::BalanceCalculator;
use crate::engine::normalize;
use crate::models::{EntryKind, Transaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub transaction_id: String,
    pub customer: Option<String>,
    pub carrier: Option<String>,
    pub policy_number: Option<String>,
    pub statement_date: Option<NaiveDate>,
    pub amount_paid: Decimal,
    pub reconciliation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationHistory {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub count: usize,
    pub total_paid: Decimal,
    /// Newest statement date first.
    pub entries: Vec<HistoryEntry>,
}

/// Statement entries dated inside `[from, to]`. Voids are not listed here.
pub fn reconciliation_history(all: &[Transaction], from: NaiveDate, to: NaiveDate) -> ReconciliationHistory {
    let mut entries: Vec<HistoryEntry> = all
        .iter()
        .filter(|t| matches!(t.kind(), EntryKind::Statement { .. }))
        .filter(|t| t.statement_date.is_some_and(|d| d >= from && d <= to))
        .map(|t| HistoryEntry {
            transaction_id: t.transaction_id.clone(),
            customer: t.customer.clone(),
            carrier: t.carrier.clone(),
            policy_number: t.policy_number.clone(),
            statement_date: t.statement_date,
            amount_paid: t.amount_paid.unwrap_or_default(),
            reconciliation_id: t.reconciliation_id.clone(),
        })
        .collect();
    entries.sort_by(|a, b| {
        b.statement_date
            .cmp(&a.statement_date)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });

    ReconciliationHistory {
        from,
        to,
        count: entries.len(),
        total_paid: entries.iter().map(|e| e.amount_paid).sum(),
        entries,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutstandingEntry {
    pub transaction_id: String,
    pub customer: Option<String>,
    pub carrier: Option<String>,
    pub policy_number: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub credit: Decimal,
    pub paid: Decimal,
    pub balance_due: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutstandingReport {
    pub count: usize,
    pub total_credit: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
    pub transactions: Vec<OutstandingEntry>,
}

/// Roots that still owe more than the settled tolerance, optionally
/// narrowed to one customer and/or carrier. Summary rows and overpaid
/// roots are left out.
pub fn outstanding_transactions(
    all: &[Transaction],
    balances: &BalanceCalculator,
    customer: Option<&str>,
    carrier: Option<&str>,
) -> OutstandingReport {
    let customer = normalize::norm_key(customer);
    let carrier = normalize::norm_key(carrier);

    let transactions: Vec<OutstandingEntry> = all
        .iter()
        .filter(|t| t.is_root() && !balances.is_summary_row(t))
        .filter(|t| customer.is_none() || normalize::norm_key(t.customer.as_deref()) == customer)
        .filter(|t| carrier.is_none() || normalize::norm_key(t.carrier.as_deref()) == carrier)
        .filter_map(|root| {
            let credit = balances.credit(root, all);
            let paid = balances.debit(root, all);
            let balance_due = credit - paid;
            (balance_due.is_sign_positive() && !balances.is_settled(balance_due)).then(|| {
                OutstandingEntry {
                    transaction_id: root.transaction_id.clone(),
                    customer: root.customer.clone(),
                    carrier: root.carrier.clone(),
                    policy_number: root.policy_number.clone(),
                    effective_date: root.effective_date,
                    credit,
                    paid,
                    balance_due,
                }
            })
        })
        .collect();

    OutstandingReport {
        count: transactions.len(),
        total_credit: transactions.iter().map(|t| t.credit).sum(),
        total_paid: transactions.iter().map(|t| t.paid).sum(),
        total_outstanding: transactions.iter().map(|t| t.balance_due).sum(),
        transactions,
    }
}
