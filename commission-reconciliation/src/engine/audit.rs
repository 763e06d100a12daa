//! Ledger consistency checks over the full transaction history.

use crate::engine::balance::BalanceCalculator;
use crate::models::{EntryKind, OverpaidPolicy, Transaction};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateMismatch {
    pub transaction_id: String,
    pub id_date: Option<NaiveDate>,
    pub statement_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub duplicate_ids: Vec<String>,
    /// `-IMPORT` roots that carry statement payment fields.
    pub contaminated_imports: Vec<String>,
    pub date_mismatches: Vec<DateMismatch>,
    /// Derived entries whose root id is not in the ledger.
    pub orphan_entries: Vec<String>,
    pub overpaid: Vec<OverpaidPolicy>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_ids.is_empty()
            && self.contaminated_imports.is_empty()
            && self.date_mismatches.is_empty()
            && self.orphan_entries.is_empty()
            && self.overpaid.is_empty()
    }
}

pub fn audit_ledger(all: &[Transaction], balances: &BalanceCalculator) -> AuditReport {
    let mut report = AuditReport::default();

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for tx in all {
        *counts.entry(tx.transaction_id.as_str()).or_default() += 1;
    }
    report.duplicate_ids = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id.to_string())
        .collect();

    let roots: HashSet<&str> = all
        .iter()
        .filter(|t| t.is_root())
        .map(|t| t.transaction_id.as_str())
        .collect();

    for tx in all {
        match tx.kind() {
            EntryKind::Import => {
                if tx.amount_paid.is_some() || tx.statement_date.is_some() {
                    report.contaminated_imports.push(tx.transaction_id.clone());
                }
            }
            EntryKind::Root => {}
            kind => {
                if let Some(id_date) = kind.embedded_date() {
                    if tx.statement_date != Some(id_date) {
                        report.date_mismatches.push(DateMismatch {
                            transaction_id: tx.transaction_id.clone(),
                            id_date: Some(id_date),
                            statement_date: tx.statement_date,
                        });
                    }
                }
                if !roots.contains(tx.root_id()) {
                    report.orphan_entries.push(tx.transaction_id.clone());
                }
            }
        }
    }

    let mut seen = HashSet::new();
    report.overpaid = all
        .iter()
        .filter(|t| t.is_root() && seen.insert(t.transaction_id.as_str()))
        .filter_map(|root| balances.overpayment(root, all))
        .collect();

    report
}
