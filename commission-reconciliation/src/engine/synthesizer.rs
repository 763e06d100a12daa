//! Derivation of ledger entries from matched statement rows.

use crate::engine::ids;
use crate::engine::matcher::MatchResult;
use crate::error::ReconciliationError;
use crate::models::{BatchContext, StatementRow, Transaction};
use std::collections::HashSet;

pub const IMPORT_NOTE: &str = "Created from statement import";

/// What one statement row turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum Synthesized {
    /// A `-STMT-` entry against an existing root.
    Statement(Transaction),
    /// A new `-IMPORT` root plus its `-STMT-` entry.
    Import {
        root: Transaction,
        statement: Transaction,
    },
}

impl Synthesized {
    pub fn statement(&self) -> &Transaction {
        match self {
            Self::Statement(statement) | Self::Import { statement, .. } => statement,
        }
    }
}

/// Builds entries for one batch and hands out statement ids that do not
/// collide with ids already reserved.
#[derive(Debug)]
pub struct LedgerSynthesizer {
    context: BatchContext,
    create_missing_policies: bool,
    taken: HashSet<String>,
}

impl LedgerSynthesizer {
    pub fn new(context: BatchContext, create_missing_policies: bool) -> Self {
        Self {
            context,
            create_missing_policies,
            taken: HashSet::new(),
        }
    }

    /// Mark ids that belong to other batches so this batch picks the next
    /// ordinal instead of colliding. Entries from this batch are left out:
    /// re-deriving the same id is what makes a re-run detectable.
    pub fn reserve_existing<'a>(&mut self, existing: impl IntoIterator<Item = &'a Transaction>) {
        for tx in existing {
            if tx.reconciliation_id.as_deref() != Some(self.context.reconciliation_id.as_str()) {
                self.taken.insert(tx.transaction_id.clone());
            }
        }
    }

    /// `Ok(None)` for an unmatched row when policy creation is off or the
    /// row has no customer to found a policy on. Ambiguous rows are an
    /// `AmbiguousMatch` error and produce nothing.
    pub fn synthesize(
        &mut self,
        row: &StatementRow,
        match_result: &MatchResult,
    ) -> Result<Option<Synthesized>, ReconciliationError> {
        match match_result {
            MatchResult::Matched { transaction, .. } => {
                Ok(Some(Synthesized::Statement(self.statement_entry(row, transaction))))
            }
            MatchResult::Ambiguous { candidate_ids } => Err(ReconciliationError::AmbiguousMatch {
                row_number: row.row_number,
                candidate_ids: candidate_ids.clone(),
            }),
            MatchResult::NoMatch => {
                if !self.create_missing_policies || row.customer.is_none() {
                    return Ok(None);
                }
                let root = self.import_root(row);
                let statement = self.statement_entry(row, &root);
                Ok(Some(Synthesized::Import { root, statement }))
            }
        }
    }

    fn next_statement_id(&mut self, root_id: &str) -> String {
        let mut ordinal = 1;
        loop {
            let id = ids::statement_id(root_id, self.context.statement_date, ordinal);
            if self.taken.insert(id.clone()) {
                return id;
            }
            ordinal += 1;
        }
    }

    /// The root's identity is copied for display; the id prefix is the link.
    fn statement_entry(&mut self, row: &StatementRow, root: &Transaction) -> Transaction {
        Transaction {
            transaction_id: self.next_statement_id(&root.transaction_id),
            policy_number: root.policy_number.clone(),
            customer: root.customer.clone(),
            carrier: root.carrier.clone().or_else(|| self.context.carrier.clone()),
            mga: root.mga.clone().or_else(|| self.context.mga.clone()),
            transaction_type: root.transaction_type.clone(),
            effective_date: root.effective_date,
            amount_paid: row.paid_amount,
            statement_date: Some(self.context.statement_date),
            reconciliation_id: Some(self.context.reconciliation_id.clone()),
            ..Default::default()
        }
    }

    /// Import roots carry credit only; payment data lives on the `-STMT-`.
    fn import_root(&self, row: &StatementRow) -> Transaction {
        Transaction {
            transaction_id: ids::import_root_id(
                &self.context.reconciliation_id,
                row.customer.as_deref(),
                row.policy_number.as_deref(),
                row.effective_date,
            ),
            policy_number: row.policy_number.clone(),
            customer: row.customer.clone(),
            carrier: self.context.carrier.clone(),
            mga: self.context.mga.clone(),
            effective_date: row.effective_date,
            commission_due: row.commission_due.or(row.paid_amount),
            reconciliation_id: Some(self.context.reconciliation_id.clone()),
            notes: Some(IMPORT_NOTE.to_string()),
            ..Default::default()
        }
    }
}
