//! Batch reconciliation of one uploaded statement.

use crate::engine::balance::BalanceCalculator;
use crate::engine::matcher::{MatchResult, Matcher};
use crate::engine::normalize;
use crate::engine::synthesizer::{LedgerSynthesizer, Synthesized};
use crate::error::ReconciliationError;
use crate::models::{
    AmbiguousRow, BatchConfig, BatchContext, BatchResult, BatchState, EntryKind, OverpaidPolicy,
    RawStatementRow, StatementRow, Transaction, TransactionFilter, UnmatchedRow,
};
use crate::services::metrics::{record_row_outcome, record_statement_import, record_transaction_match};
use crate::services::store::{StoreError, TransactionStore};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Identity of a statement payment used to spot rows already applied on the
/// same statement date.
type SettledKey = (Option<String>, Option<String>, Decimal);

fn settled_key(
    policy_number: Option<&str>,
    customer: Option<&str>,
    amount: Decimal,
) -> SettledKey {
    let policy = normalize::norm_key(policy_number);
    let customer = if policy.is_none() {
        normalize::norm_key(customer)
    } else {
        None
    };
    (policy, customer, amount.normalize())
}

/// An entry produced during processing, waiting for commit.
#[derive(Debug)]
struct PendingEntry {
    row_number: usize,
    created: bool,
    synthesized: Synthesized,
}

/// One run of the reconciliation state machine:
/// `Pending -> Processing -> Committed | Aborted`.
pub struct ReconciliationSession {
    store: Arc<dyn TransactionStore>,
    matcher: Matcher,
    balances: BalanceCalculator,
    create_missing_policies: bool,
    context: BatchContext,
    state: BatchState,
}

impl ReconciliationSession {
    /// Allocate the batch id and fix the batch context.
    pub fn new(
        store: Arc<dyn TransactionStore>,
        config: &BatchConfig,
        matcher: Matcher,
        balances: BalanceCalculator,
    ) -> Self {
        Self {
            store,
            matcher,
            balances,
            create_missing_policies: config.create_missing_policies,
            context: BatchContext::from_config(config),
            state: BatchState::Pending,
        }
    }

    pub fn context(&self) -> &BatchContext {
        &self.context
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    fn transition(&mut self, to: BatchState) -> Result<(), ReconciliationError> {
        self.state = self.state.transition(to)?;
        Ok(())
    }

    /// Process every row in file order and commit the result as one write.
    ///
    /// Row-level problems are counted and never stop the batch. A store
    /// failure aborts it; the returned summary then carries `failure` and
    /// whatever the store reports as already persisted.
    #[instrument(
        skip(self, rows),
        fields(reconciliation_id = %self.context.reconciliation_id, rows = rows.len())
    )]
    pub async fn run(mut self, rows: Vec<RawStatementRow>) -> Result<BatchResult, ReconciliationError> {
        self.transition(BatchState::Processing)?;
        let mut result = BatchResult::new(&self.context);
        result.state = self.state;

        // Entries already claimed as settled by an earlier row of this run.
        let mut consumed: HashSet<String> = HashSet::new();

        let mut synth = LedgerSynthesizer::new(self.context.clone(), self.create_missing_policies);
        let mut pending: Vec<PendingEntry> = Vec::new();
        // Persisted history per touched root, for the overpayment check.
        let mut histories: HashMap<String, (Transaction, Vec<Transaction>)> = HashMap::new();

        for (index, raw) in rows.iter().enumerate() {
            let row_number = index + 1;

            let row = match StatementRow::from_raw(row_number, raw) {
                Ok(row) => row,
                Err(e) => {
                    warn!(row_number, error = %e, "Skipping invalid statement row");
                    result.invalid_rows += 1;
                    record_row_outcome("invalid");
                    continue;
                }
            };

            if row.is_empty() || row.is_totals_line() {
                result.skipped_empty += 1;
                record_row_outcome("skipped_empty");
                continue;
            }

            let Some(amount) = row.paid_amount else {
                warn!(row_number, "Skipping statement row without a paid amount");
                result.invalid_rows += 1;
                record_row_outcome("invalid");
                continue;
            };

            if let Some(row_date) = row.statement_date {
                if row_date != self.context.statement_date {
                    warn!(
                        row_number,
                        row_statement_date = %row_date,
                        batch_statement_date = %self.context.statement_date,
                        "Row statement date differs from batch date; using batch date"
                    );
                }
            }

            let candidates = match self.fetch_candidates(&row).await {
                Ok(candidates) => candidates,
                Err(e) => return self.abort(result, e, Vec::new()),
            };

            if let Some(entry) = self.find_settled(&row, amount, &candidates, &consumed) {
                debug!(
                    row_number,
                    transaction_id = %entry.transaction_id,
                    "Row already applied on this statement date"
                );
                consumed.insert(entry.transaction_id.clone());
                result.already_settled += 1;
                record_row_outcome("already_settled");
                continue;
            }
            synth.reserve_existing(candidates.iter().filter(|t| !t.is_root()));

            let match_result = self.matcher.find_match(&row, &candidates);
            let synthesized = match synth.synthesize(&row, &match_result) {
                Ok(Some(s)) => s,
                Ok(None) => {
                    result.unmatched += 1;
                    result.unmatched_rows.push(UnmatchedRow {
                        row_number,
                        customer: row.customer.clone(),
                        policy_number: row.policy_number.clone(),
                        paid_amount: row.paid_amount,
                    });
                    record_row_outcome("unmatched");
                    continue;
                }
                Err(ReconciliationError::AmbiguousMatch { candidate_ids, .. }) => {
                    warn!(row_number, candidates = ?candidate_ids, "Ambiguous statement row held for review");
                    result.ambiguous += 1;
                    result.ambiguous_rows.push(AmbiguousRow {
                        row_number,
                        customer: row.customer.clone(),
                        policy_number: row.policy_number.clone(),
                        paid_amount: row.paid_amount,
                        candidate_ids,
                    });
                    record_row_outcome("ambiguous");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let created = match &match_result {
                MatchResult::Matched { transaction, strategy } => {
                    info!(
                        row_number,
                        strategy = strategy.as_str(),
                        root_id = %transaction.transaction_id,
                        "Statement row matched"
                    );
                    record_transaction_match(strategy.as_str());
                    histories
                        .entry(transaction.transaction_id.clone())
                        .or_insert_with(|| (transaction.clone(), candidates.clone()));
                    result.matched += 1;
                    record_row_outcome("matched");
                    false
                }
                _ => {
                    if let Synthesized::Import { root, .. } = &synthesized {
                        info!(row_number, root_id = %root.transaction_id, "Import policy created");
                        histories
                            .entry(root.transaction_id.clone())
                            .or_insert_with(|| (root.clone(), Vec::new()));
                    }
                    result.created += 1;
                    record_row_outcome("created");
                    true
                }
            };

            result.total_paid += amount;
            pending.push(PendingEntry {
                row_number,
                created,
                synthesized,
            });
        }

        result.overpaid = self.overpaid_roots(&histories, &pending);
        for over in &result.overpaid {
            warn!(
                root_id = %over.transaction_id,
                balance = %over.balance,
                "Payments exceed commission credit"
            );
        }

        self.commit(result, pending).await
    }

    /// A persisted, unreversed statement entry for this statement date that
    /// carries the same payment as `row`, whichever batch wrote it.
    fn find_settled<'a>(
        &self,
        row: &StatementRow,
        amount: Decimal,
        history: &'a [Transaction],
        consumed: &HashSet<String>,
    ) -> Option<&'a Transaction> {
        let key = settled_key(row.policy_number.as_deref(), row.customer.as_deref(), amount);
        let reversed: HashSet<&str> = history
            .iter()
            .filter(|t| matches!(t.kind(), EntryKind::Void { .. }))
            .filter_map(|t| t.reverses_transaction_id.as_deref())
            .collect();

        history.iter().find(|t| {
            matches!(t.kind(), EntryKind::Statement { .. })
                && t.statement_date == Some(self.context.statement_date)
                && !reversed.contains(t.transaction_id.as_str())
                && !consumed.contains(&t.transaction_id)
                && row.effective_date.map_or(true, |d| t.effective_date == Some(d))
                && t.amount_paid.is_some_and(|paid| {
                    settled_key(t.policy_number.as_deref(), t.customer.as_deref(), paid) == key
                })
        })
    }

    async fn fetch_candidates(&self, row: &StatementRow) -> Result<Vec<Transaction>, StoreError> {
        if let Some(policy) = &row.policy_number {
            self.store.query(&TransactionFilter::by_policy(policy.clone())).await
        } else if let Some(customer) = &row.customer {
            self.store.query(&TransactionFilter::by_customer(customer.clone())).await
        } else {
            Ok(Vec::new())
        }
    }

    fn overpaid_roots(
        &self,
        histories: &HashMap<String, (Transaction, Vec<Transaction>)>,
        pending: &[PendingEntry],
    ) -> Vec<OverpaidPolicy> {
        let mut by_root: BTreeMap<&str, Vec<Transaction>> = BTreeMap::new();
        for entry in pending {
            let statement = entry.synthesized.statement();
            by_root
                .entry(statement.root_id())
                .or_default()
                .push(statement.clone());
        }

        by_root
            .into_iter()
            .filter_map(|(root_id, new_entries)| {
                let (root, history) = histories.get(root_id)?;
                let mut all = history.clone();
                if !all.iter().any(|t| t.transaction_id == root.transaction_id) {
                    all.push(root.clone());
                }
                all.extend(new_entries);
                self.balances.overpayment(root, &all)
            })
            .collect()
    }

    #[instrument(skip(self, result, pending), fields(reconciliation_id = %self.context.reconciliation_id))]
    async fn commit(
        mut self,
        mut result: BatchResult,
        pending: Vec<PendingEntry>,
    ) -> Result<BatchResult, ReconciliationError> {
        let mut records: Vec<Transaction> = Vec::new();
        let mut seen_roots: HashSet<String> = HashSet::new();
        for entry in &pending {
            if let Synthesized::Import { root, .. } = &entry.synthesized {
                if seen_roots.insert(root.transaction_id.clone()) {
                    records.push(root.clone());
                }
            }
        }
        records.extend(pending.iter().map(|e| e.synthesized.statement().clone()));

        if records.is_empty() {
            self.transition(BatchState::Committed)?;
            result.state = self.state;
            record_statement_import(self.state.as_str());
            info!("Nothing to commit");
            return Ok(result);
        }

        let report = match self.store.insert_many(&records).await {
            Ok(report) => report,
            Err(e) => {
                let persisted = match &e {
                    StoreError::WriteRejected { persisted, .. } => persisted.clone(),
                    StoreError::Unavailable(_) => Vec::new(),
                };
                return self.abort(result, e, persisted);
            }
        };

        // An id that is already present means the row was applied before.
        let conflicts: HashSet<&str> = report.conflicts.iter().map(String::as_str).collect();
        for entry in &pending {
            let statement = entry.synthesized.statement();
            if conflicts.contains(statement.transaction_id.as_str()) {
                warn!(
                    row_number = entry.row_number,
                    transaction_id = %statement.transaction_id,
                    "Statement entry already exists; counting row as already settled"
                );
                if entry.created {
                    result.created -= 1;
                } else {
                    result.matched -= 1;
                }
                result.already_settled += 1;
                result.total_paid -= statement.amount_paid.unwrap_or(Decimal::ZERO);
            }
        }

        self.transition(BatchState::Committed)?;
        result.state = self.state;
        result.committed_transaction_ids = report.inserted;
        record_statement_import(self.state.as_str());

        info!(
            matched = result.matched,
            created = result.created,
            skipped_empty = result.skipped_empty,
            invalid_rows = result.invalid_rows,
            ambiguous = result.ambiguous,
            already_settled = result.already_settled,
            unmatched = result.unmatched,
            total_paid = %result.total_paid,
            "Statement batch committed"
        );
        Ok(result)
    }

    fn abort(
        mut self,
        mut result: BatchResult,
        error: StoreError,
        persisted: Vec<String>,
    ) -> Result<BatchResult, ReconciliationError> {
        self.transition(BatchState::Aborted)?;
        let error = ReconciliationError::from(error);
        tracing::error!(
            reconciliation_id = %self.context.reconciliation_id,
            error = %error,
            persisted = persisted.len(),
            "Statement batch aborted"
        );
        result.state = self.state;
        result.failure = Some(error.to_string());
        result.committed_transaction_ids = persisted;
        record_statement_import(self.state.as_str());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_key_ignores_customer_when_policy_present() {
        let a = settled_key(Some("P-1"), Some("Acme"), Decimal::new(18000, 2));
        let b = settled_key(Some(" p-1"), Some("Other"), Decimal::from(180));
        assert_eq!(a, b);

        let c = settled_key(None, Some("Acme "), Decimal::from(5));
        assert_eq!(c, (None, Some("acme".to_string()), Decimal::from(5)));
    }
}
