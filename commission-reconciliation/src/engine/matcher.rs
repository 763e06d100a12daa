//! Statement row to root transaction matching.
//!
//! Strategies run in priority order and the first that yields a candidate
//! wins:
//! 1. exact key: policy number and effective date;
//! 2. fuzzy amount: customer and policy number, paid amount within a
//!    percentage of the candidate's outstanding balance;
//! 3. loose identity: customer and policy number, only when exactly one
//!    candidate exists.

use crate::engine::balance::BalanceCalculator;
use crate::engine::normalize;
use crate::models::{StatementRow, Transaction};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Fuzzy window as a percentage of outstanding balance.
    pub fuzzy_tolerance_pct: Decimal,
    pub settled_tolerance: Decimal,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_tolerance_pct: Decimal::from(5),
            settled_tolerance: Decimal::new(1, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    ExactKey,
    FuzzyAmount,
    LooseIdentity,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactKey => "exact_key",
            Self::FuzzyAmount => "fuzzy_amount",
            Self::LooseIdentity => "loose_identity",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched {
        transaction: Transaction,
        strategy: MatchStrategy,
    },
    /// More than one loose-identity candidate; needs a person to pick.
    Ambiguous { candidate_ids: Vec<String> },
    NoMatch,
}

impl MatchResult {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Matched { .. } => "matched",
            Self::Ambiguous { .. } => "ambiguous",
            Self::NoMatch => "no_match",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Matcher {
    config: MatcherConfig,
    balances: BalanceCalculator,
}

impl Matcher {
    pub fn new(config: MatcherConfig, balances: BalanceCalculator) -> Self {
        Self { config, balances }
    }

    /// Find the root transaction a statement row pays against.
    /// `transactions` is the persisted history for the row's policy (or
    /// customer); derived entries in it only feed balances.
    pub fn find_match(&self, row: &StatementRow, transactions: &[Transaction]) -> MatchResult {
        let Some(policy) = normalize::norm_key(row.policy_number.as_deref()) else {
            return MatchResult::NoMatch;
        };

        let policy_roots: Vec<&Transaction> = transactions
            .iter()
            .filter(|t| t.is_root())
            .filter(|t| normalize::norm_key(t.policy_number.as_deref()).as_deref() == Some(&policy))
            .collect();
        if policy_roots.is_empty() {
            return MatchResult::NoMatch;
        }

        if let Some(found) = self.exact_key(row, &policy_roots, transactions) {
            return matched(found, MatchStrategy::ExactKey);
        }

        let identity: Vec<&Transaction> = policy_roots
            .into_iter()
            .filter(|t| normalize::same_key(t.customer.as_deref(), row.customer.as_deref()))
            .collect();

        if let Some(found) = self.fuzzy_amount(row, &identity, transactions) {
            return matched(found, MatchStrategy::FuzzyAmount);
        }

        match identity.as_slice() {
            [] => MatchResult::NoMatch,
            [only] => matched(only, MatchStrategy::LooseIdentity),
            many => {
                let mut candidate_ids: Vec<String> =
                    many.iter().map(|t| t.transaction_id.clone()).collect();
                candidate_ids.sort();
                MatchResult::Ambiguous { candidate_ids }
            }
        }
    }

    /// Several roots on the same policy and date: the one with the most
    /// outstanding wins, then the lowest id.
    fn exact_key<'a>(
        &self,
        row: &StatementRow,
        roots: &[&'a Transaction],
        all: &[Transaction],
    ) -> Option<&'a Transaction> {
        let effective = row.effective_date?;
        roots
            .iter()
            .filter(|t| t.effective_date == Some(effective))
            .map(|t| (*t, self.balances.balance_due(t, all)))
            .min_by(|(a, a_bal), (b, b_bal)| {
                b_bal
                    .cmp(a_bal)
                    .then_with(|| a.transaction_id.cmp(&b.transaction_id))
            })
            .map(|(t, _)| t)
    }

    /// Closest outstanding balance inside the tolerance window, ties to the
    /// lowest id.
    fn fuzzy_amount<'a>(
        &self,
        row: &StatementRow,
        roots: &[&'a Transaction],
        all: &[Transaction],
    ) -> Option<&'a Transaction> {
        let paid = row.paid_amount?;
        roots
            .iter()
            .filter_map(|t| {
                let outstanding = self.balances.balance_due(t, all);
                let window = outstanding.abs() * self.config.fuzzy_tolerance_pct
                    / Decimal::ONE_HUNDRED;
                let diff = (paid - outstanding).abs();
                (outstanding > self.config.settled_tolerance && diff <= window)
                    .then_some((*t, diff))
            })
            .min_by(|(a, a_diff), (b, b_diff)| {
                a_diff
                    .cmp(b_diff)
                    .then_with(|| a.transaction_id.cmp(&b.transaction_id))
            })
            .map(|(t, _)| t)
    }
}

fn matched(transaction: &Transaction, strategy: MatchStrategy) -> MatchResult {
    MatchResult::Matched {
        transaction: transaction.clone(),
        strategy,
    }
}
