//! Outstanding commission per root transaction and across the portfolio.

use crate::engine::{commission, normalize};
use crate::models::{OverpaidPolicy, Transaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct BalanceConfig {
    /// Portfolio aggregate that a totals row would carry as its commission.
    pub known_total: Option<Decimal>,
    pub settled_tolerance: Decimal,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            known_total: None,
            settled_tolerance: default_settled_tolerance(),
        }
    }
}

pub fn default_settled_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_credit: Decimal,
    pub total_debit: Decimal,
    pub total_outstanding: Decimal,
    pub outstanding_policies: usize,
    pub settled_policies: usize,
    pub overpaid_policies: usize,
    /// Root ids left out as totals/summary rows.
    pub excluded_rows: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerLine {
    pub transaction_id: String,
    pub kind: &'static str,
    pub statement_date: Option<NaiveDate>,
    pub credit: Decimal,
    pub debit: Decimal,
    pub running_balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyLedger {
    pub transaction_id: String,
    pub policy_number: Option<String>,
    pub customer: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub credit: Decimal,
    pub debit: Decimal,
    pub balance: Decimal,
    pub settled: bool,
    pub lines: Vec<LedgerLine>,
}

/// Read-time balance computation. Holds no state beyond its config.
#[derive(Debug, Clone, Default)]
pub struct BalanceCalculator {
    config: BalanceConfig,
}

impl BalanceCalculator {
    pub fn new(config: BalanceConfig) -> Self {
        Self { config }
    }

    pub fn settled_tolerance(&self) -> Decimal {
        self.config.settled_tolerance
    }

    /// Heuristic for a totals line that was stored as a transaction: no
    /// usable customer, a customer reading "total", or a commission exactly
    /// equal to the known portfolio aggregate.
    pub fn is_summary_row(&self, tx: &Transaction) -> bool {
        is_summary_row(tx, self.config.known_total)
    }

    /// Commission owed by a root: the stored value, else the estimate.
    /// Summary rows owe nothing.
    pub fn credit(&self, root: &Transaction, all: &[Transaction]) -> Decimal {
        if self.is_summary_row(root) {
            return Decimal::ZERO;
        }
        match root.commission_due {
            Some(due) if !due.is_zero() => due,
            _ => commission::estimate_commission(root, all),
        }
    }

    /// Signed sum of statement and void payments recorded against the root.
    pub fn debit(&self, root: &Transaction, all: &[Transaction]) -> Decimal {
        payments_for(root, all)
            .filter_map(|t| t.amount_paid)
            .sum()
    }

    pub fn balance_due(&self, root: &Transaction, all: &[Transaction]) -> Decimal {
        self.credit(root, all) - self.debit(root, all)
    }

    pub fn is_settled(&self, balance: Decimal) -> bool {
        balance.abs() < self.config.settled_tolerance
    }

    /// `Some` when payments exceed credit by more than the tolerance.
    pub fn overpayment(&self, root: &Transaction, all: &[Transaction]) -> Option<OverpaidPolicy> {
        let credit = self.credit(root, all);
        let paid = self.debit(root, all);
        let balance = credit - paid;
        (balance < -self.config.settled_tolerance).then(|| OverpaidPolicy {
            transaction_id: root.transaction_id.clone(),
            policy_number: root.policy_number.clone(),
            credit,
            paid,
            balance,
        })
    }

    pub fn portfolio_summary(&self, all: &[Transaction]) -> PortfolioSummary {
        let roots: Vec<&Transaction> = all.iter().filter(|t| t.is_root()).collect();
        let mut excluded: Vec<String> = Vec::new();
        let mut eligible: Vec<(&Transaction, Decimal)> = Vec::new();

        for root in roots {
            if self.is_summary_row(root) {
                excluded.push(root.transaction_id.clone());
            } else {
                eligible.push((root, self.credit(root, all)));
            }
        }

        // Without a configured aggregate, a row carrying the sum of every
        // other row is a totals row.
        if self.config.known_total.is_none() && eligible.len() >= 3 {
            let sum: Decimal = eligible.iter().map(|(_, c)| *c).sum();
            let totals_row = eligible
                .iter()
                .filter(|(_, credit)| !credit.is_zero() && *credit * Decimal::TWO == sum)
                .map(|(root, _)| root.transaction_id.clone())
                .min();
            if let Some(id) = totals_row {
                eligible.retain(|(root, _)| root.transaction_id != id);
                excluded.push(id);
            }
        }

        let mut summary = PortfolioSummary {
            total_credit: Decimal::ZERO,
            total_debit: Decimal::ZERO,
            total_outstanding: Decimal::ZERO,
            outstanding_policies: 0,
            settled_policies: 0,
            overpaid_policies: 0,
            excluded_rows: Vec::new(),
        };

        for (root, credit) in eligible {
            let debit = self.debit(root, all);
            let balance = credit - debit;
            summary.total_credit += credit;
            summary.total_debit += debit;
            if self.is_settled(balance) {
                summary.settled_policies += 1;
            } else if balance > Decimal::ZERO {
                summary.outstanding_policies += 1;
                summary.total_outstanding += balance;
            } else {
                summary.overpaid_policies += 1;
            }
        }

        excluded.sort();
        summary.excluded_rows = excluded;
        summary
    }

    /// Credit line followed by every payment line in statement-date order.
    pub fn policy_ledger(&self, root: &Transaction, all: &[Transaction]) -> PolicyLedger {
        let credit = self.credit(root, all);
        let mut lines = vec![LedgerLine {
            transaction_id: root.transaction_id.clone(),
            kind: root.kind().as_str(),
            statement_date: root.effective_date,
            credit,
            debit: Decimal::ZERO,
            running_balance: credit,
        }];

        let mut payments: Vec<&Transaction> = payments_for(root, all).collect();
        payments.sort_by(|a, b| {
            a.statement_date
                .cmp(&b.statement_date)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });

        let mut running = credit;
        let mut debit = Decimal::ZERO;
        for payment in payments {
            let amount = payment.amount_paid.unwrap_or(Decimal::ZERO);
            running -= amount;
            debit += amount;
            lines.push(LedgerLine {
                transaction_id: payment.transaction_id.clone(),
                kind: payment.kind().as_str(),
                statement_date: payment.statement_date,
                credit: Decimal::ZERO,
                debit: amount,
                running_balance: running,
            });
        }

        PolicyLedger {
            transaction_id: root.transaction_id.clone(),
            policy_number: root.policy_number.clone(),
            customer: root.customer.clone(),
            effective_date: root.effective_date,
            credit,
            debit,
            balance: running,
            settled: self.is_settled(running),
            lines,
        }
    }
}

pub fn is_summary_row(tx: &Transaction, known_total: Option<Decimal>) -> bool {
    let customer_is_total = match normalize::norm_key(tx.customer.as_deref()) {
        None => true,
        Some(c) => c.contains("total"),
    };
    let matches_known_total = match (known_total, tx.commission_due) {
        (Some(total), Some(due)) => !total.is_zero() && due == total,
        _ => false,
    };
    customer_is_total || matches_known_total
}

/// Payments against a root: entries on the same policy term, or, for a root
/// without a policy number, entries whose id carries the root's id.
fn payments_for<'a>(
    root: &'a Transaction,
    all: &'a [Transaction],
) -> impl Iterator<Item = &'a Transaction> + 'a {
    let policy = normalize::norm_key(root.policy_number.as_deref());
    all.iter().filter(move |t| {
        t.is_payment_entry()
            && match &policy {
                Some(policy) => {
                    t.effective_date == root.effective_date
                        && normalize::norm_key(t.policy_number.as_deref()).as_ref() == Some(policy)
                }
                None => t.root_id() == root.transaction_id,
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn root(id: &str, customer: Option<&str>, policy: &str, due: &str) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            customer: customer.map(str::to_string),
            policy_number: Some(policy.to_string()),
            effective_date: date(2024, 1, 15),
            transaction_type: Some("NEW".to_string()),
            commission_due: Some(dec(due)),
            ..Default::default()
        }
    }

    fn payment(id: &str, policy: &str, amount: &str, on: Option<NaiveDate>) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            policy_number: Some(policy.to_string()),
            effective_date: date(2024, 1, 15),
            amount_paid: Some(dec(amount)),
            statement_date: on,
            ..Default::default()
        }
    }

    #[test]
    fn balance_subtracts_statement_and_void_entries() {
        let calc = BalanceCalculator::default();
        let r = root("ABC123D", Some("Starr Custom Tinting"), "1AA338948", "180.00");
        let all = vec![
            r.clone(),
            payment("ABC123D-STMT-20240131", "1aa338948", "100.00", date(2024, 1, 31)),
            payment("ABC123D-VOID-20240301-0A1B2C3D", "1AA338948", "-100.00", date(2024, 3, 1)),
            payment("ABC123D-STMT-20240331", "1AA338948", "80.00", date(2024, 3, 31)),
            // Adjustments are not payments.
            payment("ABC123D-ADJ-20240331", "1AA338948", "5.00", date(2024, 3, 31)),
        ];
        assert_eq!(calc.balance_due(&r, &all), dec("100.00"));
        assert!(!calc.is_settled(calc.balance_due(&r, &all)));
    }

    #[test]
    fn payments_on_other_terms_do_not_count() {
        let calc = BalanceCalculator::default();
        let r = root("ABC123D", Some("Acme"), "P-1", "100");
        let mut other_term = payment("ZZZ999Z-STMT-20240131", "P-1", "40", date(2024, 1, 31));
        other_term.effective_date = date(2025, 1, 15);
        assert_eq!(calc.balance_due(&r, &[r.clone(), other_term]), dec("100"));
    }

    #[test]
    fn root_without_policy_links_payments_by_id() {
        let calc = BalanceCalculator::default();
        let r = Transaction {
            transaction_id: "K7Q2M9X-IMPORT".to_string(),
            customer: Some("Delta Auto".to_string()),
            commission_due: Some(dec("310.25")),
            ..Default::default()
        };
        let own = Transaction {
            transaction_id: "K7Q2M9X-IMPORT-STMT-20240131".to_string(),
            customer: Some("Delta Auto".to_string()),
            amount_paid: Some(dec("310.25")),
            statement_date: date(2024, 1, 31),
            ..Default::default()
        };
        let stranger = Transaction {
            transaction_id: "ZZZ999Z-STMT-20240131".to_string(),
            ..own.clone()
        };
        let all = vec![r.clone(), own, stranger];

        assert_eq!(calc.debit(&r, &all), dec("310.25"));
        assert!(calc.is_settled(calc.balance_due(&r, &all)));
    }

    #[test]
    fn zero_commission_falls_back_to_estimate() {
        let calc = BalanceCalculator::default();
        let r = Transaction {
            commission_due: Some(Decimal::ZERO),
            premium: Some(dec("400")),
            ..root("ABC123D", Some("Acme"), "P-1", "0")
        };
        assert_eq!(calc.credit(&r, &[]), dec("200"));
    }

    #[test]
    fn known_total_row_is_excluded_from_portfolio() {
        let calc = BalanceCalculator::new(BalanceConfig {
            known_total: Some(dec("300")),
            settled_tolerance: default_settled_tolerance(),
        });
        let all = vec![
            root("AAA1111", Some("Acme"), "P-1", "100"),
            root("BBB2222", Some("Birch"), "P-2", "200"),
            root("TOT0000", None, "", "300"),
        ];
        assert!(calc.is_summary_row(&all[2]));
        assert_eq!(calc.credit(&all[2], &all), Decimal::ZERO);

        let summary = calc.portfolio_summary(&all);
        assert_eq!(summary.total_credit, dec("300"));
        assert_eq!(summary.excluded_rows, vec!["TOT0000".to_string()]);
        assert_eq!(summary.outstanding_policies, 2);
    }

    #[test]
    fn computed_totals_row_is_excluded_without_known_total() {
        let calc = BalanceCalculator::default();
        let all = vec![
            root("AAA1111", Some("Acme"), "P-1", "100"),
            root("BBB2222", Some("Birch"), "P-2", "200"),
            root("CCC3333", Some("Cedar"), "P-3", "50"),
            root("SUM0000", Some("Agency"), "P-4", "350"),
        ];
        let summary = calc.portfolio_summary(&all);
        assert_eq!(summary.excluded_rows, vec!["SUM0000".to_string()]);
        assert_eq!(summary.total_credit, dec("350"));
    }

    #[test]
    fn ledger_runs_balance_in_statement_order() {
        let calc = BalanceCalculator::default();
        let r = root("ABC123D", Some("Acme"), "P-1", "180");
        let all = vec![
            r.clone(),
            payment("ABC123D-STMT-20240331", "P-1", "80", date(2024, 3, 31)),
            payment("ABC123D-STMT-20240131", "P-1", "100", date(2024, 1, 31)),
        ];
        let ledger = calc.policy_ledger(&r, &all);
        let running: Vec<Decimal> = ledger.lines.iter().map(|l| l.running_balance).collect();
        assert_eq!(running, vec![dec("180"), dec("80"), dec("0")]);
        assert!(ledger.settled);
        assert_eq!(ledger.lines[1].transaction_id, "ABC123D-STMT-20240131");
    }

    #[test]
    fn overpayment_detected_beyond_tolerance() {
        let calc = BalanceCalculator::default();
        let r = root("ABC123D", Some("Acme"), "P-1", "100");
        let all = vec![
            r.clone(),
            payment("ABC123D-STMT-20240131", "P-1", "100.005", date(2024, 1, 31)),
        ];
        assert!(calc.overpayment(&r, &all).is_none());

        let all = vec![
            r.clone(),
            payment("ABC123D-STMT-20240131", "P-1", "120", date(2024, 1, 31)),
        ];
        let over = calc.overpayment(&r, &all).unwrap();
        assert_eq!(over.balance, dec("-20"));
    }
}
