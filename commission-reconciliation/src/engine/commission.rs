//! Agent commission rates and renewal-chain tracing.

use crate::engine::normalize;
use crate::models::{Transaction, TransactionType};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;

const NEW_BUSINESS_RATE: i64 = 50;
const RENEWAL_RATE: i64 = 25;

/// Agent rate in percent for a root transaction when none is stored.
pub fn commission_rate(root: &Transaction, all: &[Transaction]) -> Decimal {
    let rate = match root.transaction_type() {
        Some(TransactionType::New)
        | Some(TransactionType::NewBusinessSubmission)
        | Some(TransactionType::Stl)
        | Some(TransactionType::BrokerOfRecord) => NEW_BUSINESS_RATE,
        // Mid-term changes earn the new-business rate only in the first term.
        Some(TransactionType::Endorsement) | Some(TransactionType::PolicyChange) => {
            let origination = root
                .policy_origination_date
                .or_else(|| origination_date(root, all));
            if origination.is_some() && origination == root.effective_date {
                NEW_BUSINESS_RATE
            } else {
                RENEWAL_RATE
            }
        }
        Some(TransactionType::Renewal) | Some(TransactionType::Rewrite) => RENEWAL_RATE,
        Some(TransactionType::Cancellation) | Some(TransactionType::Cancelled) => 0,
        _ => RENEWAL_RATE,
    };
    Decimal::from(rate)
}

/// `premium × rate / 100 + broker_fee_agent_comm`, using the stored agent
/// rate when present.
pub fn estimate_commission(root: &Transaction, all: &[Transaction]) -> Decimal {
    let premium = root.premium.unwrap_or(Decimal::ZERO);
    let rate = root
        .agent_rate
        .unwrap_or_else(|| commission_rate(root, all));
    let broker_fee = root.broker_fee_agent_comm.unwrap_or(Decimal::ZERO);
    (premium * rate / Decimal::ONE_HUNDRED + broker_fee).round_dp(2)
}

/// Follow `prior_policy_number` links back through root transactions.
/// Returns the chain newest-first, starting with `root`; stops on cycles.
pub fn trace_renewal_chain<'a>(root: &'a Transaction, all: &'a [Transaction]) -> Vec<&'a Transaction> {
    let mut chain = vec![root];
    let mut seen: HashSet<&str> = HashSet::from([root.transaction_id.as_str()]);
    let mut current = root;

    while let Some(prior) = normalize::norm_key(current.prior_policy_number.as_deref()) {
        let mut terms: Vec<&Transaction> = all
            .iter()
            .filter(|t| t.is_root())
            .filter(|t| normalize::norm_key(t.policy_number.as_deref()).as_deref() == Some(&prior))
            .filter(|t| !seen.contains(t.transaction_id.as_str()))
            .collect();
        if terms.is_empty() {
            break;
        }
        terms.sort_by(|a, b| {
            a.effective_date
                .cmp(&b.effective_date)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        // Prefer the term the renewal names; else the latest earlier term.
        let next = current
            .original_effective_date
            .and_then(|d| terms.iter().find(|t| t.effective_date == Some(d)).copied())
            .or_else(|| {
                terms
                    .iter()
                    .rev()
                    .find(|t| match (t.effective_date, current.effective_date) {
                        (Some(prev), Some(cur)) => prev <= cur,
                        _ => true,
                    })
                    .copied()
            })
            .unwrap_or(terms[0]);

        seen.insert(next.transaction_id.as_str());
        chain.push(next);
        current = next;
    }

    chain
}

/// Date the policy was first written, taken from the oldest link of the
/// renewal chain and the earliest term recorded under that policy number.
pub fn origination_date(root: &Transaction, all: &[Transaction]) -> Option<NaiveDate> {
    let chain = trace_renewal_chain(root, all);
    let oldest = chain.last().copied().unwrap_or(root);
    let policy = normalize::norm_key(oldest.policy_number.as_deref());
    let first_term = all
        .iter()
        .filter(|t| t.is_root() && t.effective_date.is_some())
        .filter(|t| policy.is_some() && normalize::norm_key(t.policy_number.as_deref()) == policy)
        .min_by_key(|t| t.effective_date);

    oldest
        .policy_origination_date
        .or_else(|| first_term.and_then(|t| t.policy_origination_date))
        .or(oldest.original_effective_date)
        .or_else(|| first_term.and_then(|t| t.effective_date))
        .or(oldest.effective_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn root(id: &str, policy: &str, kind: &str, effective: Option<NaiveDate>) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            policy_number: Some(policy.to_string()),
            customer: Some("Acme Roofing".to_string()),
            transaction_type: Some(kind.to_string()),
            effective_date: effective,
            ..Default::default()
        }
    }

    #[test]
    fn rates_by_transaction_type() {
        let all = vec![];
        assert_eq!(commission_rate(&root("A", "P", "NEW", None), &all), Decimal::from(50));
        assert_eq!(commission_rate(&root("A", "P", "RWL", None), &all), Decimal::from(25));
        assert_eq!(commission_rate(&root("A", "P", "XCL", None), &all), Decimal::ZERO);
        assert_eq!(commission_rate(&root("A", "P", "PMT", None), &all), Decimal::from(25));
    }

    #[test]
    fn endorsement_in_first_term_earns_new_business_rate() {
        let new = Transaction {
            policy_origination_date: date(2024, 1, 15),
            ..root("NEW0001", "P-1", "NEW", date(2024, 1, 15))
        };
        let same_day = root("END0001", "P-1", "END", date(2024, 1, 15));
        let later = root("END0002", "P-1", "END", date(2024, 6, 1));
        let all = vec![new, same_day.clone(), later.clone()];

        assert_eq!(commission_rate(&same_day, &all), Decimal::from(50));
        assert_eq!(commission_rate(&later, &all), Decimal::from(25));
    }

    #[test]
    fn estimate_adds_broker_fee_commission() {
        let tx = Transaction {
            premium: Some(Decimal::from(1000)),
            broker_fee_agent_comm: Some(Decimal::from_str("12.50").unwrap()),
            ..root("NEW0001", "P-1", "NEW", None)
        };
        assert_eq!(
            estimate_commission(&tx, &[]),
            Decimal::from_str("512.50").unwrap()
        );

        let with_rate = Transaction {
            agent_rate: Some(Decimal::from(10)),
            ..tx
        };
        assert_eq!(
            estimate_commission(&with_rate, &[]),
            Decimal::from_str("112.50").unwrap()
        );
    }

    #[test]
    fn renewal_chain_walks_prior_policies_and_stops_on_cycles() {
        let first = Transaction {
            prior_policy_number: Some("P-3".to_string()),
            ..root("AAA1111", "P-1", "NEW", date(2022, 1, 1))
        };
        let second = Transaction {
            prior_policy_number: Some("P-1".to_string()),
            ..root("BBB2222", "P-2", "RWL", date(2023, 1, 1))
        };
        let third = Transaction {
            prior_policy_number: Some("p-2 ".to_string()),
            ..root("CCC3333", "P-3", "RWL", date(2024, 1, 1))
        };
        let all = vec![first, second, third.clone()];

        let chain: Vec<&str> = trace_renewal_chain(&third, &all)
            .iter()
            .map(|t| t.transaction_id.as_str())
            .collect();
        assert_eq!(chain, vec!["CCC3333", "BBB2222", "AAA1111"]);
        assert_eq!(origination_date(&third, &all), date(2022, 1, 1));
    }
}
