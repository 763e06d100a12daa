//! Transaction and batch identifiers.
//!
//! Root ids are 7 characters (three letters, three digits and one extra
//! letter-or-digit, shuffled). Derived ids append a suffix to the root:
//! `-STMT-{YYYYMMDD}[-n]`, `-VOID-{YYYYMMDD}-{NONCE}` or `-ADJ-...`.

use crate::engine::normalize;
use crate::models::EntryKind;
use chrono::NaiveDate;
use rand::Rng;
use sha2::{Digest, Sha256};

pub const STMT_MARKER: &str = "-STMT-";
pub const VOID_MARKER: &str = "-VOID-";
pub const ADJ_MARKER: &str = "-ADJ-";
pub const IMPORT_SUFFIX: &str = "-IMPORT";
pub const DEFAULT_PREFIX: &str = "STMT";

const ID_DATE_FORMAT: &str = "%Y%m%d";
const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Build a root code from 32 seed bytes.
fn root_code(seed: &[u8; 32]) -> String {
    let mut chars = [
        LETTERS[seed[0] as usize % LETTERS.len()],
        LETTERS[seed[1] as usize % LETTERS.len()],
        LETTERS[seed[2] as usize % LETTERS.len()],
        DIGITS[seed[3] as usize % DIGITS.len()],
        DIGITS[seed[4] as usize % DIGITS.len()],
        DIGITS[seed[5] as usize % DIGITS.len()],
        ALNUM[seed[6] as usize % ALNUM.len()],
    ];
    // Fisher-Yates driven by the rest of the seed.
    for i in (1..chars.len()).rev() {
        let j = seed[7 + i] as usize % (i + 1);
        chars.swap(i, j);
    }
    chars.iter().map(|&b| b as char).collect()
}

/// Fresh random root id.
pub fn generate_root_id() -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill(&mut seed);
    root_code(&seed)
}

/// Root id for a policy first seen on a statement. Derived from the batch
/// and the row identity so a re-run allocates the same id.
pub fn import_root_id(
    reconciliation_id: &str,
    customer: Option<&str>,
    policy_number: Option<&str>,
    effective_date: Option<NaiveDate>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reconciliation_id.as_bytes());
    hasher.update(b"|");
    hasher.update(normalize::norm_key(customer).unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(normalize::norm_key(policy_number).unwrap_or_default().as_bytes());
    hasher.update(b"|");
    if let Some(date) = effective_date {
        hasher.update(date.format(ID_DATE_FORMAT).to_string().as_bytes());
    }
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&hasher.finalize());
    format!("{}{}", root_code(&seed), IMPORT_SUFFIX)
}

/// `{root}-STMT-{YYYYMMDD}`, with `-{ordinal}` for the second and later
/// entries against the same root on the same date.
pub fn statement_id(root_id: &str, statement_date: NaiveDate, ordinal: usize) -> String {
    let base = format!(
        "{}{}{}",
        root_id,
        STMT_MARKER,
        statement_date.format(ID_DATE_FORMAT)
    );
    if ordinal <= 1 {
        base
    } else {
        format!("{}-{}", base, ordinal)
    }
}

pub fn void_id(root_id: &str, void_date: NaiveDate, nonce: &str) -> String {
    format!(
        "{}{}{}-{}",
        root_id,
        VOID_MARKER,
        void_date.format(ID_DATE_FORMAT),
        nonce
    )
}

/// Eight upper-case hex characters.
pub fn generate_nonce() -> String {
    format!("{:08X}", rand::thread_rng().gen::<u32>())
}

/// `{PREFIX}-RECON-{YYYYMMDD}`; the prefix is upper-cased with whitespace
/// removed and defaults to `STMT`.
pub fn reconciliation_id(prefix: &str, statement_date: NaiveDate) -> String {
    let prefix: String = prefix
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let prefix = if prefix.is_empty() {
        DEFAULT_PREFIX.to_string()
    } else {
        prefix
    };
    format!("{}-RECON-{}", prefix, statement_date.format(ID_DATE_FORMAT))
}

pub fn void_batch_id(void_date: NaiveDate, nonce: &str) -> String {
    format!("VOID-IMPORT-{}-{}", void_date.format(ID_DATE_FORMAT), nonce)
}

/// The root part of any id.
pub fn root_id_of(transaction_id: &str) -> &str {
    [STMT_MARKER, VOID_MARKER, ADJ_MARKER]
        .iter()
        .filter_map(|m| transaction_id.find(m))
        .min()
        .map_or(transaction_id, |idx| &transaction_id[..idx])
}

fn date_after(transaction_id: &str, marker: &str) -> (Option<NaiveDate>, Option<String>) {
    let Some(idx) = transaction_id.find(marker) else {
        return (None, None);
    };
    let rest = &transaction_id[idx + marker.len()..];
    let mut parts = rest.splitn(2, '-');
    let date = parts
        .next()
        .and_then(|d| NaiveDate::parse_from_str(d, ID_DATE_FORMAT).ok());
    let tail = parts.next().map(str::to_string);
    (date, tail)
}

pub fn entry_kind(transaction_id: &str) -> EntryKind {
    let root = root_id_of(transaction_id);
    if root.len() == transaction_id.len() {
        return if transaction_id.ends_with(IMPORT_SUFFIX) {
            EntryKind::Import
        } else {
            EntryKind::Root
        };
    }
    let suffix = &transaction_id[root.len()..];
    if suffix.starts_with(STMT_MARKER) {
        let (date, _) = date_after(suffix, STMT_MARKER);
        EntryKind::Statement { date }
    } else if suffix.starts_with(VOID_MARKER) {
        let (date, nonce) = date_after(suffix, VOID_MARKER);
        EntryKind::Void { date, nonce }
    } else {
        EntryKind::Adjustment
    }
}
