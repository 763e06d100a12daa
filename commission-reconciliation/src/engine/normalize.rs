//! Cleaning of spreadsheet-sourced values.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

// Two-digit years first: `%Y` would read "24" as year 24.
const DATE_FORMATS: [&str; 4] = ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d"];

/// Stringified missing values a spreadsheet export leaves behind.
pub fn is_missing(s: &str) -> bool {
    let s = s.trim();
    s.is_empty()
        || s.eq_ignore_ascii_case("nan")
        || s.eq_ignore_ascii_case("none")
        || s.eq_ignore_ascii_case("null")
}

/// Trimmed text, or `None` for blanks and sentinels.
pub fn clean_text(s: Option<&str>) -> Option<String> {
    s.filter(|s| !is_missing(s)).map(|s| s.trim().to_string())
}

/// Comparison key: cleaned and lower-cased.
pub fn norm_key(s: Option<&str>) -> Option<String> {
    clean_text(s).map(|s| s.to_lowercase())
}

/// Case-insensitive equality of two optional fields; two absent values are
/// not equal.
pub fn same_key(a: Option<&str>, b: Option<&str>) -> bool {
    match (norm_key(a), norm_key(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub fn text_from_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => clean_text(Some(s)),
        Value::Number(n) => {
            // Policy numbers typed as numbers come through as 12345.0.
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 {
                        format!("{:.0}", f)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a money cell: `$`, thousands separators and `(12.50)` negatives.
pub fn parse_amount(s: &str) -> Result<Option<Decimal>, String> {
    if is_missing(s) {
        return Ok(None);
    }
    let mut text: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let negative = text.starts_with('(') && text.ends_with(')');
    if negative {
        text = text[1..text.len() - 1].to_string();
    }
    let amount =
        Decimal::from_str(&text).map_err(|_| format!("'{}' is not an amount", s.trim()))?;
    Ok(Some(if negative { -amount } else { amount }))
}

pub fn amount_from_value(value: Option<&Value>) -> Result<Option<Decimal>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_amount(s),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .map(Some)
            .map_err(|_| format!("'{}' is not an amount", n)),
        Some(other) => Err(format!("unexpected value {}", other)),
    }
}

/// Parse the date layouts statements use; a trailing time is dropped.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

pub fn date_from_value(value: Option<&Value>) -> Result<Option<NaiveDate>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if is_missing(s) => Ok(None),
        Some(Value::String(s)) => parse_date(s)
            .map(Some)
            .ok_or_else(|| format!("'{}' is not a date", s.trim())),
        Some(other) => Err(format!("unexpected value {}", other)),
    }
}
