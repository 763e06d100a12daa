//! CSV statement intake.

use crate::error::ReconciliationError;
use crate::models::{ColumnMapping, RawStatementRow};
use serde_json::Value;

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    let wanted = name.trim();
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(wanted))
}

/// Read a CSV upload into raw rows using the header names in `mapping`.
///
/// Customer, policy number and paid amount columns must exist; the date and
/// commission columns are optional. Blank lines are dropped by the reader.
pub fn parse_statement_csv(
    bytes: &[u8],
    mapping: &ColumnMapping,
) -> Result<Vec<RawStatementRow>, ReconciliationError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ReconciliationError::MalformedFile("file is not valid UTF-8".to_string()))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ReconciliationError::MalformedFile(format!("unreadable header row: {}", e)))?
        .clone();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ReconciliationError::MalformedFile(
            "missing header row".to_string(),
        ));
    }

    let required = |name: &str| {
        find_column(&headers, name).ok_or_else(|| {
            ReconciliationError::MalformedFile(format!("column '{}' not found", name))
        })
    };
    let customer = required(&mapping.customer)?;
    let policy_number = required(&mapping.policy_number)?;
    let paid_amount = required(&mapping.paid_amount)?;
    let effective_date = find_column(&headers, &mapping.effective_date);
    let statement_date = find_column(&headers, &mapping.statement_date);
    let commission_due = find_column(&headers, &mapping.commission_due);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            ReconciliationError::MalformedFile(format!("record {}: {}", index + 1, e))
        })?;
        let cell = |column: Option<usize>| {
            column
                .and_then(|i| record.get(i))
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
        };
        rows.push(RawStatementRow {
            customer: cell(Some(customer)),
            policy_number: cell(Some(policy_number)),
            effective_date: cell(effective_date),
            paid_amount: cell(Some(paid_amount)),
            statement_date: cell(statement_date),
            commission_due: cell(commission_due),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_rows_with_default_headers() {
        let csv = "Customer,Policy Number,Effective Date,Agent Paid Amount (STMT),STMT DATE\n\
                   Starr Custom Tinting,1AA338948,01/15/2024,$180.00,01/31/2024\n\
                   ,,,,\n\
                   Grand Total,,,180.00,\n";
        let rows = parse_statement_csv(csv.as_bytes(), &ColumnMapping::default()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].customer, Some(json!("Starr Custom Tinting")));
        assert_eq!(rows[0].paid_amount, Some(json!("$180.00")));
        assert_eq!(rows[0].commission_due, None);
        assert_eq!(rows[1].customer, None);
    }

    #[test]
    fn custom_mapping_is_case_insensitive() {
        let mapping = ColumnMapping {
            customer: "insured".to_string(),
            policy_number: "policy".to_string(),
            paid_amount: "commission paid".to_string(),
            ..Default::default()
        };
        let csv = "Insured,Policy,Commission Paid\nAcme,P-1,12.50\n";
        let rows = parse_statement_csv(csv.as_bytes(), &mapping).unwrap();
        assert_eq!(rows[0].policy_number, Some(json!("P-1")));
    }

    #[test]
    fn missing_required_column_is_malformed() {
        let csv = "Customer,Premium\nAcme,100\n";
        let err = parse_statement_csv(csv.as_bytes(), &ColumnMapping::default()).unwrap_err();
        assert!(matches!(err, ReconciliationError::MalformedFile(_)));
    }

    #[test]
    fn binary_upload_is_malformed() {
        let err = parse_statement_csv(&[0xff, 0xfe, 0x00], &ColumnMapping::default()).unwrap_err();
        assert!(matches!(err, ReconciliationError::MalformedFile(_)));
    }
}
