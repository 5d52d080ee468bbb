//! Record Projector
//!
//! Maps raw provider rows onto [`ValuationRecord`]. This is the only place
//! untyped rows are looked at; everything downstream sees the concrete type.
//! Rows without an identifier or a parseable valuation date cannot be keyed
//! and are dropped.

use serde_json::Value;
use tracing::{debug, warn};

use valuation_types::{Provider, ValuationRecord};

use crate::normalize::{normalize_identifier, parse_coupon, parse_date_value, parse_number};
use crate::remote::{ColumnCatalog, LogicalColumn, RemoteRow};

/// Project every keyable row; order is preserved
pub fn project_rows(
    provider: Provider,
    rows: &[RemoteRow],
    catalog: &ColumnCatalog,
) -> Vec<ValuationRecord> {
    let records: Vec<ValuationRecord> = rows
        .iter()
        .filter_map(|row| project_row(provider, row, catalog))
        .collect();

    let dropped = rows.len() - records.len();
    if dropped > 0 {
        warn!(
            provider = %provider,
            "Dropped {} of {} rows without identifier or valuation date",
            dropped,
            rows.len()
        );
    }
    debug!("Projected {} {} rows", records.len(), provider);
    records
}

/// Project one row, or `None` when it has no identity
pub fn project_row(
    provider: Provider,
    row: &RemoteRow,
    catalog: &ColumnCatalog,
) -> Option<ValuationRecord> {
    let field = |column: LogicalColumn| -> Option<&Value> {
        catalog
            .get(column)
            .and_then(|name| row.get(name))
            .filter(|v| !v.is_null())
    };
    let text = |column: LogicalColumn| field(column).and_then(value_text);
    let number = |column: LogicalColumn| field(column).and_then(parse_number);
    let date = |column: LogicalColumn| field(column).and_then(parse_date_value);

    let identifier = text(LogicalColumn::Identifier).and_then(|s| normalize_identifier(&s))?;
    let valuation_date = date(LogicalColumn::ValuationDate)?;

    let mut record = ValuationRecord::new(identifier, valuation_date, provider);
    record.mnemonic = text(LogicalColumn::Mnemonic).map(|s| s.to_uppercase());
    record.issuer = text(LogicalColumn::Issuer);
    record.instrument_type = text(LogicalColumn::InstrumentType);
    record.term = text(LogicalColumn::Term);
    record.clean_price = number(LogicalColumn::CleanPrice);
    record.dirty_price = number(LogicalColumn::DirtyPrice);
    record.yield_rate = number(LogicalColumn::Yield);
    record.duration = number(LogicalColumn::Duration);
    record.convexity = number(LogicalColumn::Convexity);
    record.maturity_date = date(LogicalColumn::MaturityDate);
    record.issue_date = date(LogicalColumn::IssueDate);
    record.face_value = number(LogicalColumn::FaceValue);
    record.coupon_rate = field(LogicalColumn::CouponRate).and_then(parse_coupon);
    record.coupon_frequency = text(LogicalColumn::CouponFrequency);
    record.source_file = text(LogicalColumn::SourceFile);
    Some(record)
}

fn value_text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn row(value: Value) -> RemoteRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_projects_heterogeneous_columns() {
        let raw = row(json!({
            "isin": " cob07cdopy71 ",
            "NEMOTECNICO": "cdtbgas0v",
            "EMISOR": "Banco Gas",
            "FECHA": "03/06/2025",
            "FECHA_VENCIMIENTO": "2027-08-30T00:00:00",
            "PRECIO_LIMPIO": "99,875",
            "TIR": 9.12,
            "TASA_FACIAL": "8.85%",
            "PLAZO": 730,
        }));
        let catalog = ColumnCatalog::resolve(&raw.keys().cloned().collect::<Vec<_>>());
        let record = project_row(Provider::PipLatam, &raw, &catalog).unwrap();

        assert_eq!(record.identifier, "COB07CDOPY71");
        assert_eq!(record.mnemonic.as_deref(), Some("CDTBGAS0V"));
        assert_eq!(record.valuation_date, NaiveDate::from_ymd_opt(2025, 6, 3).unwrap());
        assert_eq!(record.maturity_date, NaiveDate::from_ymd_opt(2027, 8, 30));
        assert_eq!(record.clean_price, Some(99.875));
        assert_eq!(record.yield_rate, Some(9.12));
        assert_eq!(record.coupon_rate, Some(8.85));
        assert_eq!(record.term.as_deref(), Some("730"));
        assert_eq!(record.provider, Provider::PipLatam);
    }

    #[test]
    fn test_unparseable_values_become_absent() {
        let raw = row(json!({
            "ISIN": "COB07CDOPY71",
            "FECHA_VALORACION": "2025-06-03",
            "PRECIO_LIMPIO": "n/a",
            "TASA_FACIAL": null,
        }));
        let catalog = ColumnCatalog::resolve(&raw.keys().cloned().collect::<Vec<_>>());
        let record = project_row(Provider::Precia, &raw, &catalog).unwrap();
        assert_eq!(record.clean_price, None);
        assert_eq!(record.coupon_rate, None);
    }

    #[test]
    fn test_rows_without_identity_are_dropped() {
        let rows = vec![
            row(json!({"ISIN": "COB07CDOPY71", "FECHA_VALORACION": "2025-06-03"})),
            row(json!({"ISIN": "", "FECHA_VALORACION": "2025-06-03"})),
            row(json!({"ISIN": "COB07CDOPY72", "FECHA_VALORACION": "not a date"})),
        ];
        let catalog = ColumnCatalog::resolve(&["ISIN", "FECHA_VALORACION"]);
        let records = project_rows(Provider::Precia, &rows, &catalog);
        assert_eq!(records.len(), 1);
    }
}
