//! Logical columns and name probing for the provider tables
//!
//! The two provider tables do not agree on column names (`ISIN` vs
//! `ISIN_CODIGO`, upper vs lower case). Each logical column carries an ordered
//! list of candidate names; a [`ColumnCatalog`] picks the first candidate that
//! exists in a probed table, exact match first, then case-insensitive.
//!
//! A probe also samples one value per column. The sample decides whether a
//! range filter can be pushed to the remote side: a coupon stored as
//! `"8,85%"` or a maturity stored as `"30/08/2027"` does not order correctly
//! as text, so those columns are only filtered after projection.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A column concept independent of any one table's naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalColumn {
    Identifier,
    Mnemonic,
    Issuer,
    InstrumentType,
    Term,
    CleanPrice,
    DirtyPrice,
    Yield,
    Duration,
    Convexity,
    ValuationDate,
    MaturityDate,
    IssueDate,
    FaceValue,
    CouponRate,
    CouponFrequency,
    SourceFile,
}

impl LogicalColumn {
    pub const ALL: [LogicalColumn; 17] = [
        LogicalColumn::Identifier,
        LogicalColumn::Mnemonic,
        LogicalColumn::Issuer,
        LogicalColumn::InstrumentType,
        LogicalColumn::Term,
        LogicalColumn::CleanPrice,
        LogicalColumn::DirtyPrice,
        LogicalColumn::Yield,
        LogicalColumn::Duration,
        LogicalColumn::Convexity,
        LogicalColumn::ValuationDate,
        LogicalColumn::MaturityDate,
        LogicalColumn::IssueDate,
        LogicalColumn::FaceValue,
        LogicalColumn::CouponRate,
        LogicalColumn::CouponFrequency,
        LogicalColumn::SourceFile,
    ];

    /// Candidate physical names, in preference order
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            LogicalColumn::Identifier => &["ISIN", "isin", "ISIN_CODIGO", "codigo_isin"],
            LogicalColumn::Mnemonic => &["NEMOTECNICO", "nemotecnico", "NEMO", "MNEMONICO"],
            LogicalColumn::Issuer => &["EMISOR", "emisor", "NOMBRE_EMISOR"],
            LogicalColumn::InstrumentType => {
                &["TIPO_INSTRUMENTO", "tipo_instrumento", "TIPO", "tipo"]
            }
            LogicalColumn::Term => &["PLAZO", "plazo"],
            LogicalColumn::CleanPrice => &["PRECIO_LIMPIO", "precio_limpio"],
            LogicalColumn::DirtyPrice => &["PRECIO_SUCIO", "precio_sucio"],
            LogicalColumn::Yield => &["TIR", "tir", "TASA", "tasa", "RENDIMIENTO"],
            LogicalColumn::Duration => &["DURACION", "duracion", "DURACION_MODIFICADA"],
            LogicalColumn::Convexity => &["CONVEXIDAD", "convexidad"],
            LogicalColumn::ValuationDate => {
                &["FECHA_VALORACION", "fecha_valoracion", "FECHA", "fecha"]
            }
            LogicalColumn::MaturityDate => &["FECHA_VENCIMIENTO", "fecha_vencimiento"],
            LogicalColumn::IssueDate => &["FECHA_EMISION", "fecha_emision"],
            LogicalColumn::FaceValue => &["VALOR_NOMINAL", "valor_nominal"],
            LogicalColumn::CouponRate => &["TASA_FACIAL", "tasa_facial", "CUPON", "cupon"],
            LogicalColumn::CouponFrequency => &["FRECUENCIA_CUPON", "frecuencia_cupon"],
            LogicalColumn::SourceFile => &["ARCHIVO_ORIGEN", "archivo_origen"],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LogicalColumn::Identifier => "identifier",
            LogicalColumn::Mnemonic => "mnemonic",
            LogicalColumn::Issuer => "issuer",
            LogicalColumn::InstrumentType => "instrument_type",
            LogicalColumn::Term => "term",
            LogicalColumn::CleanPrice => "clean_price",
            LogicalColumn::DirtyPrice => "dirty_price",
            LogicalColumn::Yield => "yield",
            LogicalColumn::Duration => "duration",
            LogicalColumn::Convexity => "convexity",
            LogicalColumn::ValuationDate => "valuation_date",
            LogicalColumn::MaturityDate => "maturity_date",
            LogicalColumn::IssueDate => "issue_date",
            LogicalColumn::FaceValue => "face_value",
            LogicalColumn::CouponRate => "coupon_rate",
            LogicalColumn::CouponFrequency => "coupon_frequency",
            LogicalColumn::SourceFile => "source_file",
        }
    }
}

/// What a sampled cell says about how a column compares on the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    /// Plain `YYYY-MM-DD` text, which orders like the date it holds
    IsoDate,
    Text,
    /// No sample (null, empty table, or names-only catalog)
    #[default]
    Unknown,
}

impl ColumnKind {
    pub fn of(sample: &Value) -> Self {
        match sample {
            Value::Number(_) => ColumnKind::Numeric,
            Value::String(s) if is_iso_date(s) => ColumnKind::IsoDate,
            Value::String(_) | Value::Bool(_) => ColumnKind::Text,
            _ => ColumnKind::Unknown,
        }
    }
}

fn is_iso_date(s: &str) -> bool {
    s.len() == 10 && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// A physical column reported by a probe, with one sampled value
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedColumn {
    pub name: String,
    pub sample: Value,
}

impl ProbedColumn {
    pub fn new(name: impl Into<String>, sample: Value) -> Self {
        Self {
            name: name.into(),
            sample,
        }
    }

    /// Columns of one row, sampled from that row
    pub fn from_row(row: &serde_json::Map<String, Value>) -> Vec<Self> {
        row.iter().map(|(k, v)| Self::new(k.clone(), v.clone())).collect()
    }
}

/// Logical -> physical column mapping for one table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnCatalog {
    resolved: HashMap<LogicalColumn, String>,
    kinds: HashMap<LogicalColumn, ColumnKind>,
}

impl ColumnCatalog {
    /// Match every logical column against the probed physical names
    pub fn resolve<S: AsRef<str>>(available: &[S]) -> Self {
        let mut resolved = HashMap::new();
        for logical in LogicalColumn::ALL {
            if let Some(name) = pick(logical.candidates(), available) {
                resolved.insert(logical, name);
            }
        }
        Self {
            resolved,
            kinds: HashMap::new(),
        }
    }

    /// Resolve names and record each resolved column's sampled kind
    pub fn from_probe(columns: &[ProbedColumn]) -> Self {
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let mut catalog = Self::resolve(&names);
        let kinds: HashMap<LogicalColumn, ColumnKind> = catalog
            .resolved
            .iter()
            .filter_map(|(logical, name)| {
                columns
                    .iter()
                    .find(|c| c.name == *name)
                    .map(|c| (*logical, ColumnKind::of(&c.sample)))
            })
            .collect();
        catalog.kinds = kinds;
        catalog
    }

    pub fn get(&self, column: LogicalColumn) -> Option<&str> {
        self.resolved.get(&column).map(String::as_str)
    }

    pub fn kind(&self, column: LogicalColumn) -> ColumnKind {
        self.kinds.get(&column).copied().unwrap_or_default()
    }

    /// Physical names of every resolved column, for `select=`
    pub fn physical_names(&self) -> Vec<&str> {
        LogicalColumn::ALL
            .iter()
            .filter_map(|c| self.get(*c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

fn pick<S: AsRef<str>>(candidates: &[&str], available: &[S]) -> Option<String> {
    for candidate in candidates {
        if let Some(found) = available.iter().find(|a| a.as_ref() == *candidate) {
            return Some(found.as_ref().to_string());
        }
    }
    for candidate in candidates {
        if let Some(found) = available
            .iter()
            .find(|a| a.as_ref().eq_ignore_ascii_case(candidate))
        {
            return Some(found.as_ref().to_string());
        }
    }
    None
}
