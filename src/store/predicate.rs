//! Predicate builder: typed [`SearchQuery`] -> store predicates
//!
//! This is the only place where the mnemonic tagged variant is translated back
//! into the dual-column form: a mnemonic search becomes one OR-predicate over
//! the issuer, instrument-type and mnemonic columns, and never an identifier
//! equality.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use valuation_types::{IdentifierFilter, Provider, SearchQuery, ValuationRecord};

use crate::normalize::{normalize_identifier, within_band, COUPON_TOLERANCE};

/// One filter condition over [`ValuationRecord`] columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Case-insensitive identifier equality (value already uppercase)
    IdentifierEq(String),
    IdentifierIn(Vec<String>),
    ProviderEq(Provider),
    ValuationDateEq(NaiveDate),
    ValuationDateFrom(NaiveDate),
    ValuationDateTo(NaiveDate),
    /// Substring match OR-ed across issuer, instrument type and mnemonic
    MnemonicLike(String),
    IssuerLike(String),
    InstrumentTypeLike(String),
    MaturityEq(NaiveDate),
    /// `|coupon - target| <= band`
    CouponWithin { target: f64, band: f64 },
}

impl Predicate {
    pub fn matches(&self, record: &ValuationRecord) -> bool {
        match self {
            Predicate::IdentifierEq(id) => record.identifier.eq_ignore_ascii_case(id),
            Predicate::IdentifierIn(ids) => ids
                .iter()
                .any(|id| record.identifier.eq_ignore_ascii_case(id)),
            Predicate::ProviderEq(provider) => record.provider == *provider,
            Predicate::ValuationDateEq(date) => record.valuation_date == *date,
            Predicate::ValuationDateFrom(date) => record.valuation_date >= *date,
            Predicate::ValuationDateTo(date) => record.valuation_date <= *date,
            Predicate::MnemonicLike(code) => {
                contains_ci(record.issuer.as_deref(), code)
                    || contains_ci(record.instrument_type.as_deref(), code)
                    || contains_ci(record.mnemonic.as_deref(), code)
            }
            Predicate::IssuerLike(text) => contains_ci(record.issuer.as_deref(), text),
            Predicate::InstrumentTypeLike(text) => {
                contains_ci(record.instrument_type.as_deref(), text)
            }
            Predicate::MaturityEq(date) => record.maturity_date == Some(*date),
            Predicate::CouponWithin { target, band } => record
                .coupon_rate
                .map(|coupon| within_band(coupon, *target, *band))
                .unwrap_or(false),
        }
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_uppercase().contains(&needle.to_uppercase()))
        .unwrap_or(false)
}

/// Conjunction of predicates derived from one query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorePredicates {
    pub predicates: Vec<Predicate>,
}

impl StorePredicates {
    /// All active predicates of a query, with the final-acceptance coupon band
    pub fn from_query(query: &SearchQuery) -> Self {
        let mut predicates = Vec::new();

        match &query.identifier {
            IdentifierFilter::None => {}
            IdentifierFilter::Exact(id) => {
                if let Some(id) = normalize_identifier(id) {
                    predicates.push(Predicate::IdentifierEq(id));
                }
            }
            IdentifierFilter::List(ids) => {
                let ids: Vec<String> = ids.iter().filter_map(|i| normalize_identifier(i)).collect();
                if !ids.is_empty() {
                    predicates.push(Predicate::IdentifierIn(ids));
                }
            }
            IdentifierFilter::Mnemonic(code) => {
                predicates.push(Predicate::MnemonicLike(code.trim().to_string()));
            }
        }

        if let Some(provider) = query.provider {
            predicates.push(Predicate::ProviderEq(provider));
        }
        if let Some(date) = query.valuation_date {
            predicates.push(Predicate::ValuationDateEq(date));
        }
        if let Some(date) = query.date_from {
            predicates.push(Predicate::ValuationDateFrom(date));
        }
        if let Some(date) = query.date_to {
            predicates.push(Predicate::ValuationDateTo(date));
        }
        if let Some(issuer) = query.issuer.as_deref().filter(|s| !s.trim().is_empty()) {
            predicates.push(Predicate::IssuerLike(issuer.trim().to_string()));
        }
        if let Some(kind) = query.instrument_type.as_deref().filter(|s| !s.trim().is_empty()) {
            predicates.push(Predicate::InstrumentTypeLike(kind.trim().to_string()));
        }
        if let Some(date) = query.maturity_date {
            predicates.push(Predicate::MaturityEq(date));
        }
        if let Some(coupon) = query.coupon_rate {
            predicates.push(Predicate::CouponWithin {
                target: coupon,
                band: COUPON_TOLERANCE,
            });
        }

        Self { predicates }
    }

    /// Only the attribute predicates (provider, dates, maturity, coupon).
    ///
    /// Used to re-filter rows that were already selected by identity, such as
    /// projected remote rows or a session's held results.
    pub fn attributes_only(query: &SearchQuery) -> Self {
        let mut all = Self::from_query(query);
        all.predicates.retain(|p| {
            !matches!(
                p,
                Predicate::IdentifierEq(_)
                    | Predicate::IdentifierIn(_)
                    | Predicate::MnemonicLike(_)
                    | Predicate::IssuerLike(_)
                    | Predicate::InstrumentTypeLike(_)
            )
        });
        all
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, record: &ValuationRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }

    pub fn filter(&self, records: &[ValuationRecord]) -> Vec<ValuationRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}
