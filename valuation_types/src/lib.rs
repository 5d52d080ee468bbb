//! Valuation Types - Foundation Data Model
//!
//! Pure data structures shared by every layer of the bond query engine.
//! Nothing in here talks to a database, a remote API or a session store.
//!
//! ## Contents
//!
//! - [`Provider`] - the two valuation data sources
//! - [`ValuationRecord`] / [`IdentityKey`] - one materialised valuation row
//! - [`IdentifierFilter`] / [`SearchQuery`] / [`QueryFields`] - resolved filters
//! - [`ExtractedQuery`] - structured output of the natural-language extractor
//! - [`ResolutionOutcome`] - what the engine hands back to its callers
//!
//! ## Rules
//!
//! 1. **NO I/O** - only data structures, constructors and small accessors
//! 2. **NO WORKSPACE DEPENDENCIES**
//! 3. **SERIALIZABLE** - every type crossing a boundary supports serde

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// PROVIDER
// ============================================================================

/// One of the two valuation data providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "PIP_LATAM", alias = "PIP")]
    PipLatam,
    #[serde(rename = "PRECIA")]
    Precia,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown provider '{0}'")]
pub struct ProviderParseError(pub String);

impl Provider {
    /// Both providers, in canonical order
    pub const ALL: [Provider; 2] = [Provider::PipLatam, Provider::Precia];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::PipLatam => "PIP_LATAM",
            Provider::Precia => "PRECIA",
        }
    }

    /// The opposite provider
    pub fn other(&self) -> Provider {
        match self {
            Provider::PipLatam => Provider::Precia,
            Provider::Precia => Provider::PipLatam,
        }
    }
}

impl FromStr for Provider {
    type Err = ProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase().replace([' ', '-'], "_");
        match upper.as_str() {
            "PIP_LATAM" | "PIP" | "LATAM" | "PIPLATAM" => Ok(Provider::PipLatam),
            "PRECIA" => Ok(Provider::Precia),
            _ => Err(ProviderParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// VALUATION RECORD
// ============================================================================

/// Deduplication key for valuation records
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub identifier: String,
    pub valuation_date: NaiveDate,
    pub provider: Provider,
}

/// One valuation observation for one security, from one provider, on one date.
///
/// Produced by the record projector (remote rows) or read back from the local
/// store. Never mutated once materialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRecord {
    /// 12-character security identifier, uppercase
    pub identifier: String,
    /// Provider mnemonic code, when the source carries one
    #[serde(default)]
    pub mnemonic: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub instrument_type: Option<String>,
    /// Term / tenor label as published by the provider
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub clean_price: Option<f64>,
    #[serde(default)]
    pub dirty_price: Option<f64>,
    /// Yield to maturity, percentage
    #[serde(default)]
    pub yield_rate: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub convexity: Option<f64>,
    pub valuation_date: NaiveDate,
    #[serde(default)]
    pub maturity_date: Option<NaiveDate>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub face_value: Option<f64>,
    /// Facial coupon rate, percentage points
    #[serde(default)]
    pub coupon_rate: Option<f64>,
    #[serde(default)]
    pub coupon_frequency: Option<String>,
    pub provider: Provider,
    /// File the provider row was loaded from
    #[serde(default)]
    pub source_file: Option<String>,
}

impl ValuationRecord {
    /// Minimal record; every optional attribute left empty
    pub fn new(identifier: impl Into<String>, valuation_date: NaiveDate, provider: Provider) -> Self {
        Self {
            identifier: identifier.into(),
            mnemonic: None,
            issuer: None,
            instrument_type: None,
            term: None,
            clean_price: None,
            dirty_price: None,
            yield_rate: None,
            duration: None,
            convexity: None,
            valuation_date,
            maturity_date: None,
            issue_date: None,
            face_value: None,
            coupon_rate: None,
            coupon_frequency: None,
            provider,
            source_file: None,
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            identifier: self.identifier.clone(),
            valuation_date: self.valuation_date,
            provider: self.provider,
        }
    }
}

// ============================================================================
// SEARCH QUERY
// ============================================================================

/// Which identifier-resolution strategy a query uses. At most one is active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IdentifierFilter {
    #[default]
    None,
    /// Exact security identifier
    Exact(String),
    /// Several exact identifiers
    List(Vec<String>),
    /// Provider mnemonic code (fuzzy, matched against issuer / instrument type)
    Mnemonic(String),
}

impl IdentifierFilter {
    pub fn is_none(&self) -> bool {
        matches!(self, IdentifierFilter::None)
    }

    pub fn is_mnemonic(&self) -> bool {
        matches!(self, IdentifierFilter::Mnemonic(_))
    }

    pub fn mnemonic(&self) -> Option<&str> {
        match self {
            IdentifierFilter::Mnemonic(code) => Some(code),
            _ => None,
        }
    }
}

/// The resolved, typed filter set for one search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub identifier: IdentifierFilter,
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub valuation_date: Option<NaiveDate>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    /// Issuer-name substring (not a mnemonic search)
    #[serde(default)]
    pub issuer: Option<String>,
    /// Instrument-type substring (not a mnemonic search)
    #[serde(default)]
    pub instrument_type: Option<String>,
    #[serde(default)]
    pub maturity_date: Option<NaiveDate>,
    /// Coupon rate, percentage points
    #[serde(default)]
    pub coupon_rate: Option<f64>,
}

impl SearchQuery {
    pub fn exact(identifier: impl Into<String>) -> Self {
        Self {
            identifier: IdentifierFilter::Exact(identifier.into()),
            ..Default::default()
        }
    }

    pub fn mnemonic(code: impl Into<String>) -> Self {
        Self {
            identifier: IdentifierFilter::Mnemonic(code.into()),
            ..Default::default()
        }
    }

    /// Translate the dual-field wire form into a typed query.
    ///
    /// Identical non-empty issuer and instrument-type fields encode a mnemonic
    /// search; in that case any identifier in the fields is dropped.
    pub fn from_fields(fields: QueryFields) -> Self {
        let mnemonic = match (&fields.issuer, &fields.instrument_type) {
            (Some(issuer), Some(kind)) if !issuer.trim().is_empty() && issuer == kind => {
                Some(issuer.trim().to_string())
            }
            _ => None,
        };

        let identifier = if let Some(code) = &mnemonic {
            IdentifierFilter::Mnemonic(code.clone())
        } else if let Some(list) = fields.identifiers.filter(|l| !l.is_empty()) {
            IdentifierFilter::List(list)
        } else if let Some(id) = fields.identifier.filter(|s| !s.trim().is_empty()) {
            IdentifierFilter::Exact(id)
        } else {
            IdentifierFilter::None
        };

        let (issuer, instrument_type) = if mnemonic.is_some() {
            (None, None)
        } else {
            (fields.issuer, fields.instrument_type)
        };

        Self {
            identifier,
            provider: fields.provider,
            valuation_date: fields.valuation_date,
            date_from: fields.date_from,
            date_to: fields.date_to,
            issuer,
            instrument_type,
            maturity_date: fields.maturity_date,
            coupon_rate: fields.coupon_rate,
        }
    }

    /// Dual-field form of this query (mnemonic written into both fields)
    pub fn to_fields(&self) -> QueryFields {
        let mut fields = QueryFields {
            identifier: None,
            identifiers: None,
            provider: self.provider,
            valuation_date: self.valuation_date,
            date_from: self.date_from,
            date_to: self.date_to,
            issuer: self.issuer.clone(),
            instrument_type: self.instrument_type.clone(),
            maturity_date: self.maturity_date,
            coupon_rate: self.coupon_rate,
        };
        match &self.identifier {
            IdentifierFilter::None => {}
            IdentifierFilter::Exact(id) => fields.identifier = Some(id.clone()),
            IdentifierFilter::List(ids) => fields.identifiers = Some(ids.clone()),
            IdentifierFilter::Mnemonic(code) => {
                fields.issuer = Some(code.clone());
                fields.instrument_type = Some(code.clone());
            }
        }
        fields
    }

    /// True when the query carries a filter that defines a search context:
    /// identifier, identifier list, mnemonic, maturity, coupon or provider.
    pub fn has_meaningful_filter(&self) -> bool {
        !self.identifier.is_none()
            || self.maturity_date.is_some()
            || self.coupon_rate.is_some()
            || self.provider.is_some()
    }

    pub fn has_date_filter(&self) -> bool {
        self.valuation_date.is_some() || self.date_from.is_some() || self.date_to.is_some()
    }
}

/// Flat wire form of a query, as exchanged with the persistence boundary.
///
/// Mnemonic searches are encoded by setting `issuer` and `instrument_type`
/// to the same code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFields {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub identifiers: Option<Vec<String>>,
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub valuation_date: Option<NaiveDate>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub instrument_type: Option<String>,
    #[serde(default)]
    pub maturity_date: Option<NaiveDate>,
    #[serde(default)]
    pub coupon_rate: Option<f64>,
}

// ============================================================================
// EXTRACTION (collaborator output)
// ============================================================================

/// Intent label produced by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Price,
    Comparison,
    MultipleIdentifiers,
    Explanation,
    Search,
}

impl Intent {
    /// Lenient label parsing; unknown labels map to `Search`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "price" | "precio" => Intent::Price,
            "comparison" | "comparacion" | "comparación" => Intent::Comparison,
            "multiple_identifiers" | "multiples_isins" => Intent::MultipleIdentifiers,
            "explanation" | "explicacion" | "explicación" => Intent::Explanation,
            _ => Intent::Search,
        }
    }
}

/// Structured extraction of one user message.
///
/// Values are raw strings exactly as the extractor produced them; the
/// normalizer turns them into typed filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedQuery {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default, alias = "isins")]
    pub identifiers: Vec<String>,
    #[serde(default, alias = "nemotecnico")]
    pub mnemonic: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, alias = "fecha_vencimiento")]
    pub maturity_date: Option<String>,
    /// Number or string, exactly as extracted
    #[serde(default, alias = "cupon")]
    pub coupon: Option<serde_json::Value>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub comparison: bool,
    #[serde(default)]
    pub raw_message: String,
}

impl ExtractedQuery {
    pub fn intent(&self) -> Intent {
        self.intent
            .as_deref()
            .map(Intent::from_label)
            .unwrap_or(Intent::Search)
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Attribute the refinement generator can ask about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementAttribute {
    Identifier,
    MaturityDate,
    CouponRate,
    Issuer,
    Provider,
}

/// One "which one do you mean?" prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementQuestion {
    pub attribute: RefinementAttribute,
    /// Up to three distinct values present in the candidate set
    pub examples: Vec<String>,
    /// Number of distinct values across the candidates
    pub distinct_values: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// The message carried no usable filter
    MissingCriteria,
    /// The search ran and matched nothing
    NoMatches,
    /// A refinement filtered the held results down to nothing
    NoRefinedMatches,
}

/// Engine answer for one conversational turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Results {
        records: Vec<ValuationRecord>,
    },
    Refine {
        questions: Vec<RefinementQuestion>,
        candidate_count: usize,
    },
    Empty {
        reason: EmptyReason,
        /// Similar identifiers, when the search was for one identifier
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        suggestions: Vec<String>,
    },
}

impl ResolutionOutcome {
    pub fn empty(reason: EmptyReason) -> Self {
        ResolutionOutcome::Empty {
            reason,
            suggestions: Vec::new(),
        }
    }
}
