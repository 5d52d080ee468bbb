//! Value normalization for extracted and provider-supplied fields
//!
//! Canonicalizes raw values into typed, comparable forms:
//! - identifiers and mnemonic codes: trimmed, uppercase
//! - coupon rates: percentage numbers from numbers or strings like `"8,85%"`
//! - dates: `DD/MM/YYYY`, `DD-MM-YYYY`, ISO dates and ISO date-times
//!
//! Nothing here returns an error. Unparseable input becomes `None`, is logged
//! at warning level, and callers treat it exactly like an absent value.

use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde_json::Value;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use valuation_types::{ExtractedQuery, Intent, Provider, QueryFields, SearchQuery};

/// Final-acceptance coupon band, percentage points
pub const COUPON_TOLERANCE: f64 = 0.01;

/// Provisional coupon band used only in remote filters
pub const REMOTE_COUPON_TOLERANCE: f64 = 0.02;

/// Provisional maturity window used only in remote filters
pub const REMOTE_DATE_TOLERANCE_DAYS: i64 = 1;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Trim and uppercase a security identifier; blank input is absent
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_uppercase())
}

/// Trim and uppercase a mnemonic code; blank input is absent
pub fn normalize_mnemonic(raw: &str) -> Option<String> {
    normalize_identifier(raw)
}

/// Shape check for 12-character identifiers: two letters, nine alphanumerics,
/// one check digit.
pub fn looks_like_identifier(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 12
        && bytes[..2].iter().all(|b| b.is_ascii_uppercase())
        && bytes.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        && bytes[11].is_ascii_digit()
}

/// Shape check for mnemonic codes: 4-11 uppercase alphanumerics with at least
/// one letter
pub fn looks_like_mnemonic(s: &str) -> bool {
    (4..=11).contains(&s.len())
        && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && s.chars().any(|c| c.is_ascii_uppercase())
}

// ============================================================================
// NUMBERS
// ============================================================================

/// Parse a coupon rate (percentage points) from a number or a string.
///
/// Accepts `8.85`, `"8.85"`, `"8,85"`, `"8,85 %"`. Values outside 0..=100 are
/// rejected.
pub fn parse_coupon(raw: &Value) -> Option<f64> {
    let parsed = match raw {
        Value::Null => return None,
        Value::String(s) if s.trim().is_empty() => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_decimal_str(s),
        _ => None,
    };

    match parsed {
        Some(v) if (0.0..=100.0).contains(&v) => Some(v),
        _ => {
            tracing::warn!(raw = %raw, "Unparseable coupon value, treating as absent");
            None
        }
    }
}

/// Lenient numeric parse for provider columns (prices, durations, face values)
pub fn parse_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => {
            let parsed = parse_decimal_str(s);
            if parsed.is_none() {
                tracing::warn!(raw = %s, "Unparseable numeric value, treating as absent");
            }
            parsed
        }
        _ => None,
    }
}

/// Parse a decimal string that may use `,` or `.` as decimal separator and may
/// carry a percent sign. When both separators appear, the right-most one is
/// the decimal separator and the other is a thousands separator.
pub fn parse_decimal_str(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let canonical = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches(',').count() == 1 => cleaned.replace(',', "."),
        (Some(_), None) => cleaned.replace(',', ""),
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// The decimal a finite `f64` prints as (`8.86`, not its binary expansion)
pub fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string()).ok()
}

/// `|a - b| <= band`, compared in decimal so the band edge is exact
pub fn within_band(a: f64, b: f64, band: f64) -> bool {
    match (to_decimal(a), to_decimal(b), to_decimal(band)) {
        (Some(a), Some(b), Some(band)) => a.checked_sub(b).is_some_and(|diff| diff.abs() <= band),
        _ => false,
    }
}

/// Coupon equality under the final-acceptance band
pub fn coupon_matches(stored: f64, target: f64) -> bool {
    within_band(stored, target, COUPON_TOLERANCE)
}

// ============================================================================
// DATES
// ============================================================================

/// Parse a calendar date; returns `None` (logged) when no format matches
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = parse_date_quiet(trimmed);
    if parsed.is_none() {
        tracing::warn!(raw = %trimmed, "Unparseable date, treating as absent");
    }
    parsed
}

/// Like [`parse_date`] but also understands `hoy`/`today` and `ayer`/`yesterday`
pub fn parse_date_relative(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    match fold_text(raw).as_str() {
        "hoy" | "today" => Some(today),
        "ayer" | "yesterday" => Some(today - Duration::days(1)),
        _ => parse_date(raw),
    }
}

/// Date from a JSON cell (strings only; nulls and blanks are absent)
pub fn parse_date_value(raw: &Value) -> Option<NaiveDate> {
    match raw {
        Value::String(s) => parse_date(s),
        _ => None,
    }
}

fn parse_date_quiet(s: &str) -> Option<NaiveDate> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    // ISO date-time: take the date part
    if s.len() > 10 && matches!(s.as_bytes()[10], b'T' | b' ') {
        if let Some(prefix) = s.get(..10) {
            return NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok();
        }
    }
    None
}

// ============================================================================
// TEXT
// ============================================================================

/// Accent-insensitive lowercase form used for keyword and cue matching.
///
/// `"Cupón del 8,85"` -> `"cupon del 8,85"`
pub fn fold_text(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

// ============================================================================
// INCOMING QUERY
// ============================================================================

/// One extracted message after normalization.
///
/// Every field is either a well-formed value or absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingQuery {
    pub identifiers: Vec<String>,
    pub mnemonic: Option<String>,
    pub provider: Option<Provider>,
    pub valuation_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub coupon_rate: Option<f64>,
    pub comparison: bool,
    pub message: String,
}

impl IncomingQuery {
    pub fn from_extracted(extracted: &ExtractedQuery, today: NaiveDate) -> Self {
        let mut identifiers: Vec<String> = Vec::new();
        for raw in &extracted.identifiers {
            if let Some(id) = normalize_identifier(raw) {
                if !identifiers.contains(&id) {
                    identifiers.push(id);
                }
            }
        }

        let mut mnemonic = extracted.mnemonic.as_deref().and_then(normalize_mnemonic);

        // A lone "identifier" that is really a mnemonic code
        if mnemonic.is_none()
            && identifiers.len() == 1
            && !looks_like_identifier(&identifiers[0])
            && looks_like_mnemonic(&identifiers[0])
        {
            tracing::debug!(value = %identifiers[0], "Reclassifying identifier as mnemonic code");
            mnemonic = identifiers.pop();
        }

        let provider = extracted.provider.as_deref().and_then(|p| match p.parse() {
            Ok(provider) => Some(provider),
            Err(e) => {
                tracing::warn!("{}, treating as absent", e);
                None
            }
        });

        Self {
            identifiers,
            mnemonic,
            provider,
            valuation_date: extracted
                .date
                .as_deref()
                .and_then(|d| parse_date_relative(d, today)),
            maturity_date: extracted.maturity_date.as_deref().and_then(parse_date),
            coupon_rate: extracted.coupon.as_ref().and_then(parse_coupon),
            comparison: extracted.comparison || extracted.intent() == Intent::Comparison,
            message: extracted.raw_message.clone(),
        }
    }

    /// The identifier a comparison request is about, when it names exactly one
    pub fn comparison_target(&self) -> Option<&str> {
        match (self.comparison, self.identifiers.as_slice()) {
            (true, [identifier]) => Some(identifier),
            _ => None,
        }
    }

    /// Carries a new identifier or mnemonic (i.e. starts a new search context)
    pub fn carries_identity(&self) -> bool {
        !self.identifiers.is_empty() || self.mnemonic.is_some()
    }

    /// Carries an attribute that can narrow an existing candidate set
    pub fn carries_discriminator(&self) -> bool {
        self.coupon_rate.is_some() || self.maturity_date.is_some()
    }

    /// Build the typed query; a mnemonic takes precedence over identifiers
    pub fn to_search_query(&self) -> SearchQuery {
        let mut fields = QueryFields {
            provider: self.provider,
            valuation_date: self.valuation_date,
            maturity_date: self.maturity_date,
            coupon_rate: self.coupon_rate,
            ..Default::default()
        };
        match self.identifiers.len() {
            0 => {}
            1 => fields.identifier = self.identifiers.first().cloned(),
            _ => fields.identifiers = Some(self.identifiers.clone()),
        }
        if let Some(code) = &self.mnemonic {
            fields.issuer = Some(code.clone());
            fields.instrument_type = Some(code.clone());
        }
        SearchQuery::from_fields(fields)
    }
}
