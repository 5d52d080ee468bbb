//! Field extraction from free text
//!
//! The engine consumes [`ExtractedQuery`] and never cares which extractor
//! produced it. [`KeywordExtractor`] is the deterministic regex/keyword
//! extractor; [`FallbackExtractor`] tries a primary (model-backed) extractor
//! first and degrades to the keyword one on any failure.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use valuation_types::ExtractedQuery;

use crate::error::ExtractError;
use crate::normalize::{fold_text, looks_like_identifier};

// ============================================================================
// TRAIT
// ============================================================================

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, message: &str) -> Result<ExtractedQuery, ExtractError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

// ============================================================================
// KEYWORD EXTRACTOR
// ============================================================================

/// 12-character identifiers: two letters, nine alphanumerics, a digit
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z]{2}[A-Za-z0-9]{9}[0-9]\b").unwrap());

/// Explicitly introduced mnemonic: "nemotécnico CDTBGAS0V", "mnemonic: X"
static MNEMONIC_CUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:nemot[eé]cnico|nemo|mnemonic|ticker)\s*:?\s*([A-Za-z0-9]{4,11})\b").unwrap()
});

/// Bare uppercase code with at least one digit, e.g. `CDTBGAS0V`
static MNEMONIC_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Z0-9]{3,10}\b").unwrap());

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}[-/]\d{1,2}[-/]\d{4})\b").unwrap()
});

/// A date introduced by a maturity word
static MATURITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:vencimiento|vence|vencen|venza|maturity|matures|maturing)\D{0,20}?(\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}[-/]\d{1,2}[-/]\d{4})",
    )
    .unwrap()
});

/// A percentage introduced by a coupon word, or any explicit percentage
static COUPON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:tasa facial|tasa|cup[oó]n|coupon|rate)\D{0,15}?\b(\d{1,2}(?:[.,]\d+)?)\b\s*%?|\b(\d{1,2}[.,]\d+)\s*%",
    )
    .unwrap()
});

/// Words that look like codes but are vocabulary
const NOT_MNEMONICS: &[&str] = &[
    "PIP", "LATAM", "PRECIA", "ISIN", "HOY", "AYER", "COMPARA", "COMPARAR", "TIR", "CDT", "TES",
    "BONO", "BONOS", "PRECIO", "TASA", "CUPON",
];

const COMPARISON_WORDS: &[&str] = &[
    "compara",
    "comparar",
    "comparacion",
    "comparativo",
    "diferencia",
    " vs ",
    " vs.",
    "versus",
    "compare",
    "difference",
];

const EXPLANATION_WORDS: &[&str] = &["explica", "por que", "que significa", "explain", "why"];

/// Requested output fields by keyword
const FIELD_WORDS: &[(&str, &str)] = &[
    ("precio limpio", "clean_price"),
    ("clean price", "clean_price"),
    ("precio sucio", "dirty_price"),
    ("dirty price", "dirty_price"),
    ("tir", "yield_rate"),
    ("rendimiento", "yield_rate"),
    ("yield", "yield_rate"),
    ("duracion", "duration"),
    ("duration", "duration"),
    ("convexidad", "convexity"),
    ("convexity", "convexity"),
];

/// Deterministic extractor; never fails on a non-empty message
#[derive(Debug, Clone, Default)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_sync(&self, message: &str) -> Result<ExtractedQuery, ExtractError> {
        if message.trim().is_empty() {
            return Err(ExtractError::EmptyMessage);
        }
        let folded = fold_text(message);
        let padded = format!(" {} ", folded);

        let mut identifiers: Vec<String> = Vec::new();
        for m in IDENTIFIER_RE.find_iter(message) {
            let id = m.as_str().to_uppercase();
            if looks_like_identifier(&id) && !identifiers.contains(&id) {
                identifiers.push(id);
            }
        }

        let mnemonic = MNEMONIC_CUE_RE
            .captures(message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_uppercase())
            .or_else(|| {
                MNEMONIC_BARE_RE
                    .find_iter(message)
                    .map(|m| m.as_str())
                    .filter(|s| s.chars().any(|c| c.is_ascii_digit()))
                    .filter(|s| !NOT_MNEMONICS.contains(s))
                    .find(|s| !identifiers.iter().any(|id| id == s))
                    .map(str::to_string)
            });

        let mentions_pip = padded.contains(" pip") || padded.contains("latam");
        let mentions_precia = padded.contains("precia");
        let comparison = COMPARISON_WORDS.iter().any(|w| padded.contains(w))
            || (mentions_pip && mentions_precia);
        let provider = match (mentions_pip, mentions_precia) {
            (true, false) => Some("PIP_LATAM".to_string()),
            (false, true) => Some("PRECIA".to_string()),
            _ => None,
        };

        let maturity_date = MATURITY_RE
            .captures(message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let date = if padded.contains(" hoy ") || padded.contains(" today ") {
            Some("hoy".to_string())
        } else if padded.contains(" ayer ") || padded.contains(" yesterday ") {
            Some("ayer".to_string())
        } else {
            DATE_RE
                .find_iter(message)
                .map(|m| m.as_str())
                .find(|d| maturity_date.as_deref() != Some(*d))
                .map(str::to_string)
        };

        let coupon = COUPON_RE.captures(message).and_then(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .map(|m| Value::String(m.as_str().to_string()))
        });

        let fields: Vec<String> = FIELD_WORDS
            .iter()
            .filter(|(word, _)| padded.contains(&format!(" {} ", word)))
            .map(|(_, field)| field.to_string())
            .fold(Vec::new(), |mut acc, f| {
                if !acc.contains(&f) {
                    acc.push(f);
                }
                acc
            });

        let intent = if comparison {
            "comparacion"
        } else if identifiers.len() > 1 {
            "multiples_isins"
        } else if EXPLANATION_WORDS.iter().any(|w| padded.contains(w)) {
            "explicacion"
        } else if !identifiers.is_empty() || mnemonic.is_some() {
            "precio"
        } else {
            "busqueda"
        };

        Ok(ExtractedQuery {
            intent: Some(intent.to_string()),
            identifiers,
            mnemonic,
            provider,
            date,
            maturity_date,
            coupon,
            fields,
            comparison,
            raw_message: message.to_string(),
        })
    }
}

#[async_trait]
impl Extractor for KeywordExtractor {
    async fn extract(&self, message: &str) -> Result<ExtractedQuery, ExtractError> {
        self.extract_sync(message)
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

// ============================================================================
// FALLBACK CHAIN
// ============================================================================

/// Primary extractor with keyword fallback
pub struct FallbackExtractor {
    primary: Arc<dyn Extractor>,
    fallback: KeywordExtractor,
}

impl FallbackExtractor {
    pub fn new(primary: Arc<dyn Extractor>) -> Self {
        Self {
            primary,
            fallback: KeywordExtractor::new(),
        }
    }
}

#[async_trait]
impl Extractor for FallbackExtractor {
    async fn extract(&self, message: &str) -> Result<ExtractedQuery, ExtractError> {
        match self.primary.extract(message).await {
            Ok(mut extracted) => {
                if extracted.raw_message.is_empty() {
                    extracted.raw_message = message.to_string();
                }
                Ok(extracted)
            }
            Err(ExtractError::EmptyMessage) => Err(ExtractError::EmptyMessage),
            Err(e) => {
                warn!(
                    "{} extractor failed, using keyword fallback: {}",
                    self.primary.name(),
                    e
                );
                self.fallback.extract_sync(message)
            }
        }
    }

    fn name(&self) -> &'static str {
        self.primary.name()
    }
}

/// Parse a model's JSON answer into an extraction
pub fn parse_extraction(json: &str, message: &str) -> Result<ExtractedQuery, ExtractError> {
    let mut extracted: ExtractedQuery = serde_json::from_str(json)?;
    extracted.raw_message = message.to_string();
    Ok(extracted)
}
