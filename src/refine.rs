//! Refinement Question Generator
//!
//! Given an ambiguous candidate set, work out which attributes would narrow
//! it. Attributes are considered in a fixed priority order:
//!
//! 1. identifier (mnemonic searches only)
//! 2. maturity date
//! 3. coupon rate
//! 4. issuer
//! 5. provider
//!
//! An attribute qualifies when the query does not already constrain it and
//! the candidates carry more than one distinct value for it. The first
//! returned question is the one to ask next.

use std::collections::BTreeSet;

use valuation_types::{
    IdentifierFilter, RefinementAttribute, RefinementQuestion, SearchQuery, ValuationRecord,
};

/// Examples surfaced per question
pub const MAX_EXAMPLES: usize = 3;

/// All qualifying questions, highest priority first.
///
/// Empty when the candidates span at most one identifier: rows that differ
/// only by provider are the answer, not an ambiguity. List searches never
/// refine.
pub fn refinement_questions(
    candidates: &[ValuationRecord],
    query: &SearchQuery,
) -> Vec<RefinementQuestion> {
    if matches!(query.identifier, IdentifierFilter::List(_)) {
        return Vec::new();
    }
    let identifiers = distinct(candidates, |r| Some(r.identifier.to_uppercase()));
    if identifiers.len() <= 1 {
        return Vec::new();
    }

    let mut questions = Vec::new();

    if query.identifier.is_mnemonic() {
        questions.push(question(RefinementAttribute::Identifier, identifiers));
    }
    if query.maturity_date.is_none() {
        let values = distinct(candidates, |r| r.maturity_date.map(|d| d.to_string()));
        push_if_ambiguous(&mut questions, RefinementAttribute::MaturityDate, values);
    }
    if query.coupon_rate.is_none() {
        let values = distinct(candidates, |r| r.coupon_rate.map(format_coupon));
        push_if_ambiguous(&mut questions, RefinementAttribute::CouponRate, values);
    }
    if query.issuer.is_none() {
        let values = distinct(candidates, |r| r.issuer.clone());
        push_if_ambiguous(&mut questions, RefinementAttribute::Issuer, values);
    }
    if query.provider.is_none() {
        let values = distinct(candidates, |r| Some(r.provider.to_string()));
        push_if_ambiguous(&mut questions, RefinementAttribute::Provider, values);
    }

    questions
}

/// The single question to ask next, if any
pub fn next_question(candidates: &[ValuationRecord], query: &SearchQuery) -> Option<RefinementQuestion> {
    refinement_questions(candidates, query).into_iter().next()
}

fn distinct<F>(candidates: &[ValuationRecord], value: F) -> BTreeSet<String>
where
    F: Fn(&ValuationRecord) -> Option<String>,
{
    candidates
        .iter()
        .filter_map(value)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn push_if_ambiguous(
    questions: &mut Vec<RefinementQuestion>,
    attribute: RefinementAttribute,
    values: BTreeSet<String>,
) {
    if values.len() > 1 {
        questions.push(question(attribute, values));
    }
}

fn question(attribute: RefinementAttribute, values: BTreeSet<String>) -> RefinementQuestion {
    RefinementQuestion {
        attribute,
        distinct_values: values.len(),
        examples: values.into_iter().take(MAX_EXAMPLES).collect(),
    }
}

/// Two decimals, which is also the resolution of the acceptance band
fn format_coupon(coupon: f64) -> String {
    format!("{:.2}", coupon)
}
