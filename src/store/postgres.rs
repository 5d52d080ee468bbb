//! Postgres-backed local valuation store
//!
//! Table layout lives in `migrations/0001_valuations.sql`. Numeric columns are
//! `DOUBLE PRECISION` so rows map straight onto [`ValuationRecord`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use valuation_types::{IdentityKey, Provider, ValuationRecord};

use super::{Predicate, StorePredicates, ValuationStore};
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::normalize::to_decimal;

/// 18 bind parameters per row keeps a chunk well under the 65535 limit
const UPSERT_CHUNK: usize = 1000;

const SELECT_COLUMNS: &str = r#"
    SELECT identifier, mnemonic, issuer, instrument_type, term,
           clean_price, dirty_price, yield_rate, duration, convexity,
           valuation_date, maturity_date, issue_date, face_value,
           coupon_rate, coupon_frequency, provider, source_file
    FROM valuations
"#;

/// Row shape of the `valuations` table
#[derive(Debug, FromRow)]
struct ValuationRow {
    identifier: String,
    mnemonic: Option<String>,
    issuer: Option<String>,
    instrument_type: Option<String>,
    term: Option<String>,
    clean_price: Option<f64>,
    dirty_price: Option<f64>,
    yield_rate: Option<f64>,
    duration: Option<f64>,
    convexity: Option<f64>,
    valuation_date: NaiveDate,
    maturity_date: Option<NaiveDate>,
    issue_date: Option<NaiveDate>,
    face_value: Option<f64>,
    coupon_rate: Option<f64>,
    coupon_frequency: Option<String>,
    provider: String,
    source_file: Option<String>,
}

impl TryFrom<ValuationRow> for ValuationRecord {
    type Error = StoreError;

    fn try_from(row: ValuationRow) -> Result<Self, Self::Error> {
        let provider: Provider = row.provider.parse().map_err(|e| StoreError::InvalidRow {
            identifier: row.identifier.clone(),
            reason: format!("{}", e),
        })?;
        Ok(ValuationRecord {
            identifier: row.identifier,
            mnemonic: row.mnemonic,
            issuer: row.issuer,
            instrument_type: row.instrument_type,
            term: row.term,
            clean_price: row.clean_price,
            dirty_price: row.dirty_price,
            yield_rate: row.yield_rate,
            duration: row.duration,
            convexity: row.convexity,
            valuation_date: row.valuation_date,
            maturity_date: row.maturity_date,
            issue_date: row.issue_date,
            face_value: row.face_value,
            coupon_rate: row.coupon_rate,
            coupon_frequency: row.coupon_frequency,
            provider,
            source_file: row.source_file,
        })
    }
}

/// Local store over a Postgres pool
#[derive(Clone, Debug)]
pub struct PgValuationStore {
    pool: PgPool,
}

impl PgValuationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable {
                message: "DATABASE_URL is not set".to_string(),
            })?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout)
            .connect(url)
            .await?;
        info!("Connected valuation store ({} max connections)", config.max_connections);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::IdentifierEq(id) => {
            builder.push("UPPER(identifier) = ").push_bind(id.to_uppercase());
        }
        Predicate::IdentifierIn(ids) => {
            let upper: Vec<String> = ids.iter().map(|i| i.to_uppercase()).collect();
            builder.push("UPPER(identifier) = ANY(").push_bind(upper).push(")");
        }
        Predicate::ProviderEq(provider) => {
            builder.push("provider = ").push_bind(provider.as_str());
        }
        Predicate::ValuationDateEq(date) => {
            builder.push("valuation_date = ").push_bind(*date);
        }
        Predicate::ValuationDateFrom(date) => {
            builder.push("valuation_date >= ").push_bind(*date);
        }
        Predicate::ValuationDateTo(date) => {
            builder.push("valuation_date <= ").push_bind(*date);
        }
        Predicate::MnemonicLike(code) => {
            builder
                .push("(issuer ILIKE '%' || ")
                .push_bind(code.clone())
                .push(" || '%' OR instrument_type ILIKE '%' || ")
                .push_bind(code.clone())
                .push(" || '%' OR mnemonic ILIKE '%' || ")
                .push_bind(code.clone())
                .push(" || '%')");
        }
        Predicate::IssuerLike(text) => {
            builder
                .push("issuer ILIKE '%' || ")
                .push_bind(text.clone())
                .push(" || '%'");
        }
        Predicate::InstrumentTypeLike(text) => {
            builder
                .push("instrument_type ILIKE '%' || ")
                .push_bind(text.clone())
                .push(" || '%'");
        }
        Predicate::MaturityEq(date) => {
            builder.push("maturity_date = ").push_bind(*date);
        }
        Predicate::CouponWithin { target, band } => match (to_decimal(*target), to_decimal(*band)) {
            (Some(target), Some(band)) => {
                // float8::numeric rounds to 15 significant digits, plenty for coupon rates
                builder
                    .push("ABS(coupon_rate::numeric - ")
                    .push_bind(target)
                    .push(") <= ")
                    .push_bind(band);
            }
            _ => {
                builder.push("FALSE");
            }
        },
    }
}

#[async_trait]
impl ValuationStore for PgValuationStore {
    async fn find(&self, predicates: &StorePredicates) -> StoreResult<Vec<ValuationRecord>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(SELECT_COLUMNS);
        for (i, predicate) in predicates.predicates.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            push_predicate(&mut builder, predicate);
        }
        builder.push(" ORDER BY valuation_date DESC, identifier ASC, provider ASC");

        let rows: Vec<ValuationRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        debug!("Local store returned {} rows", rows.len());
        rows.into_iter().map(ValuationRecord::try_from).collect()
    }

    async fn upsert(&self, records: &[ValuationRecord]) -> StoreResult<usize> {
        // Postgres rejects a batch that touches the same conflict key twice
        let unique: BTreeMap<IdentityKey, &ValuationRecord> =
            records.iter().map(|r| (r.identity_key(), r)).collect();
        let unique: Vec<&ValuationRecord> = unique.into_values().collect();

        let mut written = 0usize;
        for chunk in unique.chunks(UPSERT_CHUNK) {
            written += self.upsert_chunk(chunk).await?;
        }
        Ok(written)
    }

    async fn count(&self) -> StoreResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM valuations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

impl PgValuationStore {
    async fn upsert_chunk(&self, records: &[&ValuationRecord]) -> StoreResult<usize> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO valuations (identifier, mnemonic, issuer, instrument_type, term, \
             clean_price, dirty_price, yield_rate, duration, convexity, valuation_date, \
             maturity_date, issue_date, face_value, coupon_rate, coupon_frequency, provider, \
             source_file) ",
        );
        builder.push_values(records, |mut b, r| {
            b.push_bind(r.identifier.to_uppercase())
                .push_bind(r.mnemonic.clone())
                .push_bind(r.issuer.clone())
                .push_bind(r.instrument_type.clone())
                .push_bind(r.term.clone())
                .push_bind(r.clean_price)
                .push_bind(r.dirty_price)
                .push_bind(r.yield_rate)
                .push_bind(r.duration)
                .push_bind(r.convexity)
                .push_bind(r.valuation_date)
                .push_bind(r.maturity_date)
                .push_bind(r.issue_date)
                .push_bind(r.face_value)
                .push_bind(r.coupon_rate)
                .push_bind(r.coupon_frequency.clone())
                .push_bind(r.provider.as_str())
                .push_bind(r.source_file.clone());
        });
        builder.push(
            " ON CONFLICT (identifier, valuation_date, provider) DO UPDATE SET \
             mnemonic = EXCLUDED.mnemonic, issuer = EXCLUDED.issuer, \
             instrument_type = EXCLUDED.instrument_type, term = EXCLUDED.term, \
             clean_price = EXCLUDED.clean_price, dirty_price = EXCLUDED.dirty_price, \
             yield_rate = EXCLUDED.yield_rate, duration = EXCLUDED.duration, \
             convexity = EXCLUDED.convexity, maturity_date = EXCLUDED.maturity_date, \
             issue_date = EXCLUDED.issue_date, face_value = EXCLUDED.face_value, \
             coupon_rate = EXCLUDED.coupon_rate, coupon_frequency = EXCLUDED.coupon_frequency, \
             source_file = EXCLUDED.source_file, updated_at = NOW()",
        );

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }
}
