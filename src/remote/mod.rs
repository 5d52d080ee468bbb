//! Remote Source Accessor
//!
//! Reads the two provider tables through a table-oriented REST endpoint. The
//! accessor owns everything provider-specific on the way out: table names,
//! column discovery, request construction with the provisional tolerance
//! bands, and pagination. Rows come back untyped; turning them into
//! [`ValuationRecord`](valuation_types::ValuationRecord)s is the projector's job.

pub mod columns;
pub mod memory;
pub mod paged;
pub mod postgrest;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use valuation_types::{IdentifierFilter, Provider, SearchQuery};

use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::normalize::{normalize_identifier, REMOTE_COUPON_TOLERANCE, REMOTE_DATE_TOLERANCE_DAYS};

pub use columns::{ColumnCatalog, ColumnKind, LogicalColumn, ProbedColumn};
pub use memory::MemoryRemoteSource;
pub use paged::{PageStop, PagedFetch, PagedRows};
pub use postgrest::PostgrestSource;

/// One untyped row as returned by the remote endpoint
pub type RemoteRow = Map<String, Value>;

// ============================================================================
// REQUEST MODEL
// ============================================================================

/// Comparison applied to one column. Pattern values use `*` as the wildcard.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(String),
    Like(String),
    ILike(String),
    Gte(String),
    Lte(String),
    In(Vec<String>),
}

impl FilterOp {
    /// `op.value` operand syntax
    pub fn render(&self) -> String {
        match self {
            FilterOp::Eq(v) => format!("eq.{}", v),
            FilterOp::Like(v) => format!("like.{}", v),
            FilterOp::ILike(v) => format!("ilike.{}", v),
            FilterOp::Gte(v) => format!("gte.{}", v),
            FilterOp::Lte(v) => format!("lte.{}", v),
            FilterOp::In(values) => format!(
                "in.({})",
                values.iter().map(|v| quote_reserved(v)).collect::<Vec<_>>().join(",")
            ),
        }
    }

    /// Same operand inside a logical group, where values with reserved
    /// characters must be quoted
    fn render_grouped(&self) -> String {
        match self {
            FilterOp::Eq(v) => format!("eq.{}", quote_reserved(v)),
            FilterOp::Like(v) => format!("like.{}", quote_reserved(v)),
            FilterOp::ILike(v) => format!("ilike.{}", quote_reserved(v)),
            FilterOp::Gte(v) => format!("gte.{}", quote_reserved(v)),
            FilterOp::Lte(v) => format!("lte.{}", quote_reserved(v)),
            FilterOp::In(_) => self.render(),
        }
    }
}

fn quote_reserved(value: &str) -> String {
    if value.chars().any(|c| matches!(c, ',' | '.' | ':' | '(' | ')' | '"' | ' ')) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// A column condition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    pub column: String,
    pub op: FilterOp,
}

impl ColumnFilter {
    pub fn new(column: impl Into<String>, op: FilterOp) -> Self {
        Self {
            column: column.into(),
            op,
        }
    }
}

/// Conjunct of a request: one column condition or an OR-group
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteFilter {
    Column(ColumnFilter),
    AnyOf(Vec<ColumnFilter>),
}

/// A single read against one table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteRequest {
    /// Columns to return; empty means all
    pub select: Vec<String>,
    pub filters: Vec<RemoteFilter>,
    /// `(column, descending)`
    pub order: Vec<(String, bool)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl RemoteRequest {
    pub fn filter(mut self, column: impl Into<String>, op: FilterOp) -> Self {
        self.filters.push(RemoteFilter::Column(ColumnFilter::new(column, op)));
        self
    }

    pub fn any_of(mut self, group: Vec<ColumnFilter>) -> Self {
        match group.len() {
            0 => {}
            1 => self.filters.extend(group.into_iter().map(RemoteFilter::Column)),
            _ => self.filters.push(RemoteFilter::AnyOf(group)),
        }
        self
    }

    /// Copy of this request restricted to one page
    pub fn page(&self, offset: usize, limit: usize) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
            ..self.clone()
        }
    }

    /// Query-string pairs in REST filter syntax
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let select = if self.select.is_empty() {
            "*".to_string()
        } else {
            self.select.join(",")
        };
        pairs.push(("select".to_string(), select));

        for filter in &self.filters {
            match filter {
                RemoteFilter::Column(f) => pairs.push((f.column.clone(), f.op.render())),
                RemoteFilter::AnyOf(group) => {
                    let inner = group
                        .iter()
                        .map(|f| format!("{}.{}", f.column, f.op.render_grouped()))
                        .collect::<Vec<_>>()
                        .join(",");
                    pairs.push(("or".to_string(), format!("({})", inner)));
                }
            }
        }

        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(col, desc)| format!("{}.{}", col, if *desc { "desc" } else { "asc" }))
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        pairs
    }
}

// ============================================================================
// COLLABORATOR CONTRACT
// ============================================================================

/// Table-oriented read endpoint
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Physical columns of a table with one sampled value each (empty when
    /// the table has no rows)
    async fn probe_columns(&self, table: &str) -> RemoteResult<Vec<ProbedColumn>>;

    async fn fetch(&self, table: &str, request: &RemoteRequest) -> RemoteResult<Vec<RemoteRow>>;
}

// ============================================================================
// CRITERIA
// ============================================================================

/// How the remote tier should select rows by identity
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteIdentity {
    Any,
    Identifiers(Vec<String>),
    Mnemonic(String),
}

/// Provider-neutral remote selection, derived from a [`SearchQuery`]
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCriteria {
    pub identity: RemoteIdentity,
    pub valuation_date: Option<NaiveDate>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub issuer: Option<String>,
    pub instrument_type: Option<String>,
    pub maturity_date: Option<NaiveDate>,
    pub coupon_rate: Option<f64>,
}

impl RemoteCriteria {
    pub fn from_query(query: &SearchQuery) -> Self {
        let identity = match &query.identifier {
            IdentifierFilter::None => RemoteIdentity::Any,
            IdentifierFilter::Exact(id) => {
                RemoteIdentity::Identifiers(normalize_identifier(id).into_iter().collect())
            }
            IdentifierFilter::List(ids) => RemoteIdentity::Identifiers(
                ids.iter().filter_map(|i| normalize_identifier(i)).collect(),
            ),
            IdentifierFilter::Mnemonic(code) => RemoteIdentity::Mnemonic(code.trim().to_string()),
        };
        Self {
            identity,
            valuation_date: query.valuation_date,
            date_from: query.date_from,
            date_to: query.date_to,
            issuer: query.issuer.clone(),
            instrument_type: query.instrument_type.clone(),
            maturity_date: query.maturity_date,
            coupon_rate: query.coupon_rate,
        }
    }

    /// Same attribute filters, different identity selection
    pub fn with_identifiers(&self, identifiers: Vec<String>) -> Self {
        Self {
            identity: RemoteIdentity::Identifiers(identifiers),
            ..self.clone()
        }
    }

    /// Build the request for one table, using the two-tier tolerance bands
    pub fn to_request(&self, table: &str, catalog: &ColumnCatalog) -> RemoteResult<RemoteRequest> {
        let column = |logical: LogicalColumn| -> RemoteResult<String> {
            catalog
                .get(logical)
                .map(str::to_string)
                .ok_or_else(|| RemoteError::MissingColumn {
                    table: table.to_string(),
                    column: logical.label().to_string(),
                })
        };

        let mut request = RemoteRequest {
            select: catalog.physical_names().into_iter().map(str::to_string).collect(),
            ..Default::default()
        };

        match &self.identity {
            RemoteIdentity::Any => {}
            RemoteIdentity::Identifiers(ids) if ids.len() == 1 => {
                request = request.filter(column(LogicalColumn::Identifier)?, FilterOp::Eq(ids[0].clone()));
            }
            RemoteIdentity::Identifiers(ids) => {
                request = request.filter(column(LogicalColumn::Identifier)?, FilterOp::In(ids.clone()));
            }
            RemoteIdentity::Mnemonic(code) => {
                let pattern = format!("*{}*", code);
                let group: Vec<ColumnFilter> = [
                    LogicalColumn::Mnemonic,
                    LogicalColumn::Issuer,
                    LogicalColumn::InstrumentType,
                ]
                .iter()
                .filter_map(|c| catalog.get(*c))
                .map(|name| ColumnFilter::new(name, FilterOp::ILike(pattern.clone())))
                .collect();
                if group.is_empty() {
                    return Err(RemoteError::MissingColumn {
                        table: table.to_string(),
                        column: LogicalColumn::Mnemonic.label().to_string(),
                    });
                }
                request = request.any_of(group);
            }
        }

        let has_dates = self.valuation_date.is_some() || self.date_from.is_some() || self.date_to.is_some();
        if has_dates {
            let date_col = column(LogicalColumn::ValuationDate)?;
            if let Some(date) = self.valuation_date {
                request = request.filter(date_col.clone(), FilterOp::Eq(date.to_string()));
            }
            if let Some(date) = self.date_from {
                request = request.filter(date_col.clone(), FilterOp::Gte(date.to_string()));
            }
            if let Some(date) = self.date_to {
                request = request.filter(date_col, FilterOp::Lte(date.to_string()));
            }
        }

        if let Some(issuer) = self.issuer.as_deref().filter(|s| !s.trim().is_empty()) {
            request = request.filter(
                column(LogicalColumn::Issuer)?,
                FilterOp::ILike(format!("*{}*", issuer.trim())),
            );
        }
        if let Some(kind) = self.instrument_type.as_deref().filter(|s| !s.trim().is_empty()) {
            request = request.filter(
                column(LogicalColumn::InstrumentType)?,
                FilterOp::ILike(format!("*{}*", kind.trim())),
            );
        }

        // Provisional bands; the resolver re-applies the exact ones after
        // projection. Columns whose cells do not order correctly as stored
        // are left to that exact pass.
        if let (Some(maturity), Some(col)) = (self.maturity_date, catalog.get(LogicalColumn::MaturityDate)) {
            if catalog.kind(LogicalColumn::MaturityDate) == ColumnKind::IsoDate {
                let band = ChronoDuration::days(REMOTE_DATE_TOLERANCE_DAYS);
                request = request
                    .filter(col, FilterOp::Gte((maturity - band).to_string()))
                    .filter(col, FilterOp::Lte((maturity + band).to_string()));
            } else {
                debug!("{}: maturity column {} not ISO dates, filtering after projection", table, col);
            }
        }
        if let (Some(coupon), Some(col)) = (self.coupon_rate, catalog.get(LogicalColumn::CouponRate)) {
            if catalog.kind(LogicalColumn::CouponRate) == ColumnKind::Numeric {
                request = request
                    .filter(col, FilterOp::Gte(format!("{:.4}", coupon - REMOTE_COUPON_TOLERANCE)))
                    .filter(col, FilterOp::Lte(format!("{:.4}", coupon + REMOTE_COUPON_TOLERANCE)));
            } else {
                debug!("{}: coupon column {} not numeric, filtering after projection", table, col);
            }
        }

        // Offset paging needs a total order; many rows share one valuation date
        if let Some(col) = catalog.get(LogicalColumn::ValuationDate) {
            request.order.push((col.to_string(), true));
        }
        for tie_breaker in [LogicalColumn::Identifier, LogicalColumn::Mnemonic] {
            if let Some(col) = catalog.get(tie_breaker) {
                request.order.push((col.to_string(), false));
            }
        }
        Ok(request)
    }
}

// ============================================================================
// ACCESSOR
// ============================================================================

/// Raw rows fetched from one provider table
#[derive(Debug, Clone)]
pub struct RemoteBatch {
    pub provider: Provider,
    pub table: String,
    pub catalog: ColumnCatalog,
    pub rows: Vec<RemoteRow>,
    pub pages: usize,
    /// Pagination stopped on an error after at least one page
    pub partial: bool,
}

/// Provider-aware front end over a [`RemoteSource`]
pub struct RemoteAccessor {
    source: Arc<dyn RemoteSource>,
    config: RemoteConfig,
    catalogs: RwLock<HashMap<String, ColumnCatalog>>,
}

impl RemoteAccessor {
    pub fn new(source: Arc<dyn RemoteSource>, config: RemoteConfig) -> Self {
        Self {
            source,
            config,
            catalogs: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Column catalog for a table, probing once and caching non-empty results
    pub async fn catalog(&self, table: &str) -> RemoteResult<ColumnCatalog> {
        if let Some(catalog) = self.catalogs.read().await.get(table) {
            return Ok(catalog.clone());
        }
        let columns = self.source.probe_columns(table).await?;
        let catalog = ColumnCatalog::from_probe(&columns);
        debug!(
            "Probed table {}: {} columns, {} recognised",
            table,
            columns.len(),
            catalog.len()
        );
        if !catalog.is_empty() {
            self.catalogs
                .write()
                .await
                .insert(table.to_string(), catalog.clone());
        }
        Ok(catalog)
    }

    /// Fetch every page matching `criteria` from one provider's table.
    ///
    /// Failures are logged here with provider, table and parameters; the
    /// caller decides whether to degrade.
    pub async fn fetch_provider(
        &self,
        provider: Provider,
        criteria: &RemoteCriteria,
    ) -> RemoteResult<RemoteBatch> {
        let table = self.config.table_for(provider).to_string();
        let result = self.fetch_table(provider, &table, criteria).await;
        if let Err(e) = &result {
            error!(
                provider = %provider,
                table = %table,
                kind = e.kind(),
                criteria = ?criteria,
                "Remote fetch failed: {}",
                e
            );
        }
        result
    }

    async fn fetch_table(
        &self,
        provider: Provider,
        table: &str,
        criteria: &RemoteCriteria,
    ) -> RemoteResult<RemoteBatch> {
        let nothing_to_select =
            matches!(&criteria.identity, RemoteIdentity::Identifiers(ids) if ids.is_empty());
        let catalog = if nothing_to_select {
            ColumnCatalog::default()
        } else {
            self.catalog(table).await?
        };
        if catalog.is_empty() {
            debug!("Table {} returned no columns; treating as empty", table);
            return Ok(RemoteBatch {
                provider,
                table: table.to_string(),
                catalog,
                rows: Vec::new(),
                pages: 0,
                partial: false,
            });
        }

        let request = criteria.to_request(table, &catalog)?;
        let paged = PagedFetch::new(self.source.as_ref(), table, request)
            .with_limits(self.config.page_size, self.config.max_pages, self.config.max_rows)
            .collect_all()
            .await;

        let partial = match paged.error {
            Some(e) if paged.pages == 0 => return Err(e),
            Some(e) => {
                warn!(
                    provider = %provider,
                    table = %table,
                    "Pagination failed after {} pages, keeping {} rows: {}",
                    paged.pages,
                    paged.rows.len(),
                    e
                );
                true
            }
            None => false,
        };

        debug!(
            "Fetched {} rows from {} in {} pages ({:?})",
            paged.rows.len(),
            table,
            paged.pages,
            paged.stop
        );
        Ok(RemoteBatch {
            provider,
            table: table.to_string(),
            catalog,
            rows: paged.rows,
            pages: paged.pages,
            partial,
        })
    }

    /// Identifiers sharing a prefix with `reference`, most similar first.
    ///
    /// Searches both provider tables; a table that fails is skipped.
    pub async fn similar_identifiers(&self, reference: &str, limit: usize) -> Vec<String> {
        let Some(reference) = normalize_identifier(reference) else {
            return Vec::new();
        };
        let prefix: String = reference.chars().take(SIMILAR_PREFIX_LEN).collect();

        let lookups = Provider::ALL.iter().map(|provider| {
            let table = self.config.table_for(*provider).to_string();
            let prefix = prefix.clone();
            async move {
                match self.prefix_search(&table, &prefix).await {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(table = %table, "Similar-identifier search failed: {}", e);
                        Vec::new()
                    }
                }
            }
        });

        let mut candidates: Vec<String> = join_all(lookups).await.into_iter().flatten().collect();
        candidates.sort();
        candidates.dedup();
        candidates.retain(|c| *c != reference);

        let mut scored: Vec<(f64, String)> = candidates
            .into_iter()
            .map(|c| (strsim::jaro_winkler(&reference, &c), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.into_iter().take(limit).map(|(_, c)| c).collect()
    }

    async fn prefix_search(&self, table: &str, prefix: &str) -> RemoteResult<Vec<String>> {
        let catalog = self.catalog(table).await?;
        let Some(id_col) = catalog.get(LogicalColumn::Identifier) else {
            return Err(RemoteError::MissingColumn {
                table: table.to_string(),
                column: LogicalColumn::Identifier.label().to_string(),
            });
        };
        let request = RemoteRequest {
            select: vec![id_col.to_string()],
            limit: Some(SIMILAR_SCAN_LIMIT),
            ..Default::default()
        }
        .filter(id_col, FilterOp::Like(format!("{}*", prefix)));

        let rows = self.source.fetch(table, &request).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(id_col))
            .filter_map(Value::as_str)
            .filter_map(normalize_identifier)
            .collect())
    }
}

/// Characters of the reference identifier used for the prefix search
const SIMILAR_PREFIX_LEN: usize = 6;

/// Rows scanned per table for similar identifiers
const SIMILAR_SCAN_LIMIT: usize = 50;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn catalog() -> ColumnCatalog {
        ColumnCatalog::from_probe(&ProbedColumn::from_row(
            json!({
                "ISIN": "COB07CDOPY71",
                "NEMOTECNICO": "CDTBGAS0V",
                "EMISOR": "BANCO EJEMPLO",
                "TIPO_INSTRUMENTO": "CDT",
                "FECHA_VALORACION": "2025-06-03",
                "FECHA_VENCIMIENTO": "2027-08-30",
                "TASA_FACIAL": 8.85,
            })
            .as_object()
            .unwrap(),
        ))
    }

    /// Same table with the cells a spreadsheet export leaves behind
    fn text_catalog() -> ColumnCatalog {
        ColumnCatalog::from_probe(&ProbedColumn::from_row(
            json!({
                "ISIN": "COB07CDOPY71",
                "NEMOTECNICO": "CDTBGAS0V",
                "FECHA_VALORACION": "03/06/2025",
                "FECHA_VENCIMIENTO": "30/08/2027",
                "TASA_FACIAL": "8,85%",
            })
            .as_object()
            .unwrap(),
        ))
    }

    #[test]
    fn test_mnemonic_request_uses_or_group() {
        let mut query = SearchQuery::mnemonic("CDTBGAS0V");
        query.maturity_date = Some(d(2027, 8, 30));
        let request = RemoteCriteria::from_query(&query)
            .to_request("BD_PIP", &catalog())
            .unwrap();
        let pairs = request.query_pairs();

        assert!(pairs.contains(&(
            "or".to_string(),
            "(NEMOTECNICO.ilike.*CDTBGAS0V*,EMISOR.ilike.*CDTBGAS0V*,TIPO_INSTRUMENTO.ilike.*CDTBGAS0V*)"
                .to_string()
        )));
        assert!(pairs.contains(&("FECHA_VENCIMIENTO".to_string(), "gte.2027-08-29".to_string())));
        assert!(pairs.contains(&("FECHA_VENCIMIENTO".to_string(), "lte.2027-08-31".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "ISIN"));
        assert_eq!(
            request.order,
            vec![
                ("FECHA_VALORACION".to_string(), true),
                ("ISIN".to_string(), false),
                ("NEMOTECNICO".to_string(), false),
            ]
        );
        assert!(pairs.contains(&(
            "order".to_string(),
            "FECHA_VALORACION.desc,ISIN.asc,NEMOTECNICO.asc".to_string()
        )));
    }

    #[test]
    fn test_text_columns_get_no_remote_bands() {
        let mut query = SearchQuery::mnemonic("CDTBGAS0V");
        query.maturity_date = Some(d(2027, 8, 30));
        query.coupon_rate = Some(8.85);
        let pairs = RemoteCriteria::from_query(&query)
            .to_request("BD_Precia", &text_catalog())
            .unwrap()
            .query_pairs();
        assert!(!pairs.iter().any(|(k, _)| k == "FECHA_VENCIMIENTO" || k == "TASA_FACIAL"));
        assert!(pairs.iter().any(|(k, _)| k == "or"));
    }

    #[test]
    fn test_coupon_uses_wide_band() {
        let mut query = SearchQuery::exact("COB07CDOPY71");
        query.coupon_rate = Some(8.85);
        let pairs = RemoteCriteria::from_query(&query)
            .to_request("BD_PIP", &catalog())
            .unwrap()
            .query_pairs();
        assert!(pairs.contains(&("ISIN".to_string(), "eq.COB07CDOPY71".to_string())));
        assert!(pairs.contains(&("TASA_FACIAL".to_string(), "gte.8.8300".to_string())));
        assert!(pairs.contains(&("TASA_FACIAL".to_string(), "lte.8.8700".to_string())));
    }

    #[test]
    fn test_identifier_list_renders_in() {
        let query = SearchQuery {
            identifier: IdentifierFilter::List(vec!["COB07CDOPY71".into(), "COB01CD0A1B2".into()]),
            ..Default::default()
        };
        let pairs = RemoteCriteria::from_query(&query)
            .to_request("BD_PIP", &catalog())
            .unwrap()
            .query_pairs();
        assert!(pairs.contains(&("ISIN".to_string(), "in.(COB07CDOPY71,COB01CD0A1B2)".to_string())));
    }

    #[test]
    fn test_missing_identifier_column_is_an_error() {
        let catalog = ColumnCatalog::resolve(&["FECHA"]);
        let err = RemoteCriteria::from_query(&SearchQuery::exact("COB07CDOPY71"))
            .to_request("BD_Precia", &catalog)
            .unwrap_err();
        assert_eq!(err.kind(), "missing_column");
    }

    #[test]
    fn test_page_sets_limit_and_offset() {
        let request = RemoteRequest::default().page(2000, 1000);
        let pairs = request.query_pairs();
        assert_eq!(pairs[0], ("select".to_string(), "*".to_string()));
        assert!(pairs.contains(&("limit".to_string(), "1000".to_string())));
        assert!(pairs.contains(&("offset".to_string(), "2000".to_string())));
    }

    #[tokio::test]
    async fn test_similar_identifiers_ranked() {
        let rows = ["COB07CDOPY72", "COB07CDOPY71", "COB07XXXXXXX", "COT99ABCDEF1"]
            .iter()
            .map(|id| {
                json!({"ISIN": id, "FECHA_VALORACION": "2025-06-03"})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect::<Vec<_>>();
        let source = MemoryRemoteSource::new()
            .with_table("BD_PIP", rows)
            .with_table("BD_Precia", Vec::new());
        let accessor = RemoteAccessor::new(Arc::new(source), RemoteConfig::default());

        let similar = accessor.similar_identifiers("COB07CDOPY70", 5).await;
        assert_eq!(similar.first().map(String::as_str), Some("COB07CDOPY71"));
        assert!(!similar.contains(&"COT99ABCDEF1".to_string()));
    }
}
