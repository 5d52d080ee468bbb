//! In-process remote source
//!
//! Evaluates [`RemoteRequest`]s against fixed tables with the same filter
//! semantics as the REST endpoint. Used as the stand-in source when no remote
//! project is configured, and by tests (failure injection, fetch counting).

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    ColumnFilter, FilterOp, ProbedColumn, RemoteFilter, RemoteRequest, RemoteRow, RemoteSource,
};
use crate::error::{RemoteError, RemoteResult};

#[derive(Default)]
pub struct MemoryRemoteSource {
    tables: HashMap<String, Vec<RemoteRow>>,
    /// table -> number of fetches allowed to succeed before failing
    failures: HashMap<String, usize>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MemoryRemoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>, rows: Vec<RemoteRow>) -> Self {
        self.tables.insert(table.into(), rows);
        self
    }

    /// Every request against `table` fails, including the column probe
    pub fn failing(self, table: impl Into<String>) -> Self {
        self.failing_after(table, 0)
    }

    /// Fetches against `table` succeed `successes` times, then fail
    pub fn failing_after(mut self, table: impl Into<String>, successes: usize) -> Self {
        self.failures.insert(table.into(), successes);
        self
    }

    /// Data fetches issued against `table` (probes not counted)
    pub async fn fetch_count(&self, table: &str) -> usize {
        self.fetches.lock().await.get(table).copied().unwrap_or(0)
    }

    pub async fn total_fetches(&self) -> usize {
        self.fetches.lock().await.values().sum()
    }

    fn rows(&self, table: &str) -> RemoteResult<&Vec<RemoteRow>> {
        self.tables.get(table).ok_or_else(|| RemoteError::UnknownTable {
            table: table.to_string(),
        })
    }

    fn injected(table: &str) -> RemoteError {
        RemoteError::Http {
            table: table.to_string(),
            status: 503,
            body: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl RemoteSource for MemoryRemoteSource {
    async fn probe_columns(&self, table: &str) -> RemoteResult<Vec<ProbedColumn>> {
        if self.failures.get(table) == Some(&0) {
            return Err(Self::injected(table));
        }
        // Every key of every row, sampled from the first non-null cell
        let rows = self.rows(table)?;
        let mut columns: Vec<ProbedColumn> = Vec::new();
        for row in rows {
            for (key, value) in row {
                match columns.iter_mut().find(|c| c.name == *key) {
                    Some(column) if column.sample.is_null() => column.sample = value.clone(),
                    Some(_) => {}
                    None => columns.push(ProbedColumn::new(key.clone(), value.clone())),
                }
            }
        }
        Ok(columns)
    }

    async fn fetch(&self, table: &str, request: &RemoteRequest) -> RemoteResult<Vec<RemoteRow>> {
        let attempt = {
            let mut fetches = self.fetches.lock().await;
            let count = fetches.entry(table.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(successes) = self.failures.get(table) {
            if attempt > *successes {
                return Err(Self::injected(table));
            }
        }

        let mut rows: Vec<&RemoteRow> = self
            .rows(table)?
            .iter()
            .filter(|row| request.filters.iter().all(|f| filter_matches(f, row)))
            .collect();

        for (column, descending) in request.order.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(column), b.get(column));
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        let offset = request.offset.unwrap_or(0);
        let limit = request.limit.unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, &request.select))
            .collect())
    }
}

fn project(row: &RemoteRow, select: &[String]) -> RemoteRow {
    if select.is_empty() {
        return row.clone();
    }
    row.iter()
        .filter(|(k, _)| select.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn filter_matches(filter: &RemoteFilter, row: &RemoteRow) -> bool {
    match filter {
        RemoteFilter::Column(f) => column_matches(f, row),
        RemoteFilter::AnyOf(group) => group.iter().any(|f| column_matches(f, row)),
    }
}

fn column_matches(filter: &ColumnFilter, row: &RemoteRow) -> bool {
    let Some(value) = row.get(&filter.column).and_then(value_text) else {
        return false;
    };
    match &filter.op {
        FilterOp::Eq(expected) => scalar_cmp(&value, expected) == Some(Ordering::Equal),
        FilterOp::In(options) => options
            .iter()
            .any(|o| scalar_cmp(&value, o) == Some(Ordering::Equal)),
        FilterOp::Like(pattern) => glob_matches(pattern, &value),
        FilterOp::ILike(pattern) => glob_matches(&pattern.to_lowercase(), &value.to_lowercase()),
        FilterOp::Gte(bound) => matches!(
            scalar_cmp(&value, bound),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lte(bound) => matches!(
            scalar_cmp(&value, bound),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numeric comparison when both sides are numbers, text comparison otherwise
/// (ISO dates order correctly as text)
fn scalar_cmp(value: &str, operand: &str) -> Option<Ordering> {
    match (value.trim().parse::<f64>(), operand.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(value.cmp(operand)),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.and_then(value_text);
    let b = b.and_then(value_text);
    match (a, b) {
        (Some(a), Some(b)) => scalar_cmp(&a, &b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// `*` and `%` match any run of characters
fn glob_matches(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split(['*', '%']).collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}
