//! PostgREST client for the provider tables
//!
//! `GET {base}/rest/v1/{table}?select=..&col=op.value&limit=..&offset=..`
//! authenticated with the project API key in both the `apikey` and the
//! bearer `Authorization` header.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{ProbedColumn, RemoteRequest, RemoteRow, RemoteSource};
use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};

pub struct PostgrestSource {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl PostgrestSource {
    pub fn new(base_url: &str, api_key: Option<String>, config: &RemoteConfig) -> RemoteResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            api_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    /// Build from configuration; fails when no base URL is set
    pub fn from_config(config: &RemoteConfig) -> RemoteResult<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| RemoteError::NotConfigured {
                message: "SUPABASE_URL is not set".to_string(),
            })?;
        Self::new(base_url, config.api_key.clone(), config)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.api_url, table)
    }

    async fn get(&self, table: &str, pairs: &[(String, String)]) -> RemoteResult<Vec<RemoteRow>> {
        let url = self.table_url(table);
        debug!("GET {} {:?}", url, pairs);

        let mut request = self
            .client
            .get(&url)
            .query(pairs)
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str::<Vec<RemoteRow>>(&text).map_err(|e| RemoteError::Decode {
            table: table.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl RemoteSource for PostgrestSource {
    async fn probe_columns(&self, table: &str) -> RemoteResult<Vec<ProbedColumn>> {
        let pairs = vec![
            ("select".to_string(), "*".to_string()),
            ("limit".to_string(), "1".to_string()),
        ];
        let rows = self.get(table, &pairs).await?;
        Ok(rows
            .first()
            .map(ProbedColumn::from_row)
            .unwrap_or_default())
    }

    async fn fetch(&self, table: &str, request: &RemoteRequest) -> RemoteResult<Vec<RemoteRow>> {
        self.get(table, &request.query_pairs()).await
    }
}
