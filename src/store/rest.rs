use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use tracing::{debug, warn};

use super::backend::ProgressBackend;
use super::errors::ProgressStoreError;
use super::retry::RetryPolicy;
use crate::config::StoreConfig;
use crate::models::{ProgressRecord, ProgressRow, SessionId};

const RECORD_COLUMNS: &str =
    "session_id,course_code,last_position,watched_seconds,total_seconds,completed,updated_at";
const UPSERT_CONFLICT_KEY: &str = "username,session_id";
const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=minimal";

/// Progress table reached through a PostgREST-style HTTP interface
#[derive(Clone)]
pub struct RestProgressBackend {
    client: reqwest::Client,
    base_url: String,
    table: String,
    headers: HeaderMap,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for RestProgressBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestProgressBackend")
            .field("base_url", &self.base_url)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl RestProgressBackend {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("Progress store base URL is not configured");
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            table: config.progress_table.clone(),
            headers: Self::standard_headers(config.api_key.as_deref())?,
            retry_policy: RetryPolicy::new(config.max_retries, 100, 5_000),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn standard_headers(api_key: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = api_key {
            headers.insert(
                "apikey",
                HeaderValue::from_str(key).context("Invalid store API key")?,
            );
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .context("Invalid store API key")?,
            );
        }

        Ok(headers)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    /// Turn a non-success response into a typed error
    async fn check_status(
        response: reqwest::Response,
        operation_name: &str,
    ) -> Result<reqwest::Response, ProgressStoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());

        warn!(
            "[{}] Error response - Status: {}, Body: {}",
            operation_name,
            status.as_u16(),
            body
        );
        Err(ProgressStoreError::from_status(
            status.as_u16(),
            body,
            retry_after,
        ))
    }

    async fn select(
        &self,
        query: Vec<(&'static str, String)>,
        operation_name: &str,
    ) -> Result<Vec<ProgressRecord>, ProgressStoreError> {
        let url = self.table_url();

        self.retry_policy
            .execute(operation_name, || async {
                debug!("[{}] GET {}", operation_name, url);

                let response = self
                    .client
                    .get(&url)
                    .headers(self.headers.clone())
                    .query(&query)
                    .send()
                    .await
                    .map_err(ProgressStoreError::from_reqwest)?;

                let response = Self::check_status(response, operation_name).await?;
                response
                    .json::<Vec<ProgressRecord>>()
                    .await
                    .map_err(|e| ProgressStoreError::Parse(e.to_string()))
            })
            .await
    }
}

/// PostgREST `in` list with every value quoted
fn in_filter(session_ids: &[SessionId]) -> String {
    let values: Vec<String> = session_ids
        .iter()
        .map(|id| format!("\"{}\"", id.as_str().replace('"', "\\\"")))
        .collect();
    format!("in.({})", values.join(","))
}

#[async_trait]
impl ProgressBackend for RestProgressBackend {
    async fn upsert(&self, row: &ProgressRow) -> Result<(), ProgressStoreError> {
        let url = self.table_url();
        debug!(
            "[upsert_progress] POST {} (session: {}, position: {})",
            url, row.session_id, row.last_position
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .header("Prefer", UPSERT_PREFER)
            .query(&[("on_conflict", UPSERT_CONFLICT_KEY)])
            .json(row)
            .send()
            .await
            .map_err(ProgressStoreError::from_reqwest)?;

        Self::check_status(response, "upsert_progress").await?;
        Ok(())
    }

    async fn fetch(
        &self,
        username: &str,
        session_id: &SessionId,
    ) -> Result<Option<ProgressRecord>, ProgressStoreError> {
        let query = vec![
            ("select", RECORD_COLUMNS.to_string()),
            ("username", format!("eq.{}", username)),
            ("session_id", format!("eq.{}", session_id)),
            ("limit", "1".to_string()),
        ];
        let mut rows = self.select(query, "load_progress").await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn fetch_many(
        &self,
        username: &str,
        session_ids: &[SessionId],
    ) -> Result<Vec<ProgressRecord>, ProgressStoreError> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = vec![
            ("select", RECORD_COLUMNS.to_string()),
            ("username", format!("eq.{}", username)),
            ("session_id", in_filter(session_ids)),
        ];
        self.select(query, "load_course_progress").await
    }
}
