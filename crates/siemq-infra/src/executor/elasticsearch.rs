//! Elasticsearch / OpenSearch executor for Wazuh alert indices.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use siemq_core::{BackendConfig, SchemaRegistry, StructuredQuery};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{event::SecurityEvent, ExecutionError, ExecutionOutput, QueryExecutor};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    took: u64,
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// `hits.total` is a bare number before ES 7 and an object after.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_index", default)]
    index: Option<String>,
    #[serde(rename = "_source", default)]
    source: Value,
}

/// HTTP client for a Wazuh-shaped search index
pub struct ElasticsearchExecutor {
    client: Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
    schema: Arc<SchemaRegistry>,
}

impl ElasticsearchExecutor {
    pub fn new(
        base_url: impl Into<String>,
        index: impl Into<String>,
        schema: Arc<SchemaRegistry>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
            username: None,
            password: None,
            schema,
        }
    }

    pub fn from_config(config: &BackendConfig, schema: Arc<SchemaRegistry>) -> Result<Self, ExecutionError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| ExecutionError::unreachable("backend.url is required for elasticsearch"))?;

        let mut executor = Self::new(url, config.index.clone(), schema);
        if let Some(username) = &config.username {
            executor = executor.with_credentials(username.clone(), config.password.clone());
        }
        Ok(executor)
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn search_url(&self) -> String {
        format!("{}/{}/_search", self.base_url, self.index)
    }

    fn build_output(&self, response: SearchResponse) -> ExecutionOutput {
        let total_hits = match response.hits.total {
            Some(TotalHits::Count(n)) | Some(TotalHits::Object { value: n }) => n,
            None => response.hits.hits.len() as u64,
        };

        let mut indices = BTreeSet::new();
        let mut events = Vec::with_capacity(response.hits.hits.len());
        for (i, hit) in response.hits.hits.iter().enumerate() {
            if let Some(index) = &hit.index {
                indices.insert(index.clone());
            }
            let fallback_id = hit.id.clone().unwrap_or_else(|| format!("hit-{}", i + 1));
            match SecurityEvent::from_wazuh(&hit.source, &fallback_id) {
                Ok(mut event) => {
                    if let Some(id) = &hit.id {
                        event.id = id.clone();
                    }
                    events.push(event);
                }
                Err(e) => warn!(hit = %fallback_id, error = %e, "Skipping unparseable hit"),
            }
        }

        let indices = if indices.is_empty() {
            vec![self.index.clone()]
        } else {
            indices.into_iter().collect()
        };

        ExecutionOutput {
            events,
            total_hits,
            took_ms: response.took,
            indices,
        }
    }
}

#[async_trait]
impl QueryExecutor for ElasticsearchExecutor {
    #[instrument(skip(self, query), fields(index = %self.index, size = query.size))]
    async fn execute(&self, query: &StructuredQuery) -> Result<ExecutionOutput, ExecutionError> {
        let url = self.search_url();
        let body = query.to_dsl(&self.schema);
        debug!(url = %url, "Sending search request");

        let mut request = self.client.post(&url).json(&body);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(ExecutionError::bad_response(format!(
                "search failed with status {}: {}",
                status, snippet
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ExecutionError::bad_response(e.to_string()))?;

        let output = self.build_output(parsed);
        debug!(
            total_hits = output.total_hits,
            returned = output.events.len(),
            took_ms = output.took_ms,
            "Search complete"
        );
        Ok(output)
    }

    fn name(&self) -> &str {
        "elasticsearch"
    }
}
