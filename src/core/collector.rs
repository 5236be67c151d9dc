use crate::core::{Query, SearchRecord, SearchService};
use crate::domain::model::{Scalar, SearchBackend, SearchSettings};
use crate::utils::error::{LookupError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Deterministic stand-in for web search: two fixed-shape strings per query.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderSearch;

#[async_trait]
impl SearchService for PlaceholderSearch {
    async fn search(&self, query: &Query) -> Result<Vec<String>> {
        Ok(vec![
            format!("Result for {} - URL", query),
            "Snippet info from search".to_string(),
        ])
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

/// Live retrieval against a Tavily-compatible search API.
pub struct TavilySearch {
    api_key: String,
    endpoint: String,
    client: Client,
    max_results: usize,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl TavilySearch {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            endpoint: DEFAULT_TAVILY_ENDPOINT.to_string(),
            client,
            max_results: 5,
            retry_attempts: 2,
            retry_delay: Duration::from_millis(500),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    async fn search_once(&self, query: &Query) -> Result<Vec<String>> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query: query.as_str(),
            search_depth: "basic",
            max_results: self.max_results,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::RemoteError {
                service: "Tavily API".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TavilyResponse = response.json().await?;
        Ok(parsed
            .results
            .into_iter()
            .map(|hit| format!("{} - {} :: {}", hit.title, hit.url, hit.content))
            .collect())
    }
}

#[async_trait]
impl SearchService for TavilySearch {
    async fn search(&self, query: &Query) -> Result<Vec<String>> {
        let mut attempt = 0;
        loop {
            match self.search_once(query).await {
                Ok(results) => return Ok(results),
                Err(e) if attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::debug!(
                        "Search attempt {} for '{}' failed, retrying: {}",
                        attempt,
                        query,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &'static str {
        "tavily"
    }
}

pub fn search_service_from(settings: &SearchSettings) -> Result<Arc<dyn SearchService>> {
    match settings.backend {
        SearchBackend::Placeholder => Ok(Arc::new(PlaceholderSearch)),
        SearchBackend::Tavily => {
            let api_key = settings
                .api_key
                .clone()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| LookupError::MissingConfigError {
                    field: "search api key (TAVILY_API_KEY)".to_string(),
                })?;

            let mut service = TavilySearch::new(
                api_key,
                Duration::from_secs(settings.timeout_seconds),
            )?
            .with_max_results(settings.max_results)
            .with_retries(settings.retry_attempts, Duration::from_millis(500));
            if let Some(endpoint) = &settings.endpoint {
                service = service.with_endpoint(endpoint.clone());
            }
            Ok(Arc::new(service))
        }
    }
}

/// Runs one search per query and pairs the results with their entity.
///
/// Up to `concurrency` searches are in flight at once; output order always
/// matches input order. A failed search is recorded as an `Error: ...` result
/// instead of aborting the batch.
pub async fn collect<S>(
    queries: &[Query],
    entities: &[Scalar],
    service: &S,
    concurrency: usize,
) -> Result<Vec<SearchRecord>>
where
    S: SearchService + ?Sized,
{
    if queries.len() != entities.len() {
        return Err(LookupError::ValidationError {
            message: format!(
                "{} queries but {} entities; they must pair one to one",
                queries.len(),
                entities.len()
            ),
        });
    }

    tracing::info!(
        "🔎 Running {} searches via {} (up to {} at a time)",
        queries.len(),
        service.name(),
        concurrency.max(1)
    );

    let records = stream::iter(queries.iter().zip(entities.iter()))
        .map(|(query, entity)| async move {
            let results = match service.search(query).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!("Search failed for '{}': {}", query, e);
                    vec![format!("Error: {}", e.cause_message())]
                }
            };
            SearchRecord::new(entity.clone(), results)
        })
        .buffered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    Ok(records)
}
