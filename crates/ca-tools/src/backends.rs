//! Pluggable backends behind the two fixed tools. Each tool's wire
//! behavior (arguments, success/failure text) is fixed; only where the
//! data comes from is pluggable, so callers can swap in a real web
//! search / file store without touching dispatch logic.

use async_trait::async_trait;
use ca_domain::Result;

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileReadStatus {
    Completed,
    Pending,
    Failed,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct FileReadResult {
    pub status: FileReadStatus,
    pub content: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait FileReadBackend: Send + Sync {
    async fn read(&self, file_id: &str, room_id: Option<&str>, session_id: Option<&str>) -> Result<FileReadResult>;
}

/// An HTTP-backed [`SearchBackend`] for any Tavily-compatible search API.
pub struct HttpSearchBackend {
    api_key: String,
    client: reqwest::Client,
}

impl HttpSearchBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
        });

        let resp = self
            .client
            .post("https://api.tavily.com/search")
            .json(&body)
            .send()
            .await
            .map_err(|e| ca_domain::Error::Http(e.to_string()))?;

        let payload: serde_json::Value = resp.json().await.map_err(|e| ca_domain::Error::Http(e.to_string()))?;
        let results = payload.get("results").and_then(|v| v.as_array());

        let Some(results) = results else { return Ok(Vec::new()) };

        Ok(results
            .iter()
            .filter_map(|item| item.as_object())
            .map(|item| SearchResult {
                title: item.get("title").and_then(|v| v.as_str()).unwrap_or("").trim().to_string(),
                url: item.get("url").and_then(|v| v.as_str()).unwrap_or("").trim().to_string(),
                snippet: item
                    .get("content")
                    .or_else(|| item.get("snippet"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .trim()
                    .to_string(),
            })
            .collect())
    }
}
