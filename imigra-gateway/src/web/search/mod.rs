use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::web::cache::{Clock, SystemClock, TimedCache};

pub mod tavily;

pub use tavily::TavilySearchProvider;

const MAX_EXCERPT_CHARS: usize = 300;
const MAX_CONTEXT_CHARS: usize = 2000;

/// How thorough the provider search should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for SearchDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(SearchDepth::Basic),
            "advanced" => Ok(SearchDepth::Advanced),
            _ => Err(format!("Unknown search depth: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchQuery {
    pub query: String,
    pub max_results: usize,
    pub depth: SearchDepth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchResponse {
    /// Provider generated summary, when offered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub results: Vec<WebSearchResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("missing API key ({0})")]
    MissingApiKey(&'static str),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &WebSearchQuery) -> Result<WebSearchResponse, SearchError>;
}

/// Web search with formatting and a per-query TTL cache.
///
/// Every failure is logged and turned into `None`; only successful
/// results are cached.
pub struct WebSearchClient {
    provider: Arc<dyn SearchProvider>,
    cache: TimedCache<String, String>,
}

impl WebSearchClient {
    pub fn new(provider: Arc<dyn SearchProvider>, cache_ttl: Duration, capacity: usize) -> Self {
        Self::with_clock(provider, cache_ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: Arc<dyn SearchProvider>,
        cache_ttl: Duration,
        capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            cache: TimedCache::with_clock(cache_ttl, capacity, clock),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: SearchDepth,
    ) -> Option<String> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        if let Some(cached) = self.cache.get(&query.to_string()).await {
            debug!(query, "web search cache hit");
            return Some(cached);
        }

        let request = WebSearchQuery {
            query: query.to_string(),
            max_results,
            depth,
        };

        let response = match self.provider.search(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, query, "web search failed");
                return None;
            }
        };

        let formatted = format_results(&response, max_results)?;
        self.cache.set(query.to_string(), formatted.clone()).await;
        Some(formatted)
    }
}

/// Render a response as model context. `None` when there is nothing to show.
pub fn format_results(response: &WebSearchResponse, max_results: usize) -> Option<String> {
    let mut sections = Vec::new();

    if let Some(answer) = response
        .answer
        .as_deref()
        .map(str::trim)
        .filter(|answer| !answer.is_empty())
    {
        sections.push(format!("Summary: {answer}"));
    }

    for (idx, result) in response.results.iter().take(max_results).enumerate() {
        let mut block = format!("{}. {}", idx + 1, result.title.trim());
        if let Some(content) = result
            .content
            .as_deref()
            .map(str::trim)
            .filter(|content| !content.is_empty())
        {
            block.push('\n');
            block.push_str(&truncate_chars(content, MAX_EXCERPT_CHARS));
        }
        block.push_str("\nSource: ");
        block.push_str(result.url.trim());
        sections.push(block);
    }

    if sections.is_empty() {
        return None;
    }

    Some(truncate_chars(&sections.join("\n\n"), MAX_CONTEXT_CHARS))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
