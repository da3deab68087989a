//! Shared application state and its construction from configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use imigra_core::{AccessPolicy, Config, OperatorList};
use imigra_db::{DbError, DeskDbPool};
use tracing::info;

use crate::answerer::{AnswererSettings, RetrievalAugmentedAnswerer};
use crate::desk::DeskService;
use crate::history::ConversationHistory;
use crate::knowledge::{KnowledgeStore, RetrievalBounds};
use crate::providers::ProviderError;
use crate::providers::registry::{build_answer_provider, build_embedding_provider};
use crate::web::search::{SearchDepth, SearchError, TavilySearchProvider, WebSearchClient};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("database: {0}")]
    Db(#[from] DbError),

    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("web search: {0}")]
    Search(#[from] SearchError),
}

pub struct AppState {
    pub desk: DeskService,
    pub access: Arc<dyn AccessPolicy>,
    /// Depth used when a request does not pick one
    pub search_depth: SearchDepth,
}

impl AppState {
    pub fn new(desk: DeskService, access: Arc<dyn AccessPolicy>) -> Self {
        Self {
            desk,
            access,
            search_depth: SearchDepth::default(),
        }
    }

    pub fn with_search_depth(mut self, depth: SearchDepth) -> Self {
        self.search_depth = depth;
        self
    }

    /// Open the database and wire every component from `config`.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let db = open_database(config).await?;
        let knowledge = knowledge_store(config, db.clone())?;

        let answering = &config.settings.answering;
        let web = &config.settings.web_search;
        let mut answerer = RetrievalAugmentedAnswerer::new(
            knowledge,
            ConversationHistory::new(db.clone()),
            build_answer_provider(config)?,
        )
        .with_settings(AnswererSettings {
            history_limit: answering.history_limit,
            history_window: Duration::from_secs(answering.history_window_hours * 3600),
            web_max_results: web.max_results,
        });

        if let Some(client) = web_search_client(config)? {
            answerer = answerer.with_web_search(Arc::new(client));
        }

        let operators = OperatorList::from_settings(&config.settings);
        if operators.is_empty() {
            tracing::warn!("no operators configured; escalated questions cannot be answered");
        }
        info!(operators = operators.len(), "access policy ready");

        let search_depth = web.search_depth.parse().unwrap_or_default();
        let desk = DeskService::new(db, answerer, answering.confidence_threshold);
        Ok(Self::new(desk, Arc::new(operators)).with_search_depth(search_depth))
    }
}

pub async fn open_database(config: &Config) -> Result<DeskDbPool, DbError> {
    let path = config.settings.database.path.as_deref().map(Path::new);
    DeskDbPool::new(path, config.settings.embedding.dimension).await
}

pub fn knowledge_store(config: &Config, db: DeskDbPool) -> Result<KnowledgeStore, ProviderError> {
    let answering = &config.settings.answering;
    Ok(
        KnowledgeStore::new(db, build_embedding_provider(config)?).with_bounds(RetrievalBounds {
            top_k: answering.top_k,
            max_distance: answering.max_distance,
        }),
    )
}

fn web_search_client(config: &Config) -> Result<Option<WebSearchClient>, SearchError> {
    if !config.web_search_enabled() {
        info!("web search disabled");
        return Ok(None);
    }
    let Some(api_key) = config.tavily_api_key() else {
        return Ok(None);
    };

    let settings = &config.settings.web_search;
    let mut provider = TavilySearchProvider::new(
        api_key.to_string(),
        Duration::from_secs(settings.timeout_seconds),
    )?;
    if let Some(base_url) = &settings.base_url {
        provider = provider.with_base_url(base_url.clone());
    }

    info!(
        max_results = settings.max_results,
        cache_ttl_minutes = settings.cache_ttl_minutes,
        "web search enabled"
    );
    Ok(Some(WebSearchClient::new(
        Arc::new(provider),
        Duration::from_secs(settings.cache_ttl_minutes * 60),
        settings.cache_capacity,
    )))
}
