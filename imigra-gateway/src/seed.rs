//! Loading curated Q&A pairs into the knowledge base.
//!
//! Seed files are TOML:
//!
//! ```toml
//! [[entries]]
//! question = "Что такое виза D7?"
//! answer = "Виза для лиц с пассивным доходом."
//! ```

use std::path::Path;

use imigra_db::KnowledgeSource;
use serde::Deserialize;
use tracing::{info, warn};

use crate::knowledge::{KnowledgeError, KnowledgeStore};

#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub entries: Vec<SeedEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse seed file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to store entry {index}: {source}")]
    Store {
        index: usize,
        #[source]
        source: KnowledgeError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub stored: usize,
    pub skipped: usize,
}

impl SeedFile {
    pub fn from_toml(content: &str) -> Result<Self, SeedError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

/// Upsert every entry as a verified manual entry. Blank entries are skipped.
pub async fn seed_knowledge(
    store: &KnowledgeStore,
    seed: &SeedFile,
) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();
    for (index, entry) in seed.entries.iter().enumerate() {
        let question = entry.question.trim();
        let answer = entry.answer.trim();
        if question.is_empty() || answer.is_empty() {
            warn!(index, "skipping seed entry with empty question or answer");
            report.skipped += 1;
            continue;
        }
        store
            .upsert(question, answer, KnowledgeSource::Manual, true)
            .await
            .map_err(|source| SeedError::Store { index, source })?;
        report.stored += 1;
    }
    info!(stored = report.stored, skipped = report.skipped, "knowledge seeded");
    Ok(report)
}
