//! Operator identity checks.
//!
//! Every entry point that performs an operator-only action asks a single
//! injected [`AccessPolicy`]. The default implementation is built once at
//! startup from `[operators] ids` in the settings file.

use std::collections::HashSet;

use crate::config::Settings;

/// Decides whether a platform user may act as an operator.
pub trait AccessPolicy: Send + Sync {
    fn is_operator(&self, external_user_id: &str) -> bool;
}

/// Fixed set of operator identifiers.
#[derive(Debug, Clone, Default)]
pub struct OperatorList {
    ids: HashSet<String>,
}

impl OperatorList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        Self { ids }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.operators.ids)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl AccessPolicy for OperatorList {
    fn is_operator(&self, external_user_id: &str) -> bool {
        self.ids.contains(external_user_id.trim())
    }
}
