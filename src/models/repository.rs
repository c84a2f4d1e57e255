//! Repository descriptor exposed to federation pullers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a repository is exposed to pullers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FederationStrategy {
    /// Never offered to a puller
    Exclude,
    /// Offered under this instance's clone URL
    #[default]
    FederateThis,
    /// Offered under the recorded origin URL when there is one
    FederateOrigin,
}

/// Access restriction carried along with a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRestriction {
    #[default]
    None,
    Push,
    Clone,
    View,
}

/// A repository as seen by the federation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryModel {
    /// Repository path relative to the repositories root (e.g. `team/app.git`)
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    /// Upstream this repository was cloned from
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub federation_strategy: FederationStrategy,
    /// Named federation sets this repository belongs to
    #[serde(default)]
    pub federation_sets: Vec<String>,
    #[serde(default)]
    pub access_restriction: AccessRestriction,
    #[serde(default)]
    pub is_frozen: bool,
    #[serde(default)]
    pub last_change: Option<DateTime<Utc>>,
}

impl RepositoryModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            owner: String::new(),
            origin: None,
            federation_strategy: FederationStrategy::default(),
            federation_sets: Vec::new(),
            access_restriction: AccessRestriction::default(),
            is_frozen: false,
            last_change: None,
        }
    }

    pub fn with_strategy(mut self, strategy: FederationStrategy) -> Self {
        self.federation_strategy = strategy;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_set(mut self, set: impl Into<String>) -> Self {
        self.federation_sets.push(set.into());
        self
    }

    /// Recorded origin, ignoring blank values
    pub fn origin_url(&self) -> Option<&str> {
        self.origin
            .as_deref()
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
    }

    pub fn in_set(&self, set: &str) -> bool {
        self.federation_sets.iter().any(|s| s.eq_ignore_ascii_case(set))
    }
}
