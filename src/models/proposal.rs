//! Federation proposals received from remote instances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{FederationToken, RepositoryModel};

/// A remote instance asking to be registered as a peer.
///
/// The repository snapshot is frozen at submission; later changes on the
/// remote need a fresh proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationProposal {
    pub id: String,
    /// Base URL of the proposing instance
    pub url: String,
    pub token_type: FederationToken,
    /// Token this instance should present when pulling from the remote
    pub token: String,
    pub repositories: BTreeMap<String, RepositoryModel>,
    pub received: DateTime<Utc>,
}

impl FederationProposal {
    pub fn new(
        url: impl Into<String>,
        token_type: FederationToken,
        token: impl Into<String>,
        repositories: BTreeMap<String, RepositoryModel>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            token_type,
            token: token.into(),
            repositories,
            received: Utc::now(),
        }
    }

    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }

    /// Host portion of the remote URL, used to name registrations
    pub fn display_name(&self) -> String {
        let trimmed = self
            .url
            .split("://")
            .nth(1)
            .unwrap_or(&self.url);
        trimmed
            .split(['/', '?'])
            .next()
            .unwrap_or(trimmed)
            .to_string()
    }
}
