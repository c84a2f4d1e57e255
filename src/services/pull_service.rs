//! Pull responder for `pull_repositories`, `pull_settings` and `pull_users`

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::federation::{clone_url, TokenAuthority};
use crate::models::{
    FederationError, FederationRequest, FederationResult, FederationStrategy, RepositoryModel,
    UserModel,
};
use crate::store::{RepositoryCatalog, SettingsCatalog, UserCatalog};

/// Result of a pull request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PullPayload {
    /// Clone URL to repository descriptor
    Repositories(BTreeMap<String, RepositoryModel>),
    /// Setting key to value
    Settings(BTreeMap<String, String>),
    Users(Vec<UserModel>),
}

/// Computes pull payloads from the catalogs
#[derive(Clone)]
pub struct PullService {
    repositories: Arc<dyn RepositoryCatalog>,
    users: Arc<dyn UserCatalog>,
}

impl PullService {
    pub fn new(repositories: Arc<dyn RepositoryCatalog>, users: Arc<dyn UserCatalog>) -> Self {
        Self {
            repositories,
            users,
        }
    }

    /// Answer a pull request for `token`.
    ///
    /// Fails with `Unauthorized` when the token does not reach the tier
    /// `kind` needs, and with `UnknownKind` for non-pull kinds.
    pub fn respond(
        &self,
        tokens: &TokenAuthority,
        settings: &dyn SettingsCatalog,
        kind: FederationRequest,
        token: &str,
        host_url: &str,
    ) -> FederationResult<PullPayload> {
        if !kind.is_pull() {
            return Err(FederationError::UnknownKind(kind.to_string()));
        }
        if !tokens.validate(kind, token) {
            return Err(FederationError::Unauthorized(format!(
                "token not authorized to {}",
                kind
            )));
        }

        match kind {
            FederationRequest::PullRepositories => {
                let set = tokens.grant(token).and_then(|grant| grant.set.as_deref());
                self.repository_map(host_url, set).map(PullPayload::Repositories)
            }
            FederationRequest::PullSettings => Ok(PullPayload::Settings(settings.all_settings())),
            FederationRequest::PullUsers => self.federated_users().map(PullPayload::Users),
            FederationRequest::Proposal | FederationRequest::Status => {
                Err(FederationError::UnknownKind(kind.to_string()))
            }
        }
    }

    /// Map of clone URL to repository over the whole catalog.
    ///
    /// Excluded repositories are skipped. When two repositories resolve to
    /// the same URL the one later in catalog order wins.
    pub fn repository_map(
        &self,
        host_url: &str,
        set: Option<&str>,
    ) -> FederationResult<BTreeMap<String, RepositoryModel>> {
        let mut repositories = BTreeMap::new();

        for model in self.repositories.list_repositories()? {
            if let Some(set) = set {
                if !model.in_set(set) {
                    continue;
                }
            }

            let url = match model.federation_strategy {
                FederationStrategy::Exclude => continue,
                FederationStrategy::FederateOrigin => match model.origin_url() {
                    Some(origin) => origin.to_string(),
                    None => clone_url(host_url, &model.name),
                },
                FederationStrategy::FederateThis => clone_url(host_url, &model.name),
            };

            if let Some(previous) = repositories.insert(url.clone(), model) {
                debug!("Repository {} superseded by a later entry at {}", previous.name, url);
            }
        }

        Ok(repositories)
    }

    /// Users not excluded from federation
    pub fn federated_users(&self) -> FederationResult<Vec<UserModel>> {
        Ok(self
            .users
            .list_users()?
            .into_iter()
            .filter(|user| !user.exclude_from_federation)
            .collect())
    }
}
