//! Federation front door
//!
//! Every inbound federation call passes through [`FederationService::handle`],
//! which authenticates it and dispatches it to the pull responder, the
//! proposal intake or the status collector. Each call is one self-contained
//! transaction; no state is kept between calls apart from the stores.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::pull_service::{PullPayload, PullService};
use super::proposal_service::{ProposalService, ProposalSubmission, RegistrationDefaults};
use super::status_service::StatusService;
use crate::config::Settings;
use crate::federation::{decode_from_html, TokenAuthority};
use crate::metrics;
use crate::models::{
    FederationError, FederationRegistration, FederationRequest, FederationResult, FederationToken,
};
use crate::store::{RegistrationStore, SettingsCatalog};

/// Read-mostly configuration the engine works from.
///
/// Swapped as a whole on reload so a request never sees half of an update.
pub struct FederationConfig {
    pub enabled: bool,
    pub allow_proposals: bool,
    pub tokens: TokenAuthority,
    pub settings: Arc<dyn SettingsCatalog>,
    pub registration_defaults: RegistrationDefaults,
}

impl FederationConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enabled: settings.federation.enabled,
            allow_proposals: settings.federation.allow_proposals,
            tokens: TokenAuthority::from_settings(&settings.federation),
            settings: Arc::new(settings.clone()),
            registration_defaults: RegistrationDefaults {
                frequency: settings.federation.default_frequency.clone(),
                folder: settings.federation.default_folder.clone(),
            },
        }
    }

    /// Reason federation requests are refused, if they are
    pub fn disabled_reason(&self) -> Option<&'static str> {
        if !self.enabled {
            Some("federation.enabled is false")
        } else if self.tokens.is_empty() {
            Some("federation.uuid is not set")
        } else {
            None
        }
    }
}

impl std::fmt::Debug for FederationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationConfig")
            .field("enabled", &self.enabled)
            .field("allow_proposals", &self.allow_proposals)
            .finish()
    }
}

/// An inbound federation call, as extracted from the transport
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Raw `req` parameter
    pub req: Option<String>,
    pub token: Option<String>,
    pub token_type: Option<String>,
    /// Caller's own base URL, possibly HTML-escaped
    pub url: Option<String>,
    pub remote_addr: String,
    /// Base URL of this instance as seen by the caller
    pub host_url: String,
    pub body: Vec<u8>,
}

/// What the front door hands back to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum FederationResponse {
    Payload(PullPayload),
    /// Proposal or status accepted; no body
    Acknowledged,
}

impl FederationResponse {
    /// Pretty-printed JSON body, if the response has one
    pub fn body(&self) -> FederationResult<Option<String>> {
        match self {
            FederationResponse::Payload(payload) => Ok(Some(serde_json::to_string_pretty(payload)?)),
            FederationResponse::Acknowledged => Ok(None),
        }
    }
}

/// The single entry point of the federation protocol
pub struct FederationService {
    config: RwLock<Arc<FederationConfig>>,
    pull: PullService,
    proposals: ProposalService,
    status: StatusService,
}

impl FederationService {
    pub fn new(
        config: FederationConfig,
        pull: PullService,
        proposals: ProposalService,
        status: StatusService,
    ) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            pull,
            proposals,
            status,
        }
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<FederationConfig> {
        Arc::clone(&self.config.read())
    }

    /// Replace the configuration snapshot
    pub fn reload(&self, settings: &Settings) {
        let config = FederationConfig::from_settings(settings);
        info!(
            "Federation configuration reloaded (enabled: {}, proposals: {})",
            config.disabled_reason().is_none(),
            config.allow_proposals
        );
        *self.config.write() = Arc::new(config);
    }

    pub fn proposals(&self) -> &ProposalService {
        &self.proposals
    }

    pub fn status(&self) -> &StatusService {
        &self.status
    }

    /// Authenticate and dispatch one inbound call
    pub async fn handle(&self, request: InboundRequest) -> FederationResult<FederationResponse> {
        let started = Instant::now();
        let raw_kind = request.req.clone().unwrap_or_default();
        info!("Federation {} request from {}", raw_kind, request.remote_addr);
        metrics::record_federation_request(&raw_kind);

        let result = self.dispatch(&request).await;

        if let Err(e) = &result {
            metrics::record_federation_denial(e.reason());
            match e {
                FederationError::Disabled(_)
                | FederationError::Unauthorized(_)
                | FederationError::UnknownKind(_) => warn!(
                    "Federation {} request from {} ({}) denied: {}",
                    raw_kind,
                    request.remote_addr,
                    request.url.as_deref().unwrap_or("-"),
                    e
                ),
                // malformed payloads and disabled proposals are logged by their intake
                _ => {}
            }
        }
        metrics::record_request_duration(started.elapsed().as_secs_f64());
        result
    }

    async fn dispatch(&self, request: &InboundRequest) -> FederationResult<FederationResponse> {
        let config = self.config();

        if let Some(reason) = config.disabled_reason() {
            return Err(FederationError::Disabled(reason.to_string()));
        }

        let raw_kind = request.req.as_deref().unwrap_or("");
        let kind = FederationRequest::parse(raw_kind)
            .ok_or_else(|| FederationError::UnknownKind(raw_kind.to_string()))?;

        let caller_url = request
            .url
            .as_deref()
            .map(decode_from_html)
            .unwrap_or_default();
        let token = request.token.as_deref().unwrap_or("");

        match kind {
            FederationRequest::Proposal => {
                let submission = ProposalSubmission {
                    remote_url: &caller_url,
                    token_type: FederationToken::from_name(request.token_type.as_deref()),
                    token,
                    body: &request.body,
                    origin_context: &request.host_url,
                };
                self.proposals.receive(config.allow_proposals, submission).await?;
                metrics::record_proposal();
                Ok(FederationResponse::Acknowledged)
            }
            FederationRequest::Status => {
                let identification = StatusService::identification(&caller_url, &request.remote_addr);
                self.status.acknowledge(&identification, &request.body)?;
                metrics::record_status_report();
                Ok(FederationResponse::Acknowledged)
            }
            FederationRequest::PullRepositories
            | FederationRequest::PullSettings
            | FederationRequest::PullUsers => {
                let payload = self.pull.respond(
                    &config.tokens,
                    config.settings.as_ref(),
                    kind,
                    token,
                    &request.host_url,
                )?;
                Ok(FederationResponse::Payload(payload))
            }
        }
    }

    /// Approve a queued proposal with the configured registration defaults
    pub fn approve_proposal(
        &self,
        id: &str,
        registrations: &dyn RegistrationStore,
    ) -> FederationResult<FederationRegistration> {
        let config = self.config();
        self.proposals.approve(id, registrations, &config.registration_defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::{derive_token, LogNotifier};
    use crate::models::{FederationStrategy, PullStatus, RepositoryModel, UserModel};
    use crate::store::{FederationStore, ProposalStore, RocksStore};
    use tempfile::TempDir;

    const UUID: &str = "test-instance";

    fn settings(allow_proposals: bool) -> Settings {
        let mut settings = Settings::default();
        settings.federation.uuid = UUID.to_string();
        settings.federation.allow_proposals = allow_proposals;
        settings
    }

    fn setup(settings: &Settings) -> (TempDir, FederationStore, FederationService) {
        let dir = TempDir::new().unwrap();
        let store = FederationStore::new(RocksStore::open(dir.path()).unwrap());
        let shared = Arc::new(store.clone());
        let service = FederationService::new(
            FederationConfig::from_settings(settings),
            PullService::new(shared.clone(), shared.clone()),
            ProposalService::new(shared.clone(), Arc::new(LogNotifier)),
            StatusService::new(shared),
        );
        (dir, store, service)
    }

    fn token(tier: FederationToken) -> String {
        derive_token(UUID, tier.token_seed())
    }

    fn pull(req: &str, token: String) -> InboundRequest {
        InboundRequest {
            req: Some(req.to_string()),
            token: Some(token),
            remote_addr: "10.1.1.1".to_string(),
            host_url: "https://source.example.com".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_federation_is_forbidden() {
        let mut disabled = settings(true);
        disabled.federation.enabled = false;
        let (_dir, _store, service) = setup(&disabled);

        let result = service
            .handle(pull("pull_repositories", token(FederationToken::All)))
            .await;
        assert!(matches!(result, Err(FederationError::Disabled(_))));

        let (_dir, _store, service) = setup(&Settings::default());
        let result = service.handle(pull("status", String::new())).await;
        assert!(matches!(result, Err(FederationError::Disabled(_))));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected() {
        let (_dir, _store, service) = setup(&settings(false));

        let result = service.handle(pull("pull_everything", token(FederationToken::All))).await;
        assert!(matches!(result, Err(FederationError::UnknownKind(_))));

        let mut missing = pull("x", token(FederationToken::All));
        missing.req = None;
        let result = service.handle(missing).await;
        assert!(matches!(result, Err(FederationError::UnknownKind(_))));
    }

    #[tokio::test]
    async fn test_repositories_token_cannot_pull_users() {
        let (_dir, store, service) = setup(&settings(false));
        store.put_user(&UserModel::new("alice")).unwrap();
        store.put_repository(&RepositoryModel::new("app.git")).unwrap();

        let repos_token = token(FederationToken::Repositories);

        let denied = service.handle(pull("pull_users", repos_token.clone())).await;
        assert!(matches!(denied, Err(FederationError::Unauthorized(_))));

        let allowed = service.handle(pull("pull_repositories", repos_token)).await.unwrap();
        let body = allowed.body().unwrap().unwrap();
        assert!(body.contains("https://source.example.com/git/app.git"));
        assert!(body.contains('\n'));
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthorized() {
        let (_dir, _store, service) = setup(&settings(false));
        let result = service.handle(pull("pull_repositories", "forged".to_string())).await;
        assert!(matches!(result, Err(FederationError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_pull_settings_requires_all_tier() {
        let (_dir, _store, service) = setup(&settings(false));

        let denied = service
            .handle(pull("pull_settings", token(FederationToken::UsersAndRepositories)))
            .await;
        assert!(matches!(denied, Err(FederationError::Unauthorized(_))));

        let allowed = service
            .handle(pull("pull_settings", token(FederationToken::All)))
            .await
            .unwrap();
        match allowed {
            FederationResponse::Payload(PullPayload::Settings(map)) => {
                assert_eq!(map.get("federation.uuid").map(String::as_str), Some(UUID));
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pull_repositories_respects_strategies() {
        let (_dir, store, service) = setup(&settings(false));
        store
            .put_repository(&RepositoryModel::new("A.git").with_strategy(FederationStrategy::Exclude))
            .unwrap();
        store
            .put_repository(
                &RepositoryModel::new("B.git")
                    .with_strategy(FederationStrategy::FederateOrigin)
                    .with_origin("o"),
            )
            .unwrap();
        store.put_repository(&RepositoryModel::new("C.git")).unwrap();

        let response = service
            .handle(pull("pull_repositories", token(FederationToken::Repositories)))
            .await
            .unwrap();
        match response {
            FederationResponse::Payload(PullPayload::Repositories(map)) => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                assert_eq!(keys, vec!["https://source.example.com/git/C.git", "o"]);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_proposal_flow() {
        let body = br#"{"https://remote/git/a.git": {"name": "a.git"}}"#.to_vec();
        let proposal = |body: Vec<u8>| InboundRequest {
            req: Some("proposal".to_string()),
            token: Some("their-token".to_string()),
            token_type: Some("all".to_string()),
            url: Some("https://remote.example.com/?a=1&amp;b=2".to_string()),
            remote_addr: "10.2.2.2".to_string(),
            host_url: "https://source.example.com".to_string(),
            body,
        };

        let (_dir, store, service) = setup(&settings(false));
        let result = service.handle(proposal(body.clone())).await;
        assert!(matches!(result, Err(FederationError::ProposalsDisabled)));
        assert!(store.list_proposals().unwrap().is_empty());

        let (_dir, store, service) = setup(&settings(true));
        let response = service.handle(proposal(body)).await.unwrap();
        assert_eq!(response, FederationResponse::Acknowledged);
        assert_eq!(response.body().unwrap(), None);

        let queued = store.list_proposals().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].repository_count(), 1);
        assert_eq!(queued[0].token_type, FederationToken::All);
        assert_eq!(queued[0].url, "https://remote.example.com/?a=1&b=2");

        let result = service.handle(proposal(Vec::new())).await;
        assert!(matches!(result, Err(FederationError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn test_status_needs_no_token() {
        let (_dir, store, service) = setup(&settings(false));
        let request = InboundRequest {
            req: Some("status".to_string()),
            url: Some("https://puller.example.com".to_string()),
            remote_addr: "10.3.3.3".to_string(),
            host_url: "https://source.example.com".to_string(),
            body: br#"{"frequency": "30 mins", "statuses": [{"name": "a.git", "status": "mirrored"}]}"#
                .to_vec(),
            ..Default::default()
        };

        let response = service.handle(request).await.unwrap();
        assert_eq!(response, FederationResponse::Acknowledged);

        let stored = store
            .get_registration("https://puller.example.com (10.3.3.3)")
            .unwrap()
            .unwrap();
        assert_eq!(stored.lowest_status(), PullStatus::Mirrored);
    }

    #[tokio::test]
    async fn test_reload_swaps_tokens() {
        let (_dir, _store, service) = setup(&settings(false));
        let old_token = token(FederationToken::All);

        let mut rotated = settings(false);
        rotated.federation.uuid = "rotated".to_string();
        service.reload(&rotated);

        let result = service.handle(pull("pull_repositories", old_token)).await;
        assert!(matches!(result, Err(FederationError::Unauthorized(_))));

        let new_token = derive_token("rotated", FederationToken::Repositories.token_seed());
        assert!(service.handle(pull("pull_repositories", new_token)).await.is_ok());
    }
}
