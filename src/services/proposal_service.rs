//! Proposal intake and operator decisions on proposals

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::federation::{ProposalNotice, ProposalNotifier};
use crate::models::{
    FederationError, FederationProposal, FederationRegistration, FederationResult,
    FederationToken, RepositoryModel,
};
use crate::store::{ProposalStore, RegistrationStore};

/// A proposal as received on the wire, before validation
#[derive(Debug, Clone)]
pub struct ProposalSubmission<'a> {
    pub remote_url: &'a str,
    pub token_type: FederationToken,
    pub token: &'a str,
    pub body: &'a [u8],
    /// Base URL of this instance, used in the operator notification
    pub origin_context: &'a str,
}

/// Defaults applied to registrations created from approved proposals
#[derive(Debug, Clone)]
pub struct RegistrationDefaults {
    pub frequency: String,
    pub folder: String,
}

/// Records proposals and notifies operators
#[derive(Clone)]
pub struct ProposalService {
    store: Arc<dyn ProposalStore>,
    notifier: Arc<dyn ProposalNotifier>,
}

impl ProposalService {
    pub fn new(store: Arc<dyn ProposalStore>, notifier: Arc<dyn ProposalNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Validate and queue a proposal.
    ///
    /// Nothing is stored unless proposals are allowed and the snapshot is a
    /// non-empty repository map. Proposals from the same remote are not
    /// deduplicated.
    pub async fn receive(
        &self,
        allow_proposals: bool,
        submission: ProposalSubmission<'_>,
    ) -> FederationResult<FederationProposal> {
        if !allow_proposals {
            error!(
                "Rejected {} federation proposal from {}",
                submission.token_type, submission.remote_url
            );
            return Err(FederationError::ProposalsDisabled);
        }

        let repositories = parse_snapshot(submission.body).map_err(|e| {
            error!(
                "Failed to receive proposed repositories list from {}: {}",
                submission.remote_url, e
            );
            e
        })?;

        if submission.remote_url.trim().is_empty() {
            error!("Rejected federation proposal without a remote url");
            return Err(FederationError::malformed("proposal is missing the remote url"));
        }

        let proposal = FederationProposal::new(
            submission.remote_url.trim(),
            submission.token_type,
            submission.token,
            repositories,
        );
        self.store.submit_proposal(&proposal)?;

        let notice = ProposalNotice::new(&proposal, submission.origin_context);
        if let Err(e) = self.notifier.notify(&notice).await {
            warn!("Failed to notify operators of proposal {}: {}", proposal.id, e);
        }

        info!(
            "Submitted {} federation proposal to pull {} repositories from {}",
            proposal.token_type,
            proposal.repository_count(),
            proposal.url
        );
        Ok(proposal)
    }

    pub fn list(&self) -> FederationResult<Vec<FederationProposal>> {
        self.store.list_proposals()
    }

    pub fn get(&self, id: &str) -> FederationResult<FederationProposal> {
        self.store
            .get_proposal(id)?
            .ok_or_else(|| FederationError::not_found("proposal", id))
    }

    /// Accept a proposal: register the proposer as a source and drop the proposal.
    ///
    /// An existing registration for the same URL keeps its operator settings
    /// and only takes the proposed token.
    pub fn approve(
        &self,
        id: &str,
        registrations: &dyn RegistrationStore,
        defaults: &RegistrationDefaults,
    ) -> FederationResult<FederationRegistration> {
        let proposal = self.get(id)?;

        let registration_id = proposal.url.trim_end_matches('/').to_string();
        let mut merged = false;
        let registration = registrations.update_registration(&registration_id, &mut |current| {
            match current {
                Some(mut existing) => {
                    merged = true;
                    existing.token = proposal.token.clone();
                    existing
                }
                None => {
                    let mut registration = FederationRegistration::new(
                        registration_id.clone(),
                        proposal.url.clone(),
                        proposal.token.clone(),
                        defaults.frequency.clone(),
                    );
                    registration.name = proposal.display_name();
                    registration.folder = defaults.folder.clone();
                    registration
                }
            }
        })?;
        self.store.remove_proposal(id)?;

        if merged {
            info!(
                "Approved {} federation proposal from {}: updated token of registration {}",
                proposal.token_type, proposal.url, registration.id
            );
        } else {
            info!(
                "Approved {} federation proposal from {} as registration {}",
                proposal.token_type, proposal.url, registration.id
            );
        }
        Ok(registration)
    }

    /// Drop a proposal without registering anything
    pub fn reject(&self, id: &str) -> FederationResult<()> {
        if !self.store.remove_proposal(id)? {
            return Err(FederationError::not_found("proposal", id));
        }
        info!("Rejected federation proposal {}", id);
        Ok(())
    }
}

fn parse_snapshot(body: &[u8]) -> FederationResult<BTreeMap<String, RepositoryModel>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(FederationError::malformed("empty repository snapshot"));
    }

    let repositories: BTreeMap<String, RepositoryModel> = serde_json::from_slice(body)
        .map_err(|e| FederationError::malformed(format!("invalid repository snapshot: {}", e)))?;

    if repositories.is_empty() {
        return Err(FederationError::malformed("repository snapshot lists no repositories"));
    }
    Ok(repositories)
}
