//! Operator notifications for incoming proposals

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::models::{FederationError, FederationProposal, FederationResult, FederationToken};

/// What an operator is told about a new proposal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalNotice {
    pub proposal_id: String,
    pub url: String,
    pub token_type: FederationToken,
    pub repository_count: usize,
    /// Where the operator can review the proposal
    pub review_url: String,
}

impl ProposalNotice {
    pub fn new(proposal: &FederationProposal, origin_context: &str) -> Self {
        let base = origin_context.strip_suffix('/').unwrap_or(origin_context);
        Self {
            proposal_id: proposal.id.clone(),
            url: proposal.url.clone(),
            token_type: proposal.token_type,
            repository_count: proposal.repository_count(),
            review_url: format!("{}/api/v1/proposals/{}", base, proposal.id),
        }
    }
}

/// Hook fired when a proposal has been queued
#[async_trait]
pub trait ProposalNotifier: Send + Sync {
    async fn notify(&self, notice: &ProposalNotice) -> FederationResult<()>;
}

/// Writes notices to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl ProposalNotifier for LogNotifier {
    async fn notify(&self, notice: &ProposalNotice) -> FederationResult<()> {
        info!(
            "Federation proposal from {} requests {} access to {} repositories; review at {}",
            notice.url, notice.token_type, notice.repository_count, notice.review_url
        );
        Ok(())
    }
}

/// Posts notices as JSON to a webhook, and logs them too
#[derive(Clone)]
pub struct WebhookNotifier {
    endpoint: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> FederationResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FederationError::NetworkError(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }
}

#[async_trait]
impl ProposalNotifier for WebhookNotifier {
    async fn notify(&self, notice: &ProposalNotice) -> FederationResult<()> {
        LogNotifier.notify(notice).await?;

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(notice)
            .send()
            .await
            .map_err(|e| FederationError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FederationError::NetworkError(format!(
                "Proposal webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
