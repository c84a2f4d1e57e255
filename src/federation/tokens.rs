//! Federation token authority
//!
//! Tokens are derived from the instance's federation uuid, so they survive
//! restarts without being stored anywhere.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::warn;

use crate::config::FederationSettings;
use crate::models::{FederationRequest, FederationToken};

/// What a token grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub tier: FederationToken,
    /// Federation set the token is limited to, if any
    pub set: Option<String>,
}

/// Validates presented tokens against the configured token set
#[derive(Debug, Clone, Default)]
pub struct TokenAuthority {
    grants: HashMap<String, TokenGrant>,
}

impl TokenAuthority {
    /// Derive the tier tokens and set tokens from federation settings.
    ///
    /// An empty uuid yields an authority that knows no tokens.
    pub fn from_settings(settings: &FederationSettings) -> Self {
        let uuid = settings.uuid.trim();
        if uuid.is_empty() {
            return Self::default();
        }

        let mut grants = HashMap::new();
        for tier in FederationToken::TIERS {
            grants.insert(
                derive_token(uuid, tier.token_seed()),
                TokenGrant { tier, set: None },
            );
        }
        for set in settings.sets.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if FederationToken::TIERS.iter().any(|tier| tier.token_seed() == set) {
                warn!("Federation set '{}' clashes with a tier name and was ignored", set);
                continue;
            }
            grants.insert(
                derive_token(uuid, set),
                TokenGrant {
                    tier: FederationToken::Repositories,
                    set: Some(set.to_string()),
                },
            );
        }
        Self { grants }
    }

    /// Authority over an explicit token table
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (S, FederationToken)>,
        S: Into<String>,
    {
        let grants = tokens
            .into_iter()
            .map(|(token, tier)| (token.into(), TokenGrant { tier, set: None }))
            .collect();
        Self { grants }
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn grant(&self, token: &str) -> Option<&TokenGrant> {
        self.grants.get(token)
    }

    /// Whether `token` may perform `kind`.
    ///
    /// Proposal and status requests are never authorized here; they
    /// authenticate by payload and caller URL instead.
    pub fn validate(&self, kind: FederationRequest, token: &str) -> bool {
        let Some(required) = kind.required_tier() else {
            return false;
        };
        self.grant(token)
            .map(|grant| grant.tier.satisfies(required))
            .unwrap_or(false)
    }

    /// The token issued for a tier
    pub fn token_for(&self, tier: FederationToken) -> Option<&str> {
        self.grants
            .iter()
            .find(|(_, grant)| grant.tier == tier && grant.set.is_none())
            .map(|(token, _)| token.as_str())
    }

    /// Every issued token with its grant, tiers first then sets by name
    pub fn issued(&self) -> Vec<(&str, &TokenGrant)> {
        let mut issued: Vec<_> = self
            .grants
            .iter()
            .map(|(token, grant)| (token.as_str(), grant))
            .collect();
        issued.sort_by(|a, b| {
            a.1.set
                .is_some()
                .cmp(&b.1.set.is_some())
                .then(a.1.tier.cmp(&b.1.tier))
                .then(a.1.set.cmp(&b.1.set))
        });
        issued
    }
}

/// Lowercase hex SHA-256 of `"<uuid>-<seed>"`
pub fn derive_token(uuid: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uuid.as_bytes());
    hasher.update(b"-");
    hasher.update(seed.as_bytes());
    format!("{:x}", hasher.finalize())
}
