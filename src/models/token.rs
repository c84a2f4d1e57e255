//! Federation token tiers and request kinds

use serde::{Deserialize, Serialize};

/// Privilege tier of a federation token.
///
/// Tiers are totally ordered: a token at a higher tier authorizes every
/// request a lower tier does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationToken {
    Repositories,
    UsersAndRepositories,
    All,
}

impl FederationToken {
    /// Every tier, lowest first
    pub const TIERS: [FederationToken; 3] = [
        FederationToken::Repositories,
        FederationToken::UsersAndRepositories,
        FederationToken::All,
    ];

    /// Numeric rank used for tier comparison
    pub fn rank(self) -> u8 {
        match self {
            FederationToken::Repositories => 0,
            FederationToken::UsersAndRepositories => 1,
            FederationToken::All => 2,
        }
    }

    /// Whether this tier grants at least `required`
    pub fn satisfies(self, required: FederationToken) -> bool {
        self.rank() >= required.rank()
    }

    /// Wire name (`repositories`, `users_and_repositories`, `all`)
    pub fn as_str(self) -> &'static str {
        match self {
            FederationToken::Repositories => "repositories",
            FederationToken::UsersAndRepositories => "users_and_repositories",
            FederationToken::All => "all",
        }
    }

    /// Upper-case name mixed into derived tokens
    pub fn token_seed(self) -> &'static str {
        match self {
            FederationToken::Repositories => "REPOSITORIES",
            FederationToken::UsersAndRepositories => "USERS_AND_REPOSITORIES",
            FederationToken::All => "ALL",
        }
    }

    /// Parse a wire name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::TIERS
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(name))
    }

    /// Parse a declared tier, falling back to the lowest tier
    pub fn from_name(name: Option<&str>) -> Self {
        name.and_then(Self::parse)
            .unwrap_or(FederationToken::Repositories)
    }
}

impl PartialOrd for FederationToken {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FederationToken {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl std::fmt::Display for FederationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an inbound federation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationRequest {
    PullRepositories,
    PullSettings,
    PullUsers,
    Proposal,
    Status,
}

impl FederationRequest {
    pub const ALL: [FederationRequest; 5] = [
        FederationRequest::PullRepositories,
        FederationRequest::PullSettings,
        FederationRequest::PullUsers,
        FederationRequest::Proposal,
        FederationRequest::Status,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FederationRequest::PullRepositories => "pull_repositories",
            FederationRequest::PullSettings => "pull_settings",
            FederationRequest::PullUsers => "pull_users",
            FederationRequest::Proposal => "proposal",
            FederationRequest::Status => "status",
        }
    }

    /// Parse the `req` query value. Unknown kinds yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    /// Minimum token tier, or `None` for kinds that do not authenticate by token
    pub fn required_tier(self) -> Option<FederationToken> {
        match self {
            FederationRequest::PullRepositories => Some(FederationToken::Repositories),
            FederationRequest::PullUsers => Some(FederationToken::UsersAndRepositories),
            FederationRequest::PullSettings => Some(FederationToken::All),
            FederationRequest::Proposal | FederationRequest::Status => None,
        }
    }

    pub fn is_pull(self) -> bool {
        self.required_tier().is_some()
    }
}

impl std::fmt::Display for FederationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
