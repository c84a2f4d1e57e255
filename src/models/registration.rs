//! Federation registrations and pull status reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of pulling a single repository.
///
/// Declaration order runs from most to least in need of attention, which is
/// what [`FederationRegistration::lowest_status`] relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullStatus {
    Pending,
    Pulling,
    Failed,
    Skipped,
    Pulled,
    Mirrored,
    NoChange,
    Excluded,
}

impl std::fmt::Display for PullStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PullStatus::Pending => "pending",
            PullStatus::Pulling => "pulling",
            PullStatus::Failed => "failed",
            PullStatus::Skipped => "skipped",
            PullStatus::Pulled => "pulled",
            PullStatus::Mirrored => "mirrored",
            PullStatus::NoChange => "nochange",
            PullStatus::Excluded => "excluded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStatus {
    pub name: String,
    pub status: PullStatus,
}

impl RepositoryStatus {
    pub fn new(name: impl Into<String>, status: PullStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Pull-cycle report a peer posts with `req=status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Name the peer uses for this relationship
    #[serde(default)]
    pub name: String,
    /// The peer's own base URL
    #[serde(default)]
    pub url: String,
    /// The peer's pull frequency, e.g. `"60 mins"`
    pub frequency: String,
    #[serde(default)]
    pub statuses: Vec<RepositoryStatus>,
}

/// A relationship with a federation peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationRegistration {
    /// Store key; the peer identification for status-derived records
    pub id: String,
    pub name: String,
    /// Source URL of the peer
    pub url: String,
    /// Token presented to the peer when pulling; empty for status-derived records
    #[serde(default)]
    pub token: String,
    pub frequency: String,
    /// Local destination folder for pulled repositories
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub inclusions: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub mirror: bool,
    #[serde(default = "default_true")]
    pub bare: bool,
    #[serde(default)]
    pub last_pull: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_pull: Option<DateTime<Utc>>,
    #[serde(default)]
    pub statuses: Vec<RepositoryStatus>,
}

fn default_true() -> bool {
    true
}

impl FederationRegistration {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        token: impl Into<String>,
        frequency: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            url: url.into(),
            token: token.into(),
            frequency: frequency.into(),
            folder: String::new(),
            inclusions: Vec::new(),
            exclusions: Vec::new(),
            mirror: false,
            bare: true,
            last_pull: None,
            next_pull: None,
            statuses: Vec::new(),
        }
    }

    /// Record built from a status report of a peer nobody registered
    pub fn from_report(id: impl Into<String>, report: &StatusReport) -> Self {
        let mut registration = Self::new(id, report.url.clone(), "", report.frequency.clone());
        if !report.name.is_empty() {
            registration.name = report.name.clone();
        }
        registration
    }

    /// True when this record only holds results reported by a peer
    pub fn is_result_data(&self) -> bool {
        self.token.is_empty()
    }

    /// Status needing the most attention, `Pending` for an empty list
    pub fn lowest_status(&self) -> PullStatus {
        self.statuses
            .iter()
            .map(|s| s.status)
            .min()
            .unwrap_or(PullStatus::Pending)
    }

    /// Status list sorted by repository name
    pub fn sorted_statuses(&self) -> Vec<RepositoryStatus> {
        let mut list = self.statuses.clone();
        list.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        list
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_pull {
            Some(next) => next <= now,
            None => true,
        }
    }

    /// Whether a repository name passes the inclusion/exclusion patterns.
    ///
    /// Patterns match exactly or by prefix when they end with `*`.
    pub fn accepts(&self, repository: &str) -> bool {
        let matches = |pattern: &String| {
            match pattern.strip_suffix('*') {
                Some(prefix) => repository.starts_with(prefix),
                None => pattern == repository,
            }
        };
        if self.exclusions.iter().any(matches) {
            return false;
        }
        self.inclusions.is_empty() || self.inclusions.iter().any(matches)
    }
}
