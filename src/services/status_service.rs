//! Status collector for pull-cycle reports from peers

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::federation::next_pull_after;
use crate::models::{FederationError, FederationRegistration, FederationResult, StatusReport};
use crate::store::RegistrationStore;

/// Outcome of a status acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct StatusAcknowledgement {
    pub registration: FederationRegistration,
    /// False when the report created a registration nobody had made
    pub known_peer: bool,
}

/// Records status reports against registrations
#[derive(Clone)]
pub struct StatusService {
    store: Arc<dyn RegistrationStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// `"<url> (<remote address>)"`, the key status reports are filed under
    pub fn identification(url: &str, remote_addr: &str) -> String {
        format!("{} ({})", url, remote_addr)
    }

    pub fn acknowledge(&self, identification: &str, body: &[u8]) -> FederationResult<StatusAcknowledgement> {
        self.acknowledge_at(identification, body, Utc::now())
    }

    /// Apply a status report received at `now`.
    ///
    /// The reported status list replaces the stored one, so repositories the
    /// peer no longer reports are dropped. Only the pull timestamps and the
    /// status list of an existing registration change.
    pub fn acknowledge_at(
        &self,
        identification: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> FederationResult<StatusAcknowledgement> {
        let report = parse_report(body).map_err(|e| {
            error!("Failed to receive pulled repositories list from {}: {}", identification, e);
            e
        })?;

        let next_pull = next_pull_after(now, &report.frequency);
        let mut known_peer = true;

        let registration = self.store.update_registration(identification, &mut |current| {
            let mut registration = match current {
                Some(existing) => existing,
                None => {
                    known_peer = false;
                    FederationRegistration::from_report(identification, &report)
                }
            };
            registration.last_pull = Some(now);
            registration.next_pull = Some(next_pull);
            registration.statuses = report.statuses.clone();
            registration
        })?;

        if !known_peer {
            warn!(
                "Status report from unregistered peer {} recorded as a new registration",
                identification
            );
        }
        info!(
            "Received status of {} federated repositories from {}",
            registration.statuses.len(),
            identification
        );

        Ok(StatusAcknowledgement {
            registration,
            known_peer,
        })
    }

    pub fn list(&self) -> FederationResult<Vec<FederationRegistration>> {
        self.store.list_registrations()
    }

    pub fn get(&self, id: &str) -> FederationResult<FederationRegistration> {
        self.store
            .get_registration(id)?
            .ok_or_else(|| FederationError::not_found("registration", id))
    }

    /// Operator removal of a registration
    pub fn remove(&self, id: &str) -> FederationResult<()> {
        if !self.store.remove_registration(id)? {
            return Err(FederationError::not_found("registration", id));
        }
        info!("Removed federation registration {}", id);
        Ok(())
    }
}

fn parse_report(body: &[u8]) -> FederationResult<StatusReport> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(FederationError::malformed("empty status report"));
    }
    serde_json::from_slice(body)
        .map_err(|e| FederationError::malformed(format!("invalid status report: {}", e)))
}
