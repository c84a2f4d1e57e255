//! Storage seams used by the federation services

use std::collections::BTreeMap;

use crate::config::Settings;
use crate::models::{
    FederationProposal, FederationRegistration, FederationResult, RepositoryModel, UserModel,
};

/// Source of the repositories offered to pullers
pub trait RepositoryCatalog: Send + Sync {
    /// All repositories in catalog order
    fn list_repositories(&self) -> FederationResult<Vec<RepositoryModel>>;
}

/// Source of the user accounts offered to pullers
pub trait UserCatalog: Send + Sync {
    fn list_users(&self) -> FederationResult<Vec<UserModel>>;
}

/// Source of the settings offered to pullers
pub trait SettingsCatalog: Send + Sync {
    fn all_settings(&self) -> BTreeMap<String, String>;
}

/// Keys never handed to peers
const PRIVATE_SETTINGS: [&str; 1] = ["federation.admin_token"];

impl SettingsCatalog for Settings {
    fn all_settings(&self) -> BTreeMap<String, String> {
        let mut settings = self.flatten();
        for key in PRIVATE_SETTINGS {
            settings.remove(key);
        }
        settings
    }
}

/// Persistent registrations keyed by peer identification
pub trait RegistrationStore: Send + Sync {
    fn get_registration(&self, id: &str) -> FederationResult<Option<FederationRegistration>>;

    fn list_registrations(&self) -> FederationResult<Vec<FederationRegistration>>;

    fn put_registration(&self, registration: &FederationRegistration) -> FederationResult<()>;

    fn remove_registration(&self, id: &str) -> FederationResult<bool>;

    /// Atomic read-modify-write of one registration.
    ///
    /// `update` receives the current record (if any) and returns the record to
    /// store. Concurrent updates of the same id are serialised; updates of
    /// different ids do not wait on each other.
    fn update_registration(
        &self,
        id: &str,
        update: &mut dyn FnMut(Option<FederationRegistration>) -> FederationRegistration,
    ) -> FederationResult<FederationRegistration>;
}

/// Queue of proposals awaiting an operator decision
pub trait ProposalStore: Send + Sync {
    fn submit_proposal(&self, proposal: &FederationProposal) -> FederationResult<()>;

    fn get_proposal(&self, id: &str) -> FederationResult<Option<FederationProposal>>;

    /// Pending proposals, oldest first
    fn list_proposals(&self) -> FederationResult<Vec<FederationProposal>>;

    fn remove_proposal(&self, id: &str) -> FederationResult<bool>;
}
