//! RocksDB-backed federation store

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::catalog::{ProposalStore, RegistrationStore, RepositoryCatalog, UserCatalog};
use super::rocks::{RocksStore, CF_PROPOSALS, CF_REGISTRATIONS, CF_REPOSITORIES, CF_USERS};
use crate::models::{
    FederationProposal, FederationRegistration, FederationResult, RepositoryModel, UserModel,
};

/// Per-key mutexes so read-modify-write of one record excludes only itself
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    /// Run `f` holding the lock for `key`; the entry is dropped once unused
    fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        let result = {
            let _guard = lock.lock();
            f()
        };

        // Clones are only taken under the map lock, so a count of two means
        // the map and this call are the last holders.
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Repositories, users, registrations and proposals in one RocksDB
#[derive(Clone)]
pub struct FederationStore {
    rocks: RocksStore,
    registration_locks: Arc<KeyedLocks>,
}

impl FederationStore {
    pub fn new(rocks: RocksStore) -> Self {
        Self {
            rocks,
            registration_locks: Arc::new(KeyedLocks::default()),
        }
    }

    // ========================================================================
    // Catalog maintenance
    // ========================================================================

    pub fn put_repository(&self, repository: &RepositoryModel) -> FederationResult<()> {
        self.rocks.put_json(CF_REPOSITORIES, &repository.name, repository)
    }

    pub fn remove_repository(&self, name: &str) -> FederationResult<bool> {
        self.rocks.delete(CF_REPOSITORIES, name)
    }

    pub fn put_user(&self, user: &UserModel) -> FederationResult<()> {
        self.rocks.put_json(CF_USERS, &user.username.to_lowercase(), user)
    }

    pub fn remove_user(&self, username: &str) -> FederationResult<bool> {
        self.rocks.delete(CF_USERS, &username.to_lowercase())
    }
}

impl RepositoryCatalog for FederationStore {
    fn list_repositories(&self) -> FederationResult<Vec<RepositoryModel>> {
        self.rocks.scan_json(CF_REPOSITORIES)
    }
}

impl UserCatalog for FederationStore {
    fn list_users(&self) -> FederationResult<Vec<UserModel>> {
        self.rocks.scan_json(CF_USERS)
    }
}

impl RegistrationStore for FederationStore {
    fn get_registration(&self, id: &str) -> FederationResult<Option<FederationRegistration>> {
        self.rocks.get_json(CF_REGISTRATIONS, id)
    }

    fn list_registrations(&self) -> FederationResult<Vec<FederationRegistration>> {
        self.rocks.scan_json(CF_REGISTRATIONS)
    }

    fn put_registration(&self, registration: &FederationRegistration) -> FederationResult<()> {
        self.registration_locks.with_lock(&registration.id, || {
            self.rocks.put_json(CF_REGISTRATIONS, &registration.id, registration)
        })
    }

    fn remove_registration(&self, id: &str) -> FederationResult<bool> {
        self.registration_locks
            .with_lock(id, || self.rocks.delete(CF_REGISTRATIONS, id))
    }

    fn update_registration(
        &self,
        id: &str,
        update: &mut dyn FnMut(Option<FederationRegistration>) -> FederationRegistration,
    ) -> FederationResult<FederationRegistration> {
        self.registration_locks.with_lock(id, || {
            let current = self.rocks.get_json(CF_REGISTRATIONS, id)?;
            let mut updated = update(current);
            updated.id = id.to_string();
            self.rocks.put_json(CF_REGISTRATIONS, id, &updated)?;
            Ok(updated)
        })
    }
}

impl ProposalStore for FederationStore {
    fn submit_proposal(&self, proposal: &FederationProposal) -> FederationResult<()> {
        self.rocks.put_json(CF_PROPOSALS, &proposal.id, proposal)
    }

    fn get_proposal(&self, id: &str) -> FederationResult<Option<FederationProposal>> {
        self.rocks.get_json(CF_PROPOSALS, id)
    }

    fn list_proposals(&self) -> FederationResult<Vec<FederationProposal>> {
        let mut proposals: Vec<FederationProposal> = self.rocks.scan_json(CF_PROPOSALS)?;
        proposals.sort_by_key(|p| p.received);
        Ok(proposals)
    }

    fn remove_proposal(&self, id: &str) -> FederationResult<bool> {
        self.rocks.delete(CF_PROPOSALS, id)
    }
}

impl std::fmt::Debug for FederationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationStore").finish()
    }
}
