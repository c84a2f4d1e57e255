//! User accounts offered to `pull_users`

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserModel {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub can_admin: bool,
    /// Repositories this user has been granted access to
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub exclude_from_federation: bool,
}

impl UserModel {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: String::new(),
            email: String::new(),
            can_admin: false,
            repositories: Vec::new(),
            exclude_from_federation: false,
        }
    }

    pub fn excluded(mut self) -> Self {
        self.exclude_from_federation = true;
        self
    }
}
