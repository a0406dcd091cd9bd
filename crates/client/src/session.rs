//! Signed-in session persistence.

use roomchat_shared::UserProfile;

use crate::storage::{Storage, StorageError};

const TOKEN_KEY: &str = "token";
const USER_KEY: &str = "user";

/// Stored session data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

/// Keeps the bearer token and the signed-in user across runs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    storage: Storage,
}

impl SessionStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn save(&self, token: &str, user: &UserProfile) -> Result<(), StorageError> {
        self.storage.save(TOKEN_KEY, &token)?;
        self.storage.save(USER_KEY, user)
    }

    /// The stored session, if both token and user are present.
    pub fn load(&self) -> Option<Session> {
        Some(Session {
            token: self.token()?,
            user: self.current_user()?,
        })
    }

    pub fn token(&self) -> Option<String> {
        self.storage.load(TOKEN_KEY)
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.storage.load(USER_KEY)
    }

    pub fn is_authenticated(&self) -> bool {
        self.storage.exists(TOKEN_KEY)
    }

    pub fn clear(&self) {
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(USER_KEY);
    }
}
