use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{
    repo::{CredentialStore, StoreError},
    repo_types::User,
};

/// Process-local store keyed by exact email. Used by tests and `STORE=memory`.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Drops a user, e.g. to simulate an account removed after a token was issued.
    pub fn remove(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.remove(email))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, User>>, StoreError> {
        self.users
            .lock()
            .map_err(|_| StoreError::Unavailable(anyhow::anyhow!("user map lock poisoned")))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        created_at: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let mut users = self.lock()?;
        if users.contains_key(email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_owned(),
            password_hash: password_hash.to_owned(),
            created_at,
            updated_at: None,
        };
        users.insert(email.to_owned(), user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.get(email).cloned())
    }
}
