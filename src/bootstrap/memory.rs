use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::provider::{Claims, IdentityProvider, ProviderError, UserRecord};

#[derive(Default)]
struct Store {
    users: HashMap<String, UserRecord>,
    /// Remaining claim assignments to fail before succeeding again.
    claim_faults: u32,
    create_calls: u32,
    claim_calls: u32,
}

/// A strongly consistent identity store held in memory.
///
/// Clones share the same store, so a test can keep one handle for
/// inspection while the bootstrapper owns another.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    store: Arc<Mutex<Store>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user directly, as if created by an earlier run.
    pub fn insert(&self, email: &str, claims: Claims) -> String {
        let uid = uuid::Uuid::new_v4().simple().to_string();
        let user = UserRecord {
            uid: uid.clone(),
            email: Some(email.to_string()),
            custom_claims: claims,
        };
        self.store.lock().unwrap().users.insert(uid.clone(), user);
        uid
    }

    /// Makes the next `count` claim assignments fail as unavailable.
    pub fn fail_claims(&self, count: u32) {
        self.store.lock().unwrap().claim_faults = count;
    }

    pub fn user_count(&self) -> usize {
        self.store.lock().unwrap().users.len()
    }

    pub fn create_calls(&self) -> u32 {
        self.store.lock().unwrap().create_calls
    }

    pub fn claim_calls(&self) -> u32 {
        self.store.lock().unwrap().claim_calls
    }
}

#[async_trait]
impl IdentityProvider for MemoryProvider {
    async fn create_user(&self, email: &str, _password: &str) -> Result<UserRecord, ProviderError> {
        let mut store = self.store.lock().unwrap();
        store.create_calls += 1;
        if store.users.values().any(|u| u.email.as_deref() == Some(email)) {
            return Err(ProviderError::DuplicateUser(email.to_string()));
        }

        let user = UserRecord {
            uid: uuid::Uuid::new_v4().simple().to_string(),
            email: Some(email.to_string()),
            custom_claims: Claims::new(),
        };
        store.users.insert(user.uid.clone(), user.clone());
        Ok(user)
    }

    async fn set_custom_claims(&self, uid: &str, claims: &Claims) -> Result<(), ProviderError> {
        let mut store = self.store.lock().unwrap();
        store.claim_calls += 1;
        if store.claim_faults > 0 {
            store.claim_faults -= 1;
            return Err(ProviderError::ProviderUnavailable("simulated fault".to_string()));
        }

        let user = store
            .users
            .get_mut(uid)
            .ok_or_else(|| ProviderError::UserNotFound(uid.to_string()))?;
        user.custom_claims = claims.clone();
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> Result<UserRecord, ProviderError> {
        self.store
            .lock()
            .unwrap()
            .users
            .get(uid)
            .cloned()
            .ok_or_else(|| ProviderError::UserNotFound(uid.to_string()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<UserRecord, ProviderError> {
        self.store
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned()
            .ok_or_else(|| ProviderError::UserNotFound(email.to_string()))
    }

    async fn delete_user(&self, uid: &str) -> Result<(), ProviderError> {
        self.store
            .lock()
            .unwrap()
            .users
            .remove(uid)
            .map(|_| ())
            .ok_or_else(|| ProviderError::UserNotFound(uid.to_string()))
    }
}
