// In-memory credential store.
//
// Holds the single credential slot in process memory. Used when
// CREDENTIAL_BACKEND=memory and by the tests; everything is lost on restart.

use crate::core::auth::{AuthError, Credential, CredentialStore};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryCredentialStore {
    slot: RwLock<Option<Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.slot.read().await.clone())
    }

    async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        *self.slot.write().await = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        *self.slot.write().await = None;
        Ok(())
    }
}
