// Credential persistence and the Google OAuth client.

pub mod google_oauth;
pub mod in_memory;
pub mod json_store;

pub use google_oauth::{GoogleOAuthClient, OAuthClientConfig};
pub use in_memory::InMemoryCredentialStore;
pub use json_store::FileCredentialStore;
