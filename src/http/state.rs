use std::sync::Arc;

use crate::config::SessionMode;
use crate::core::auth::CredentialService;
use crate::core::bridge::BridgeService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialService>,
    pub bridge: Arc<BridgeService>,
    pub session_mode: SessionMode,
    /// Base URL browsers use to reach the bridge.
    pub public_url: String,
}

impl AppState {
    pub fn new(
        credentials: Arc<CredentialService>,
        bridge: Arc<BridgeService>,
        session_mode: SessionMode,
        public_url: String,
    ) -> Self {
        Self {
            credentials,
            bridge,
            session_mode,
            public_url,
        }
    }

    /// The bridge's own `/auth` entry point, which sets the state cookie
    /// before redirecting to Google.
    pub fn auth_entry_url(&self) -> String {
        format!("{}/auth?redirect=true", self.public_url.trim_end_matches('/'))
    }
}
