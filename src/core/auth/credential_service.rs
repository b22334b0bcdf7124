// This is the credential module - it owns the OAuth lifecycle for the single
// Google account the bridge acts on behalf of.
// Like the rest of core/, it has no HTTP framework or reqwest imports: token
// persistence and the token endpoint are reached through the ports below.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Stored expiry is pulled forward by this much so we refresh before Google
/// starts rejecting the token.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// How long an issued `state` stays redeemable at the callback.
const PENDING_STATE_TTL_MINUTES: i64 = 10;

/// Oldest states are evicted past this many outstanding ones.
const MAX_PENDING_STATES: usize = 256;

const STATE_NONCE_BYTES: usize = 32;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

/// An OAuth 2.0 token set for one Google account.
///
/// The token endpoint and client identity travel with the token so a refresh
/// can be performed from the stored record alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub granted_scopes: BTreeSet<String>,
    /// `None` means the provider did not tell us; treated as non-expiring.
    pub expiry: Option<DateTime<Utc>>,
    pub last_refresh: DateTime<Utc>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Returns true if every scope in `required` was granted.
    pub fn covers(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.granted_scopes.contains(scope))
    }

    fn apply_refresh(&mut self, grant: TokenGrant) {
        self.access_token = grant.access_token;
        self.expiry = expiry_from(grant.expires_in);
        // Google only rotates the refresh token occasionally; keep the old one otherwise.
        if let Some(refresh_token) = grant.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(scopes) = grant.scopes {
            self.granted_scopes = scopes.into_iter().collect();
        }
        self.last_refresh = Utc::now();
    }
}

/// Token set returned by the provider after a code exchange or a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    /// Scopes the provider reports as granted, if it reported any.
    pub scopes: Option<Vec<String>>,
}

/// Where the token endpoint lives and who we are to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Consent URL plus the state nonce it carries. Lives only for the redirect
/// round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub authorization_url: String,
    pub state: String,
}

/// Either the thing the caller asked for, or the URL the end user has to visit
/// first. Not being authenticated yet is a normal state, so it is a value and
/// not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Access<T> {
    Granted(T),
    AuthRequired { authorization_url: String },
}

impl<T> Access<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Access<U> {
        match self {
            Access::Granted(value) => Access::Granted(f(value)),
            Access::AuthRequired { authorization_url } => {
                Access::AuthRequired { authorization_url }
            }
        }
    }

    #[cfg(test)]
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted(_))
    }
}

/// Snapshot used by `/auth/status`. Never triggers a refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

pub fn expiry_from(expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in.map(|secs| Utc::now() + Duration::seconds(secs) - Duration::seconds(EXPIRY_MARGIN_SECS))
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization exchange failed: {0}")]
    Exchange(String),

    #[error("Granted scopes do not cover the requested scopes (missing: {})", .missing.join(", "))]
    ScopeMismatch { missing: Vec<String> },

    #[error("Unknown or expired OAuth state; start again from /auth")]
    InvalidState,

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// True for failures of the authorization-code round trip itself, as opposed
    /// to storage trouble on our side.
    pub fn is_exchange_error(&self) -> bool {
        matches!(
            self,
            AuthError::Exchange(_) | AuthError::ScopeMismatch { .. } | AuthError::InvalidState
        )
    }
}

// ============================================================================
// PORTS
// ============================================================================

/// Single-slot persistence for the one credential this process owns.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>, AuthError>;

    /// Replaces whatever was stored before.
    async fn save(&self, credential: &Credential) -> Result<(), AuthError>;

    async fn clear(&self) -> Result<(), AuthError>;
}

/// The OAuth 2.0 authorization-code provider (Google in production).
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn identity(&self) -> ClientIdentity;

    fn authorization_url(&self, scopes: &[String], state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError>;

    /// Refreshes using the endpoint and client identity recorded on `credential`.
    async fn refresh(&self, credential: &Credential) -> Result<TokenGrant, AuthError>;
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    oauth: Arc<dyn OAuthProvider>,
    scopes: Vec<String>,
    /// state nonce -> issued at
    pending: DashMap<String, DateTime<Utc>>,
    /// Serializes refresh and save so no reader sees a half-finished swap.
    slot_lock: Mutex<()>,
    /// Nonce currently handed out in `AuthRequired` results.
    shared_state: std::sync::Mutex<Option<String>>,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        oauth: Arc<dyn OAuthProvider>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            store,
            oauth,
            scopes,
            pending: DashMap::new(),
            slot_lock: Mutex::new(()),
            shared_state: std::sync::Mutex::new(None),
        }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns the persisted credential, if any.
    pub async fn load(&self) -> Result<Option<Credential>, AuthError> {
        self.store.load().await
    }

    /// Persists `credential`, replacing the previous one.
    pub async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let _guard = self.slot_lock.lock().await;
        self.store.save(credential).await
    }

    /// Builds a consent URL with a fresh state nonce and remembers the nonce
    /// until the callback redeems it.
    pub fn begin_authorization(&self) -> AuthorizationRequest {
        self.prune_pending();
        while self.pending.len() >= MAX_PENDING_STATES {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|entry| *entry.value())
                .map(|entry| entry.key().clone());
            match oldest {
                Some(state) => self.pending.remove(&state),
                None => break,
            };
        }

        let bytes: [u8; STATE_NONCE_BYTES] = rand::random();
        let state = URL_SAFE_NO_PAD.encode(bytes);
        self.pending.insert(state.clone(), Utc::now());

        AuthorizationRequest {
            authorization_url: self.oauth.authorization_url(&self.scopes, &state),
            state,
        }
    }

    /// Makes sure `credential` is usable.
    ///
    /// An unexpired, scope-complete credential comes back unchanged. Anything
    /// else is decided against what the slot holds now, under the slot lock,
    /// so a stale copy never clears or overwrites a newer credential:
    /// - Empty slot (e.g. after logout): `AuthRequired`, nothing is refreshed.
    /// - Slot credential missing a configured scope: cleared, `AuthRequired`.
    /// - Slot credential still valid: returned.
    /// - Expired with a refresh token: refreshed, persisted and returned. If the
    ///   refresh is rejected the slot is cleared and `AuthRequired` comes back.
    /// - Expired without a refresh token: `AuthRequired`.
    pub async fn ensure_fresh(&self, credential: Credential) -> Result<Access<Credential>, AuthError> {
        if credential.covers(&self.scopes) && !credential.is_expired() {
            return Ok(Access::Granted(credential));
        }

        let _guard = self.slot_lock.lock().await;

        let Some(current) = self.load().await? else {
            tracing::debug!("Credential slot is empty");
            return Ok(self.auth_required());
        };
        if current.access_token != credential.access_token {
            tracing::debug!("Credential slot changed since it was read");
        }

        if !current.covers(&self.scopes) {
            tracing::info!("Stored credential lacks configured scopes; clearing it");
            self.store.clear().await?;
            return Ok(self.auth_required());
        }

        if !current.is_expired() {
            return Ok(Access::Granted(current));
        }

        if !current.can_refresh() {
            tracing::debug!("Credential expired and has no refresh token");
            return Ok(self.auth_required());
        }

        match self.oauth.refresh(&current).await {
            Ok(grant) => {
                let mut refreshed = current;
                refreshed.apply_refresh(grant);
                self.store.save(&refreshed).await?;
                tracing::info!(expiry = ?refreshed.expiry, "Refreshed Google access token");
                Ok(Access::Granted(refreshed))
            }
            Err(err) => {
                tracing::warn!("Token refresh failed, clearing stored credential: {}", err);
                self.store.clear().await?;
                Ok(self.auth_required())
            }
        }
    }

    /// `load()` followed by `ensure_fresh()`; an empty slot is `AuthRequired`.
    pub async fn current(&self) -> Result<Access<Credential>, AuthError> {
        match self.load().await? {
            Some(credential) => self.ensure_fresh(credential).await,
            None => Ok(self.auth_required()),
        }
    }

    /// Redeems the callback: checks and consumes `state`, exchanges `code`,
    /// verifies the granted scopes, then persists the new credential.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Credential, AuthError> {
        let issued_at = self
            .pending
            .remove(state)
            .map(|(_, issued_at)| issued_at)
            .ok_or(AuthError::InvalidState)?;
        if Utc::now() - issued_at > Duration::minutes(PENDING_STATE_TTL_MINUTES) {
            return Err(AuthError::InvalidState);
        }

        if code.trim().is_empty() {
            return Err(AuthError::Exchange("missing authorization code".to_string()));
        }

        let grant = self.oauth.exchange_code(code).await?;

        let granted_scopes: BTreeSet<String> = match grant.scopes {
            Some(scopes) => scopes.into_iter().collect(),
            None => self.scopes.iter().cloned().collect(),
        };
        let missing: Vec<String> = self
            .scopes
            .iter()
            .filter(|scope| !granted_scopes.contains(*scope))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(AuthError::ScopeMismatch { missing });
        }

        let identity = self.oauth.identity();
        let credential = Credential {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_endpoint: identity.token_endpoint,
            client_id: identity.client_id,
            client_secret: identity.client_secret,
            granted_scopes,
            expiry: expiry_from(grant.expires_in),
            last_refresh: Utc::now(),
        };

        self.save(&credential).await?;
        tracing::info!(
            scopes = credential.granted_scopes.len(),
            has_refresh_token = credential.can_refresh(),
            "Stored new Google credential"
        );
        Ok(credential)
    }

    pub async fn status(&self) -> Result<AuthStatus, AuthError> {
        let stored = self.store.load().await?;
        Ok(match stored {
            Some(credential) => AuthStatus {
                authenticated: credential.covers(&self.scopes)
                    && (!credential.is_expired() || credential.can_refresh()),
                expires_at: credential.expiry,
                scopes: credential.granted_scopes.into_iter().collect(),
            },
            None => AuthStatus {
                authenticated: false,
                expires_at: None,
                scopes: Vec::new(),
            },
        })
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        let _guard = self.slot_lock.lock().await;
        self.store.clear().await
    }

    /// `AuthRequired` with a consent URL. Unauthenticated requests share one
    /// nonce while it is young and unredeemed instead of minting one each.
    fn auth_required<T>(&self) -> Access<T> {
        let mut shared = self
            .shared_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let reuse_cutoff = Utc::now() - Duration::minutes(PENDING_STATE_TTL_MINUTES / 2);
        if let Some(state) = shared.as_deref() {
            let young = self
                .pending
                .get(state)
                .is_some_and(|issued_at| *issued_at > reuse_cutoff);
            if young {
                return Access::AuthRequired {
                    authorization_url: self.oauth.authorization_url(&self.scopes, state),
                };
            }
        }

        let request = self.begin_authorization();
        *shared = Some(request.state);
        Access::AuthRequired {
            authorization_url: request.authorization_url,
        }
    }

    fn prune_pending(&self) {
        let cutoff = Utc::now() - Duration::minutes(PENDING_STATE_TTL_MINUTES);
        self.pending.retain(|_, issued_at| *issued_at > cutoff);
    }
}
