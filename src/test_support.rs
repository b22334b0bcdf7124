// Hand-written test doubles shared by the unit tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::net::TcpListener;

use crate::core::ai::models::{AiConfig, AiMessage, AiProviderResponse, FunctionDef};
use crate::core::ai::{AiError, AiProvider, BridgeClient, BridgeClientError};
use crate::core::auth::{
    AuthError, ClientIdentity, Credential, CredentialService, OAuthProvider, TokenGrant,
};
use crate::core::bridge::bridge_service::{document_link, spreadsheet_link};
use crate::core::bridge::{BridgeRequest, FailureKind, OperationResult};
use crate::core::google::{
    CreatedFile, DocsApi, DriveApi, GoogleApiConnector, GoogleApiError, SheetsApi,
};

pub use crate::infra::auth::InMemoryCredentialStore as MemoryStore;

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/spreadsheets",
];

const TOKEN_ENDPOINT: &str = "https://oauth.example/token";

fn all_scopes() -> BTreeSet<String> {
    SCOPES.iter().map(|s| s.to_string()).collect()
}

/// Valid for another hour, covers every scope in `SCOPES`.
pub fn fresh_credential(token: &str) -> Credential {
    Credential {
        access_token: token.to_string(),
        refresh_token: Some("refresh-token".to_string()),
        token_endpoint: TOKEN_ENDPOINT.to_string(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        granted_scopes: all_scopes(),
        expiry: Some(Utc::now() + Duration::hours(1)),
        last_refresh: Utc::now(),
    }
}

pub fn expired_credential(token: &str, refresh_token: Option<&str>) -> Credential {
    Credential {
        refresh_token: refresh_token.map(str::to_string),
        expiry: Some(Utc::now() - Duration::minutes(5)),
        last_refresh: Utc::now() - Duration::hours(2),
        ..fresh_credential(token)
    }
}

pub fn credential_service(store: Arc<MemoryStore>, oauth: Arc<FakeOAuth>) -> Arc<CredentialService> {
    Arc::new(CredentialService::new(
        store,
        oauth,
        SCOPES.iter().map(|s| s.to_string()).collect(),
    ))
}

/// Binds an ephemeral port and returns it with its base URL, so state that
/// needs to know its own address can be built before serving.
pub async fn bind_local() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

pub fn serve_router(listener: TcpListener, app: Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

// =============================================================================
// OAUTH
// =============================================================================

/// Exchange accepts "good-code" only. Refresh hands out "refreshed-token".
#[derive(Default)]
pub struct FakeOAuth {
    refresh_calls: AtomicUsize,
    reject_refresh: bool,
    granted_scopes: Option<Vec<String>>,
}

impl FakeOAuth {
    pub fn rejecting_refresh() -> Self {
        Self {
            reject_refresh: true,
            ..Self::default()
        }
    }

    pub fn granting_scopes(scopes: Vec<String>) -> Self {
        Self {
            granted_scopes: Some(scopes),
            ..Self::default()
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthProvider for FakeOAuth {
    fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        }
    }

    fn authorization_url(&self, scopes: &[String], state: &str) -> String {
        let mut url = url::Url::parse("https://accounts.example/o/oauth2/auth").unwrap();
        url.query_pairs_mut()
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state);
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        if code != "good-code" {
            return Err(AuthError::Exchange(format!("invalid_grant for code '{}'", code)));
        }
        Ok(TokenGrant {
            access_token: "access-from-code".to_string(),
            refresh_token: Some("refresh-from-code".to_string()),
            expires_in: Some(3600),
            scopes: Some(
                self.granted_scopes
                    .clone()
                    .unwrap_or_else(|| SCOPES.iter().map(|s| s.to_string()).collect()),
            ),
        })
    }

    async fn refresh(&self, _credential: &Credential) -> Result<TokenGrant, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        // Gives a concurrent caller time to queue up behind the refresh lock.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if self.reject_refresh {
            return Err(AuthError::Refresh("invalid_grant: token revoked".to_string()));
        }
        Ok(TokenGrant {
            access_token: "refreshed-token".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            scopes: None,
        })
    }
}

// =============================================================================
// GOOGLE APIS
// =============================================================================

#[derive(Default)]
struct Recorded {
    tokens: Vec<String>,
    created_files: Vec<(String, String)>,
    text_inserts: Vec<(String, u32, String)>,
    value_updates: Vec<(String, String, Vec<Vec<String>>)>,
}

struct ConnectorShared {
    file_id: String,
    failure: Option<(u16, String)>,
    upstream_calls: AtomicUsize,
    recorded: Mutex<Recorded>,
}

/// Records every client it builds and every call made through them.
pub struct RecordingConnector {
    shared: Arc<ConnectorShared>,
}

impl Default for RecordingConnector {
    fn default() -> Self {
        Self::with_file_id("file-1")
    }
}

impl RecordingConnector {
    pub fn with_file_id(id: &str) -> Self {
        Self::build(id, None)
    }

    /// Every API call fails with `status` and `message`.
    pub fn failing(status: u16, message: &str) -> Self {
        Self::build("file-1", Some((status, message.to_string())))
    }

    fn build(file_id: &str, failure: Option<(u16, String)>) -> Self {
        Self {
            shared: Arc::new(ConnectorShared {
                file_id: file_id.to_string(),
                failure,
                upstream_calls: AtomicUsize::new(0),
                recorded: Mutex::new(Recorded::default()),
            }),
        }
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.shared.recorded.lock().unwrap().tokens.clone()
    }

    pub fn created_files(&self) -> Vec<(String, String)> {
        self.shared.recorded.lock().unwrap().created_files.clone()
    }

    pub fn text_inserts(&self) -> Vec<(String, u32, String)> {
        self.shared.recorded.lock().unwrap().text_inserts.clone()
    }

    pub fn value_updates(&self) -> Vec<(String, String, Vec<Vec<String>>)> {
        self.shared.recorded.lock().unwrap().value_updates.clone()
    }

    pub fn upstream_calls(&self) -> usize {
        self.shared.upstream_calls.load(Ordering::SeqCst)
    }

    fn client(&self, access_token: &str) -> Arc<RecordingClient> {
        self.shared
            .recorded
            .lock()
            .unwrap()
            .tokens
            .push(access_token.to_string());
        Arc::new(RecordingClient {
            shared: self.shared.clone(),
        })
    }
}

impl GoogleApiConnector for RecordingConnector {
    fn drive(&self, access_token: &str) -> Arc<dyn DriveApi> {
        self.client(access_token)
    }

    fn docs(&self, access_token: &str) -> Arc<dyn DocsApi> {
        self.client(access_token)
    }

    fn sheets(&self, access_token: &str) -> Arc<dyn SheetsApi> {
        self.client(access_token)
    }
}

struct RecordingClient {
    shared: Arc<ConnectorShared>,
}

impl RecordingClient {
    fn attempt(&self, service: &'static str) -> Result<(), GoogleApiError> {
        self.shared.upstream_calls.fetch_add(1, Ordering::SeqCst);
        match &self.shared.failure {
            Some((status, message)) => Err(GoogleApiError::Upstream {
                service,
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DriveApi for RecordingClient {
    async fn create_file(&self, name: &str, mime_type: &str) -> Result<CreatedFile, GoogleApiError> {
        self.attempt("drive")?;
        self.shared
            .recorded
            .lock()
            .unwrap()
            .created_files
            .push((name.to_string(), mime_type.to_string()));
        Ok(CreatedFile {
            id: self.shared.file_id.clone(),
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl DocsApi for RecordingClient {
    async fn insert_text(
        &self,
        document_id: &str,
        index: u32,
        text: &str,
    ) -> Result<(), GoogleApiError> {
        self.attempt("docs")?;
        self.shared
            .recorded
            .lock()
            .unwrap()
            .text_inserts
            .push((document_id.to_string(), index, text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SheetsApi for RecordingClient {
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<u32, GoogleApiError> {
        self.attempt("sheets")?;
        self.shared.recorded.lock().unwrap().value_updates.push((
            spreadsheet_id.to_string(),
            range.to_string(),
            values.to_vec(),
        ));
        Ok(values.len() as u32)
    }
}

// =============================================================================
// MODEL AND BRIDGE CLIENT
// =============================================================================

/// Replays canned model replies in order.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<AiProviderResponse>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<AiProviderResponse>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    async fn chat_complete(
        &self,
        _messages: &[AiMessage],
        _functions: &[FunctionDef],
        _config: &AiConfig,
    ) -> Result<AiProviderResponse, AiError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AiError::InvalidResponse("no scripted reply left".to_string()))
    }
}

enum BridgeBehaviour {
    Succeed { resource_id: String },
    RequireAuth { authorization_url: String },
    Fail { kind: FailureKind, message: String },
}

/// Answers every call the same way and records the requests.
pub struct FakeBridgeClient {
    behaviour: BridgeBehaviour,
    calls: Mutex<Vec<BridgeRequest>>,
}

impl FakeBridgeClient {
    fn with(behaviour: BridgeBehaviour) -> Self {
        Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creations return `resource_id`; edits echo the id they were given.
    pub fn succeeding(resource_id: &str) -> Self {
        Self::with(BridgeBehaviour::Succeed {
            resource_id: resource_id.to_string(),
        })
    }

    pub fn requiring_auth(authorization_url: &str) -> Self {
        Self::with(BridgeBehaviour::RequireAuth {
            authorization_url: authorization_url.to_string(),
        })
    }

    pub fn failing(kind: FailureKind, message: &str) -> Self {
        Self::with(BridgeBehaviour::Fail {
            kind,
            message: message.to_string(),
        })
    }

    pub fn calls(&self) -> Vec<BridgeRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeClient for FakeBridgeClient {
    async fn call(&self, request: &BridgeRequest) -> OperationResult {
        self.calls.lock().unwrap().push(request.clone());

        match &self.behaviour {
            BridgeBehaviour::RequireAuth { authorization_url } => OperationResult::AuthRequired {
                authorization_url: authorization_url.clone(),
            },
            BridgeBehaviour::Fail { kind, message } => {
                OperationResult::failure(*kind, message.clone(), None)
            }
            BridgeBehaviour::Succeed { resource_id } => {
                let envelope = match request {
                    BridgeRequest::CreateDocument(_) => json!({
                        "status": "success",
                        "message": "created",
                        "doc_id": resource_id,
                        "link": document_link(resource_id),
                    }),
                    BridgeRequest::CreateSheet(_) => json!({
                        "status": "success",
                        "message": "created",
                        "sheet_id": resource_id,
                        "link": spreadsheet_link(resource_id),
                    }),
                    BridgeRequest::AppendText(req) => json!({
                        "status": "success",
                        "message": "appended",
                        "doc_id": req.doc_id,
                        "appended_text": req.text,
                    }),
                    BridgeRequest::PopulateSheet(req) => json!({
                        "status": "success",
                        "message": "written",
                        "sheet_id": req.sheet_id,
                        "rows_added": req.values.len(),
                        "link": spreadsheet_link(&req.sheet_id),
                    }),
                };
                OperationResult::from_envelope(&envelope, None)
            }
        }
    }

    async fn is_authenticated(&self) -> Result<bool, BridgeClientError> {
        Ok(!matches!(self.behaviour, BridgeBehaviour::RequireAuth { .. }))
    }
}
