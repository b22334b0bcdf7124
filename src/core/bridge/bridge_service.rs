// This is the bridge module - every catalog operation runs through here.
// Each one follows the same protocol: validate the body, ask the service
// factory for a client, make one upstream call, and shape the result.
// Nothing is retried: creations are not idempotent.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::core::auth::{Access, AuthError};
use crate::core::google::{
    DocsApi, DriveApi, GoogleApiError, ServiceClient, ServiceFactory, ServiceKind, SheetsApi,
    DOCUMENT_MIME_TYPE, SPREADSHEET_MIME_TYPE,
};

use super::operations::{
    AppendTextRequest, BridgeRequest, CreateDocRequest, CreateSheetRequest, OperationKind,
    PopulateSheetRequest,
};
use super::result::{OperationResult, OperationSuccess};

pub const DOCUMENT_LINK_PREFIX: &str = "https://docs.google.com/document/d/";
pub const SPREADSHEET_LINK_PREFIX: &str = "https://docs.google.com/spreadsheets/d/";

/// Body index 1 is the first position inside a Google Doc.
pub const APPEND_INDEX: u32 = 1;

/// Population always starts at the top-left cell.
pub const POPULATE_RANGE: &str = "A1";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0}")]
    Validation(String),

    /// Not a failure. Carried as an error only so `?` can short-circuit;
    /// it becomes `OperationResult::AuthRequired`.
    #[error("Authentication with Google is required")]
    AuthRequired { authorization_url: String },

    #[error(transparent)]
    Upstream(#[from] GoogleApiError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Internal(String),
}

trait GrantedOr<T> {
    fn granted(self) -> Result<T, BridgeError>;
}

impl<T> GrantedOr<T> for Access<T> {
    fn granted(self) -> Result<T, BridgeError> {
        match self {
            Access::Granted(value) => Ok(value),
            Access::AuthRequired { authorization_url } => {
                Err(BridgeError::AuthRequired { authorization_url })
            }
        }
    }
}

pub fn document_link(id: &str) -> String {
    format!("{}{}", DOCUMENT_LINK_PREFIX, id)
}

pub fn spreadsheet_link(id: &str) -> String {
    format!("{}{}", SPREADSHEET_LINK_PREFIX, id)
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct BridgeService {
    factory: Arc<ServiceFactory>,
}

impl BridgeService {
    pub fn new(factory: Arc<ServiceFactory>) -> Self {
        Self { factory }
    }

    /// Parses `args` as the input of `kind` and runs it.
    pub async fn execute(&self, kind: OperationKind, args: &Value) -> OperationResult {
        match BridgeRequest::parse(kind, args) {
            Ok(request) => self.run(request).await,
            Err(err) => Self::finish(kind, Err(err)),
        }
    }

    /// Validates and runs an already-typed request.
    pub async fn run(&self, request: BridgeRequest) -> OperationResult {
        let kind = request.kind();
        if let Err(err) = request.validate() {
            return Self::finish(kind, Err(err));
        }
        let outcome = match request {
            BridgeRequest::CreateDocument(req) => self.create_document(&req).await,
            BridgeRequest::AppendText(req) => self.append_text(&req).await,
            BridgeRequest::CreateSheet(req) => self.create_sheet(&req).await,
            BridgeRequest::PopulateSheet(req) => self.populate_sheet(&req).await,
        };
        Self::finish(kind, outcome)
    }

    async fn create_document(&self, req: &CreateDocRequest) -> Result<OperationResult, BridgeError> {
        let drive = self.drive().await?;

        let name = req.name.trim();
        let file = drive.create_file(name, DOCUMENT_MIME_TYPE).await?;
        let link = document_link(&file.id);
        tracing::info!(doc_id = %file.id, "Created Google Doc");

        Ok(success(
            &file.id,
            Some(link.clone()),
            format!("Document '{}' created successfully", name),
            [("doc_id", json!(file.id)), ("link", json!(link))],
        ))
    }

    async fn append_text(&self, req: &AppendTextRequest) -> Result<OperationResult, BridgeError> {
        let docs = self.docs().await?;

        docs.insert_text(&req.doc_id, APPEND_INDEX, &req.text).await?;
        tracing::info!(doc_id = %req.doc_id, chars = req.text.len(), "Appended text to Google Doc");

        Ok(success(
            &req.doc_id,
            Some(document_link(&req.doc_id)),
            "Text appended successfully".to_string(),
            [("doc_id", json!(req.doc_id)), ("appended_text", json!(req.text))],
        ))
    }

    async fn create_sheet(&self, req: &CreateSheetRequest) -> Result<OperationResult, BridgeError> {
        let drive = self.drive().await?;

        let name = req.name.trim();
        let file = drive.create_file(name, SPREADSHEET_MIME_TYPE).await?;
        let link = spreadsheet_link(&file.id);
        tracing::info!(sheet_id = %file.id, "Created Google Sheet");

        Ok(success(
            &file.id,
            Some(link.clone()),
            format!("Spreadsheet '{}' created successfully", name),
            [("sheet_id", json!(file.id)), ("link", json!(link))],
        ))
    }

    async fn populate_sheet(&self, req: &PopulateSheetRequest) -> Result<OperationResult, BridgeError> {
        let sheets = self.sheets().await?;

        let updated = sheets
            .update_values(&req.sheet_id, POPULATE_RANGE, &req.values)
            .await?;
        let rows_added = req.values.len();
        if updated as usize != rows_added {
            tracing::debug!(
                sheet_id = %req.sheet_id,
                reported = updated,
                sent = rows_added,
                "Sheets reported a different updated row count"
            );
        }
        tracing::info!(sheet_id = %req.sheet_id, rows = rows_added, "Populated Google Sheet");

        Ok(success(
            &req.sheet_id,
            Some(spreadsheet_link(&req.sheet_id)),
            format!("{} rows written", rows_added),
            [("sheet_id", json!(req.sheet_id)), ("rows_added", json!(rows_added))],
        ))
    }

    async fn drive(&self) -> Result<Arc<dyn DriveApi>, BridgeError> {
        match self.factory.get_client(ServiceKind::Drive).await?.granted()? {
            ServiceClient::Drive(client) => Ok(client),
            _ => Err(unexpected_client(ServiceKind::Drive)),
        }
    }

    async fn docs(&self) -> Result<Arc<dyn DocsApi>, BridgeError> {
        match self.factory.get_client(ServiceKind::Docs).await?.granted()? {
            ServiceClient::Docs(client) => Ok(client),
            _ => Err(unexpected_client(ServiceKind::Docs)),
        }
    }

    async fn sheets(&self) -> Result<Arc<dyn SheetsApi>, BridgeError> {
        match self.factory.get_client(ServiceKind::Sheets).await?.granted()? {
            ServiceClient::Sheets(client) => Ok(client),
            _ => Err(unexpected_client(ServiceKind::Sheets)),
        }
    }

    fn finish(kind: OperationKind, outcome: Result<OperationResult, BridgeError>) -> OperationResult {
        match outcome {
            Ok(result) => result,
            Err(err) => {
                match &err {
                    BridgeError::AuthRequired { .. } => {
                        tracing::debug!(operation = kind.function_name(), "Authentication required")
                    }
                    BridgeError::Validation(msg) => {
                        tracing::debug!(operation = kind.function_name(), "Rejected request: {}", msg)
                    }
                    other => {
                        tracing::warn!(operation = kind.function_name(), "Operation failed: {}", other)
                    }
                }
                err.into()
            }
        }
    }
}

fn unexpected_client(kind: ServiceKind) -> BridgeError {
    BridgeError::Internal(format!("service factory returned the wrong client for {}", kind.as_str()))
}

fn success<const N: usize>(
    resource_id: &str,
    resource_link: Option<String>,
    message: String,
    fields: [(&str, Value); N],
) -> OperationResult {
    let fields: Map<String, Value> = fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    OperationResult::Success(OperationSuccess {
        resource_id: resource_id.to_string(),
        resource_link,
        message,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::CredentialStore;
    use crate::core::bridge::FailureKind;
    use crate::test_support::{
        credential_service, fresh_credential, FakeOAuth, MemoryStore, RecordingConnector,
    };

    async fn bridge(authenticated: bool, connector: Arc<RecordingConnector>) -> BridgeService {
        let store = Arc::new(MemoryStore::default());
        if authenticated {
            store.save(&fresh_credential("live-token")).await.unwrap();
        }
        let credentials = credential_service(store, Arc::new(FakeOAuth::default()));
        BridgeService::new(Arc::new(ServiceFactory::new(credentials, connector)))
    }

    #[tokio::test]
    async fn test_create_document_returns_id_and_link() {
        let connector = Arc::new(RecordingConnector::with_file_id("abc123"));
        let svc = bridge(true, connector.clone()).await;

        let result = svc
            .execute(OperationKind::CreateDocument, &json!({"name": "Meeting Notes"}))
            .await;

        let OperationResult::Success(success) = result else {
            panic!("expected success, got {:?}", result);
        };
        assert_eq!(success.resource_id, "abc123");
        assert_eq!(
            success.resource_link.as_deref(),
            Some("https://docs.google.com/document/d/abc123")
        );
        assert_eq!(success.fields["doc_id"], "abc123");
        assert_eq!(
            connector.created_files(),
            vec![("Meeting Notes".to_string(), DOCUMENT_MIME_TYPE.to_string())]
        );
    }

    #[tokio::test]
    async fn test_create_sheet_uses_spreadsheet_link() {
        let connector = Arc::new(RecordingConnector::with_file_id("s-9"));
        let svc = bridge(true, connector.clone()).await;

        let result = svc
            .execute(OperationKind::CreateSheet, &json!({"name": "Budget 2024"}))
            .await;

        let envelope = result.to_envelope();
        assert_eq!(envelope["sheet_id"], "s-9");
        assert_eq!(envelope["link"], "https://docs.google.com/spreadsheets/d/s-9");
        assert_eq!(connector.created_files()[0].1, SPREADSHEET_MIME_TYPE);
    }

    #[tokio::test]
    async fn test_populate_sends_literal_values_at_top_left() {
        let connector = Arc::new(RecordingConnector::default());
        let svc = bridge(true, connector.clone()).await;

        let result = svc
            .execute(
                OperationKind::PopulateSheet,
                &json!({"sheet_id": "s1", "values": [["a", "b"], ["c", "d"]]}),
            )
            .await;

        assert_eq!(result.to_envelope()["rows_added"], 2);
        let updates = connector.value_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0],
            (
                "s1".to_string(),
                "A1".to_string(),
                vec![
                    vec!["a".to_string(), "b".to_string()],
                    vec!["c".to_string(), "d".to_string()],
                ]
            )
        );
    }

    #[tokio::test]
    async fn test_append_inserts_at_fixed_index() {
        let connector = Arc::new(RecordingConnector::default());
        let svc = bridge(true, connector.clone()).await;

        let result = svc
            .execute(OperationKind::AppendText, &json!({"doc_id": "d1", "text": "hello"}))
            .await;

        assert_eq!(result.to_envelope()["appended_text"], "hello");
        assert_eq!(
            connector.text_inserts(),
            vec![("d1".to_string(), APPEND_INDEX, "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_malformed_bodies_make_no_upstream_calls() {
        let connector = Arc::new(RecordingConnector::default());
        let svc = bridge(true, connector.clone()).await;

        let bodies = [
            (OperationKind::CreateDocument, json!({})),
            (OperationKind::CreateSheet, json!({"name": ""})),
            (OperationKind::AppendText, json!({"doc_id": "d1"})),
            (OperationKind::PopulateSheet, json!({"values": [["a"]]})),
            (OperationKind::AppendText, json!({"doc_id": "d1", "text": ""})),
            (OperationKind::PopulateSheet, json!({"sheet_id": "s1/values/Z100#", "values": [["a"]]})),
        ];

        for (kind, body) in bodies {
            let result = svc.execute(kind, &body).await;
            match result {
                OperationResult::Failure(failure) => {
                    assert_eq!(failure.kind, FailureKind::Validation, "{}", body)
                }
                other => panic!("expected validation failure for {}, got {:?}", body, other),
            }
        }
        assert_eq!(connector.upstream_calls(), 0);
        assert!(connector.tokens_seen().is_empty());
    }

    #[tokio::test]
    async fn test_empty_values_write_zero_rows() {
        let connector = Arc::new(RecordingConnector::default());
        let svc = bridge(true, connector.clone()).await;

        let result = svc
            .execute(OperationKind::PopulateSheet, &json!({"sheet_id": "s1", "values": []}))
            .await;

        let envelope = result.to_envelope();
        assert_eq!(envelope["status"], "success");
        assert_eq!(envelope["rows_added"], 0);
        assert_eq!(connector.value_updates().len(), 1);
    }

    #[tokio::test]
    async fn test_whitespace_text_is_appended_verbatim() {
        let connector = Arc::new(RecordingConnector::default());
        let svc = bridge(true, connector.clone()).await;

        let result = svc
            .execute(OperationKind::AppendText, &json!({"doc_id": "d1", "text": "\n"}))
            .await;

        assert_eq!(result.to_envelope()["status"], "success");
        assert_eq!(
            connector.text_inserts(),
            vec![("d1".to_string(), APPEND_INDEX, "\n".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_returns_auth_url_and_creates_nothing() {
        let connector = Arc::new(RecordingConnector::default());
        let svc = bridge(false, connector.clone()).await;

        let result = svc
            .execute(OperationKind::CreateDocument, &json!({"name": "X"}))
            .await;

        match result {
            OperationResult::AuthRequired { authorization_url } => {
                assert!(!authorization_url.is_empty())
            }
            other => panic!("expected AuthRequired, got {:?}", other),
        }
        assert_eq!(connector.upstream_calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_error_is_surfaced_with_status() {
        let connector = Arc::new(RecordingConnector::failing(403, "The caller does not have permission"));
        let svc = bridge(true, connector.clone()).await;

        let result = svc
            .execute(OperationKind::AppendText, &json!({"doc_id": "d1", "text": "x"}))
            .await;

        match result {
            OperationResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Upstream);
                assert_eq!(failure.upstream_status, Some(403));
                assert!(failure.message.contains("does not have permission"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        // One attempt, no retry.
        assert_eq!(connector.upstream_calls(), 1);
    }
}
