// HTTP client for the bridge, used by the chat dispatcher.
//
// Posts each catalog operation to its endpoint and reads the JSON envelope
// back into an OperationResult. Transport trouble becomes a Failure so the
// chat loop always has something to show.

use crate::core::ai::{BridgeClient, BridgeClientError};
use crate::core::bridge::{BridgeRequest, FailureKind, OperationResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub struct HttpBridgeClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBridgeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl BridgeClient for HttpBridgeClient {
    async fn call(&self, request: &BridgeRequest) -> OperationResult {
        let kind = request.kind();
        let url = self.url(kind.endpoint());

        let response = match self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request.to_json())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                tracing::warn!(operation = kind.function_name(), "Bridge request timed out");
                return OperationResult::failure(
                    FailureKind::Upstream,
                    format!("The bridge did not answer within {}s", self.timeout.as_secs()),
                    None,
                );
            }
            Err(e) => {
                tracing::warn!(operation = kind.function_name(), "Bridge request failed: {}", e);
                return OperationResult::failure(
                    FailureKind::Upstream,
                    format!("Could not reach the bridge at {}: {}", self.base_url, e),
                    None,
                );
            }
        };

        let status = response.status();
        match response.json::<Value>().await {
            Ok(envelope) => {
                let http_status = (!status.is_success()).then_some(status.as_u16());
                OperationResult::from_envelope(&envelope, http_status)
            }
            Err(e) => OperationResult::failure(
                FailureKind::Upstream,
                format!("The bridge answered {} with an unreadable body: {}", status, e),
                Some(status.as_u16()),
            ),
        }
    }

    async fn is_authenticated(&self) -> Result<bool, BridgeClientError> {
        let response = self
            .client
            .get(self.url("/auth/status"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BridgeClientError::Timeout
                } else {
                    BridgeClientError::Transport(e.to_string())
                }
            })?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| BridgeClientError::Transport(e.to_string()))?;
        Ok(body["authenticated"].as_bool().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionMode;
    use crate::core::auth::CredentialStore;
    use crate::core::bridge::operations::{CreateDocRequest, PopulateSheetRequest};
    use crate::core::bridge::BridgeService;
    use crate::core::google::ServiceFactory;
    use crate::http::{router, AppState};
    use crate::test_support::{
        bind_local, credential_service, fresh_credential, serve_router, FakeOAuth, MemoryStore,
        RecordingConnector,
    };
    use std::sync::Arc;

    async fn start_bridge(authenticated: bool, connector: RecordingConnector) -> HttpBridgeClient {
        let store = Arc::new(MemoryStore::default());
        if authenticated {
            store.save(&fresh_credential("live-token")).await.unwrap();
        }
        let credentials = credential_service(store, Arc::new(FakeOAuth::default()));
        let factory = Arc::new(ServiceFactory::new(credentials.clone(), Arc::new(connector)));
        let (listener, base) = bind_local().await;
        let state = AppState::new(
            credentials,
            Arc::new(BridgeService::new(factory)),
            SessionMode::Token,
            base.clone(),
        );
        serve_router(listener, router(state));
        HttpBridgeClient::new(base, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_success_envelope_round_trips() {
        let client = start_bridge(true, RecordingConnector::with_file_id("abc123")).await;

        let result = client
            .call(&BridgeRequest::CreateDocument(CreateDocRequest {
                name: "Notes".to_string(),
            }))
            .await;

        let OperationResult::Success(success) = result else {
            panic!("expected success, got {:?}", result);
        };
        assert_eq!(success.resource_id, "abc123");
        assert_eq!(
            success.resource_link.as_deref(),
            Some("https://docs.google.com/document/d/abc123")
        );
    }

    #[tokio::test]
    async fn test_auth_required_carries_url() {
        let client = start_bridge(false, RecordingConnector::default()).await;

        let result = client
            .call(&BridgeRequest::PopulateSheet(PopulateSheetRequest {
                sheet_id: "s1".to_string(),
                values: vec![vec!["a".to_string()]],
            }))
            .await;

        assert!(matches!(result, OperationResult::AuthRequired { .. }));
        assert!(!client.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_status() {
        let client = start_bridge(true, RecordingConnector::failing(403, "The caller does not have permission")).await;

        let result = client
            .call(&BridgeRequest::CreateDocument(CreateDocRequest {
                name: "Notes".to_string(),
            }))
            .await;

        let OperationResult::Failure(failure) = result else {
            panic!("expected failure, got {:?}", result);
        };
        assert_eq!(failure.kind, FailureKind::Upstream);
        assert_eq!(failure.upstream_status, Some(403));
        assert!(client.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_failure() {
        // Bind then drop so nothing is listening on the port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = HttpBridgeClient::new(format!("http://{}", addr), Duration::from_secs(2));

        let result = client
            .call(&BridgeRequest::CreateDocument(CreateDocRequest {
                name: "Notes".to_string(),
            }))
            .await;

        assert!(matches!(result, OperationResult::Failure(_)));
        assert!(client.is_authenticated().await.is_err());
    }
}
