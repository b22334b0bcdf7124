// =============================================================================
// GOOGLE DRIVE / DOCS / SHEETS REST CLIENT
// =============================================================================
//
// Thin reqwest wrappers over the three Google endpoints the bridge needs:
//
// - Drive   `POST  /drive/v3/files`                         create an empty Doc or Sheet
// - Docs    `POST  /v1/documents/{id}:batchUpdate`          insertText at an index
// - Sheets  `PUT   /v4/spreadsheets/{id}/values/{range}`    overwrite cells, RAW input
//
// Each client is bound to one access token; the connector builds a fresh one
// per request from whatever token the credential service handed out.
// Requests are sent once. Every call has its own timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::core::google::{
    CreatedFile, DocsApi, DriveApi, GoogleApiConnector, GoogleApiError, ServiceKind, SheetsApi,
};

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DOCS_API_BASE: &str = "https://docs.googleapis.com/v1";
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// Base URLs for the three APIs. Overridable so tests can point at a local mock.
#[derive(Debug, Clone)]
pub struct GoogleApiEndpoints {
    pub drive: String,
    pub docs: String,
    pub sheets: String,
}

impl Default for GoogleApiEndpoints {
    fn default() -> Self {
        Self {
            drive: DRIVE_API_BASE.to_string(),
            docs: DOCS_API_BASE.to_string(),
            sheets: SHEETS_API_BASE.to_string(),
        }
    }
}

// =============================================================================
// GOOGLE API RESPONSE STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateValuesResponse {
    #[serde(default)]
    updated_rows: u32,
}

/// `{"error": {"code": 404, "message": "...", "status": "NOT_FOUND"}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// =============================================================================
// CONNECTOR
// =============================================================================

pub struct GoogleRestConnector {
    client: Client,
    endpoints: Arc<GoogleApiEndpoints>,
    timeout: Duration,
}

impl GoogleRestConnector {
    pub fn new(timeout: Duration) -> Self {
        Self::with_endpoints(GoogleApiEndpoints::default(), timeout)
    }

    pub fn with_endpoints(endpoints: GoogleApiEndpoints, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoints: Arc::new(endpoints),
            timeout,
        }
    }

    fn client_for(&self, service: ServiceKind, access_token: &str) -> GoogleApiClient {
        GoogleApiClient {
            client: self.client.clone(),
            endpoints: self.endpoints.clone(),
            access_token: access_token.to_string(),
            timeout: self.timeout,
            service,
        }
    }
}

impl GoogleApiConnector for GoogleRestConnector {
    fn drive(&self, access_token: &str) -> Arc<dyn DriveApi> {
        Arc::new(self.client_for(ServiceKind::Drive, access_token))
    }

    fn docs(&self, access_token: &str) -> Arc<dyn DocsApi> {
        Arc::new(self.client_for(ServiceKind::Docs, access_token))
    }

    fn sheets(&self, access_token: &str) -> Arc<dyn SheetsApi> {
        Arc::new(self.client_for(ServiceKind::Sheets, access_token))
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// One API client bound to one access token.
pub struct GoogleApiClient {
    client: Client,
    endpoints: Arc<GoogleApiEndpoints>,
    access_token: String,
    timeout: Duration,
    service: ServiceKind,
}

impl GoogleApiClient {
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GoogleApiError> {
        let service = self.service.as_str();

        let response = request
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| body.trim().to_string());
            tracing::debug!(service, status = status.as_u16(), "Google API error: {}", message);
            return Err(GoogleApiError::Upstream {
                service,
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| GoogleApiError::Transport {
            service,
            message: format!("unexpected response body: {}", e),
        })
    }

    /// Appends `segments` to `base`, percent-encoding each one so an id can
    /// never add path segments, a query or a fragment.
    fn endpoint_url(&self, base: &str, segments: &[&str]) -> Result<Url, GoogleApiError> {
        let service = self.service.as_str();
        let mut url = Url::parse(base).map_err(|e| GoogleApiError::Transport {
            service,
            message: format!("invalid API base URL {}: {}", base, e),
        })?;
        url.path_segments_mut()
            .map_err(|_| GoogleApiError::Transport {
                service,
                message: format!("API base URL {} cannot take a path", base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn transport_error(&self, err: reqwest::Error) -> GoogleApiError {
        let service = self.service.as_str();
        if err.is_timeout() {
            GoogleApiError::Timeout { service }
        } else {
            GoogleApiError::Transport {
                service,
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl DriveApi for GoogleApiClient {
    async fn create_file(&self, name: &str, mime_type: &str) -> Result<CreatedFile, GoogleApiError> {
        let url = self.endpoint_url(&self.endpoints.drive, &["files"])?;
        let request = self
            .client
            .post(url)
            .query(&[("fields", "id,name")])
            .json(&json!({ "name": name, "mimeType": mime_type }));

        let file: DriveFile = self.send(request).await?;
        Ok(CreatedFile {
            id: file.id,
            name: file.name,
        })
    }
}

#[async_trait]
impl DocsApi for GoogleApiClient {
    async fn insert_text(
        &self,
        document_id: &str,
        index: u32,
        text: &str,
    ) -> Result<(), GoogleApiError> {
        let method = format!("{}:batchUpdate", document_id);
        let url = self.endpoint_url(&self.endpoints.docs, &["documents", method.as_str()])?;
        let request = self.client.post(url).json(&json!({
            "requests": [{
                "insertText": {
                    "location": { "index": index },
                    "text": text,
                }
            }]
        }));

        let _: Value = self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl SheetsApi for GoogleApiClient {
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<u32, GoogleApiError> {
        let url = self.endpoint_url(
            &self.endpoints.sheets,
            &["spreadsheets", spreadsheet_id, "values", range],
        )?;
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": values,
            }));

        let response: UpdateValuesResponse = self.send(request).await?;
        Ok(response.updated_rows)
    }
}
