// The service factory hands out authenticated Drive/Docs/Sheets clients.
// It knows nothing about HTTP: the clients are ports, and the infra layer
// decides how they talk to Google.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::auth::{Access, AuthError, CredentialService};

pub const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";
pub const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

/// Which Google API a client is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Drive,
    Docs,
    Sheets,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Drive => "drive",
            ServiceKind::Docs => "docs",
            ServiceKind::Sheets => "sheets",
        }
    }
}

/// Errors from a Google API call. Never retried by us.
#[derive(Debug, Error)]
pub enum GoogleApiError {
    #[error("Google {service} API returned {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Request to Google {service} API failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("Request to Google {service} API timed out")]
    Timeout { service: &'static str },
}

impl GoogleApiError {
    /// HTTP status Google answered with, when we got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            GoogleApiError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A file Drive created for us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedFile {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait DriveApi: Send + Sync {
    async fn create_file(&self, name: &str, mime_type: &str) -> Result<CreatedFile, GoogleApiError>;
}

#[async_trait]
pub trait DocsApi: Send + Sync {
    /// Inserts `text` at `index` in the document body.
    async fn insert_text(&self, document_id: &str, index: u32, text: &str)
        -> Result<(), GoogleApiError>;
}

#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Overwrites cells starting at `range` with `values`, row-major.
    /// Returns the number of rows Google reports as updated.
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<u32, GoogleApiError>;
}

/// Builds API clients bound to one access token.
pub trait GoogleApiConnector: Send + Sync {
    fn drive(&self, access_token: &str) -> Arc<dyn DriveApi>;
    fn docs(&self, access_token: &str) -> Arc<dyn DocsApi>;
    fn sheets(&self, access_token: &str) -> Arc<dyn SheetsApi>;
}

pub enum ServiceClient {
    Drive(Arc<dyn DriveApi>),
    Docs(Arc<dyn DocsApi>),
    Sheets(Arc<dyn SheetsApi>),
}

pub struct ServiceFactory {
    credentials: Arc<CredentialService>,
    connector: Arc<dyn GoogleApiConnector>,
}

impl ServiceFactory {
    pub fn new(credentials: Arc<CredentialService>, connector: Arc<dyn GoogleApiConnector>) -> Self {
        Self {
            credentials,
            connector,
        }
    }

    /// Returns a client for `kind`, or `AuthRequired` without building anything.
    ///
    /// `Err` is reserved for trouble with the credential store itself; a missing
    /// or unrefreshable credential is the `AuthRequired` variant.
    pub async fn get_client(&self, kind: ServiceKind) -> Result<Access<ServiceClient>, AuthError> {
        let access = self.credentials.current().await?;
        Ok(access.map(|credential| {
            let token = credential.access_token.as_str();
            match kind {
                ServiceKind::Drive => ServiceClient::Drive(self.connector.drive(token)),
                ServiceKind::Docs => ServiceClient::Docs(self.connector.docs(token)),
                ServiceKind::Sheets => ServiceClient::Sheets(self.connector.sheets(token)),
            }
        }))
    }
}
