//! Uniform outcome of a bridge operation and its JSON envelope.
//!
//! The envelope is the contract between the bridge and its callers, so both
//! directions live here: the HTTP layer writes it with [`OperationResult::to_envelope`]
//! and the chat dispatcher reads it back with [`OperationResult::from_envelope`].

use serde_json::{json, Map, Value};

use super::BridgeError;

/// What went wrong, coarsely. Drives the HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    AuthExchange,
    Upstream,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::AuthExchange => "auth_exchange",
            FailureKind::Upstream => "upstream",
            FailureKind::Internal => "internal",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "validation" => FailureKind::Validation,
            "auth_exchange" => FailureKind::AuthExchange,
            "upstream" => FailureKind::Upstream,
            _ => FailureKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationSuccess {
    pub resource_id: String,
    pub resource_link: Option<String>,
    pub message: String,
    /// Operation-specific keys, e.g. `doc_id` and `link`.
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationFailure {
    pub kind: FailureKind,
    pub message: String,
    pub upstream_status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Success(OperationSuccess),
    AuthRequired { authorization_url: String },
    Failure(OperationFailure),
}

impl OperationResult {
    pub fn failure(kind: FailureKind, message: impl Into<String>, upstream_status: Option<u16>) -> Self {
        OperationResult::Failure(OperationFailure {
            kind,
            message: message.into(),
            upstream_status,
        })
    }

    /// Renders the `{status, ...}` JSON envelope.
    pub fn to_envelope(&self) -> Value {
        match self {
            OperationResult::Success(success) => {
                let mut body = Map::new();
                body.insert("status".to_string(), json!("success"));
                body.insert("message".to_string(), json!(success.message));
                for (key, value) in &success.fields {
                    body.insert(key.clone(), value.clone());
                }
                Value::Object(body)
            }
            OperationResult::AuthRequired { authorization_url } => json!({
                "status": "error",
                "message": "Authentication with Google is required",
                "auth_url": authorization_url,
            }),
            OperationResult::Failure(failure) => {
                let mut body = json!({
                    "status": "error",
                    "error": failure.kind.as_str(),
                    "message": failure.message,
                });
                if let Some(status) = failure.upstream_status {
                    body["upstream_status"] = json!(status);
                }
                body
            }
        }
    }

    /// Reads an envelope produced by [`OperationResult::to_envelope`].
    ///
    /// `http_status` is used as the upstream status when an error envelope
    /// does not carry its own.
    pub fn from_envelope(envelope: &Value, http_status: Option<u16>) -> Self {
        let status = envelope.get("status").and_then(Value::as_str);
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match status {
            Some("success") => {
                let fields: Map<String, Value> = envelope
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .filter(|(k, _)| k.as_str() != "status" && k.as_str() != "message")
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                let resource_id = ["doc_id", "sheet_id"]
                    .iter()
                    .find_map(|key| fields.get(*key).and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_string();
                let resource_link = fields.get("link").and_then(Value::as_str).map(str::to_string);
                OperationResult::Success(OperationSuccess {
                    resource_id,
                    resource_link,
                    message,
                    fields,
                })
            }
            Some("error") => {
                if let Some(url) = envelope
                    .get("auth_url")
                    .and_then(Value::as_str)
                    .filter(|url| !url.is_empty())
                {
                    return OperationResult::AuthRequired {
                        authorization_url: url.to_string(),
                    };
                }
                let kind = envelope
                    .get("error")
                    .and_then(Value::as_str)
                    .map(FailureKind::parse)
                    .unwrap_or(FailureKind::Upstream);
                let upstream_status = envelope
                    .get("upstream_status")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok())
                    .or(http_status);
                let message = if message.is_empty() {
                    "The bridge reported an error without a message".to_string()
                } else {
                    message
                };
                OperationResult::failure(kind, message, upstream_status)
            }
            _ => OperationResult::failure(
                FailureKind::Upstream,
                format!("Unrecognised bridge response: {}", envelope),
                http_status,
            ),
        }
    }
}

impl From<BridgeError> for OperationResult {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::AuthRequired { authorization_url } => {
                OperationResult::AuthRequired { authorization_url }
            }
            BridgeError::Validation(message) => {
                OperationResult::failure(FailureKind::Validation, message, None)
            }
            BridgeError::Upstream(upstream) => {
                let status = upstream.status();
                OperationResult::failure(FailureKind::Upstream, upstream.to_string(), status)
            }
            BridgeError::Auth(auth) if auth.is_exchange_error() => {
                OperationResult::failure(FailureKind::AuthExchange, auth.to_string(), None)
            }
            BridgeError::Auth(auth) => {
                OperationResult::failure(FailureKind::Internal, auth.to_string(), None)
            }
            BridgeError::Internal(message) => {
                OperationResult::failure(FailureKind::Internal, message, None)
            }
        }
    }
}
