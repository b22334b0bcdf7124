// HTTP handlers.
//
// Handlers stay thin: pull the request apart, call the credential or bridge
// service, and turn the outcome into the `{status, ...}` envelope.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::response::BridgeResponse;
use super::state::AppState;
use crate::config::SessionMode;
use crate::core::auth::AuthError;
use crate::core::bridge::{catalog, FailureKind, OperationKind, OperationResult};

/// Cookie that binds `/auth` to the browser that later hits the callback.
pub const STATE_COOKIE: &str = "bridge_oauth_state";

const STATE_COOKIE_MAX_AGE_SECS: u32 = 600;

/// GET / - health check and endpoint listing.
pub async fn root() -> Json<Value> {
    let mut endpoints: Vec<Value> = vec![
        json!({"method": "GET", "path": "/auth", "description": "Start Google authorization"}),
        json!({"method": "GET", "path": "/auth/status", "description": "Whether a Google credential is stored"}),
        json!({"method": "POST", "path": "/logout", "description": "Forget the stored credential"}),
    ];
    endpoints.extend(catalog().iter().map(|op| {
        json!({
            "method": "POST",
            "path": format!("/{}", op.endpoint),
            "description": op.description,
        })
    }));

    Json(json!({
        "status": "success",
        "message": "Google Drive bridge is running",
        "endpoints": endpoints,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    #[serde(default)]
    pub redirect: bool,
}

/// GET /auth - issue a consent URL, or redirect straight to it.
pub async fn auth(State(state): State<AppState>, Query(query): Query<AuthQuery>) -> Response {
    let request = state.credentials.begin_authorization();
    tracing::debug!(redirect = query.redirect, "Issued authorization URL");

    let mut response = if query.redirect {
        Redirect::to(&request.authorization_url).into_response()
    } else {
        Json(json!({
            "status": "success",
            "auth_url": request.authorization_url,
        }))
        .into_response()
    };

    if state.session_mode == SessionMode::Cookie {
        set_state_cookie(&mut response, &request.state, STATE_COOKIE_MAX_AGE_SECS);
    }
    response
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /oauth2callback - Google redirects here after consent.
pub async fn oauth2callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let mut response = match complete_callback(&state, &headers, query).await {
        Ok(()) => Json(json!({
            "status": "success",
            "message": "Authentication successful. You can close this window and return to the chat.",
        }))
        .into_response(),
        Err(failure) => BridgeResponse(failure).into_response(),
    };

    if state.session_mode == SessionMode::Cookie {
        set_state_cookie(&mut response, "", 0);
    }
    response
}

async fn complete_callback(
    state: &AppState,
    headers: &HeaderMap,
    query: CallbackQuery,
) -> Result<(), OperationResult> {
    if let Some(error) = query.error {
        tracing::info!("Google declined the authorization: {}", error);
        return Err(OperationResult::failure(
            FailureKind::AuthExchange,
            format!("Google declined the authorization: {}", error),
            None,
        ));
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(OperationResult::failure(
            FailureKind::Validation,
            "The callback needs both 'code' and 'state'",
            None,
        ));
    };

    if state.session_mode == SessionMode::Cookie
        && cookie_value(headers, STATE_COOKIE) != Some(oauth_state.as_str())
    {
        tracing::warn!("OAuth callback state does not match the browser cookie");
        return Err(OperationResult::failure(
            FailureKind::AuthExchange,
            AuthError::InvalidState.to_string(),
            None,
        ));
    }

    match state.credentials.complete_authorization(&code, &oauth_state).await {
        Ok(_) => Ok(()),
        Err(err) if err.is_exchange_error() => {
            tracing::warn!("Authorization callback rejected: {}", err);
            Err(OperationResult::failure(FailureKind::AuthExchange, err.to_string(), None))
        }
        Err(err) => {
            tracing::error!("Could not store the new credential: {}", err);
            Err(OperationResult::failure(FailureKind::Internal, err.to_string(), None))
        }
    }
}

/// GET /auth/status - reports what is stored. Never refreshes.
pub async fn auth_status(State(state): State<AppState>) -> Response {
    match state.credentials.status().await {
        Ok(status) => Json(json!({
            "status": "success",
            "authenticated": status.authenticated,
            "expires_at": status.expires_at,
            "scopes": status.scopes,
        }))
        .into_response(),
        Err(err) => {
            BridgeResponse(OperationResult::failure(FailureKind::Internal, err.to_string(), None))
                .into_response()
        }
    }
}

/// POST /logout
pub async fn logout(State(state): State<AppState>) -> Response {
    match state.credentials.logout().await {
        Ok(()) => {
            tracing::info!("Stored Google credential cleared");
            Json(json!({
                "status": "success",
                "message": "Signed out of Google",
            }))
            .into_response()
        }
        Err(err) => {
            BridgeResponse(OperationResult::failure(FailureKind::Internal, err.to_string(), None))
                .into_response()
        }
    }
}

/// POST /{endpoint} for every catalog operation.
///
/// The body is taken raw so a malformed payload still gets the bridge's
/// own error envelope instead of axum's plain-text rejection.
pub async fn run_operation(state: AppState, kind: OperationKind, body: Bytes) -> BridgeResponse {
    let args: Value = match serde_json::from_slice(&body) {
        Ok(args) => args,
        Err(e) => {
            tracing::debug!(operation = kind.function_name(), "Body is not JSON: {}", e);
            return OperationResult::failure(
                FailureKind::Validation,
                format!("Request body is not valid JSON: {}", e),
                None,
            )
            .into();
        }
    };

    match state.bridge.execute(kind, &args).await {
        // A consent URL straight from the credential service has no cookie
        // behind it, so the callback would reject it.
        OperationResult::AuthRequired { .. } if state.session_mode == SessionMode::Cookie => {
            OperationResult::AuthRequired {
                authorization_url: state.auth_entry_url(),
            }
            .into()
        }
        result => result.into(),
    }
}

// =============================================================================
// COOKIES
// =============================================================================

fn set_state_cookie(response: &mut Response, value: &str, max_age: u32) {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        STATE_COOKIE, value, max_age
    );
    match HeaderValue::from_str(&cookie) {
        Ok(header) => {
            response.headers_mut().append(SET_COOKIE, header);
        }
        Err(e) => tracing::warn!("Could not build state cookie: {}", e),
    }
}

/// Finds `name` in the request's `Cookie` headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
