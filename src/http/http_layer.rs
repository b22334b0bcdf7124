// The http module is the axum adapter over the core services.
// Routes are built from the operation catalog, so adding an operation there
// adds its endpoint here.

#[path = "response.rs"]
pub mod response;

#[path = "routes.rs"]
pub mod routes;

#[path = "state.rs"]
pub mod state;

use std::future::Future;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::core::bridge::{catalog, OperationKind};

pub use state::AppState;

/// Older endpoint names chat clients still call.
const ENDPOINT_ALIASES: &[(&str, OperationKind)] = &[
    ("/create_doc_chat", OperationKind::CreateDocument),
    ("/create_sheet_chat", OperationKind::CreateSheet),
];

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(routes::root))
        .route("/auth", get(routes::auth))
        .route("/auth/status", get(routes::auth_status))
        .route("/oauth2callback", get(routes::oauth2callback))
        .route("/logout", post(routes::logout));

    for op in catalog() {
        router = router.route(&format!("/{}", op.endpoint), operation_route(op.kind));
    }
    for (path, kind) in ENDPOINT_ALIASES {
        router = router.route(path, operation_route(*kind));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn operation_route(kind: OperationKind) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, body: Bytes| routes::run_operation(state, kind, body))
}

/// Serves until `shutdown` resolves, then lets in-flight requests finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
