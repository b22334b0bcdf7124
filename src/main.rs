// This is the entry point of the Drive bridge.
//
// **Architecture Overview:**
// - `core/` = Business logic (credentials, Google clients, bridge operations, chat dispatch)
// - `infra/` = Implementations of core traits (credential stores, Google/OpenAI HTTP clients)
// - `http/` = axum adapter exposing the bridge
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Run the chosen subcommand: the HTTP server, the chat REPL, or a one-shot plan

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "http/http_layer.rs"]
mod http;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

#[cfg(test)]
mod test_support;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::config::{ChatArgs, Cli, Command, CredentialBackend, ServeArgs};
use crate::core::ai::dispatcher::{is_content_plan_request, plan_topic};
use crate::core::ai::{AiConfig, AiProvider, ChatDispatcher};
use crate::core::auth::{CredentialService, CredentialStore};
use crate::core::bridge::BridgeService;
use crate::core::google::ServiceFactory;
use crate::http::AppState;
use crate::infra::ai::OpenAiClient;
use crate::infra::auth::{
    FileCredentialStore, GoogleOAuthClient, InMemoryCredentialStore, OAuthClientConfig,
};
use crate::infra::bridge::HttpBridgeClient;
use crate::infra::google::GoogleRestConnector;

const DEFAULT_LOG_FILTER: &str = "info,drive_bridge=debug";

type Dispatcher = ChatDispatcher<Box<dyn AiProvider>, HttpBridgeClient>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists) before
    // anything reads them, RUST_LOG included.
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let timeout = cli.upstream_timeout();

    match cli.command {
        Command::Serve(args) => run_server(args, timeout).await,
        Command::Chat(args) => run_chat(args, timeout).await,
        Command::Plan { chat, topic } => run_plan(chat, topic, timeout).await,
    }
}

// ============================================================================
// SERVER
// ============================================================================

async fn run_server(args: ServeArgs, timeout: Duration) -> anyhow::Result<()> {
    let scopes = args.scopes();
    if scopes.is_empty() {
        anyhow::bail!("GOOGLE_SCOPES must name at least one scope");
    }

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let store: Arc<dyn CredentialStore> = match args.credential_backend {
        CredentialBackend::Memory => Arc::new(InMemoryCredentialStore::new()),
        CredentialBackend::File => {
            let store = FileCredentialStore::open(args.credential_path.clone())
                .await
                .with_context(|| {
                    format!("failed to open credential file {}", args.credential_path.display())
                })?;
            tracing::info!(path = %store.path().display(), "Using file credential store");
            Arc::new(store)
        }
    };

    let oauth = GoogleOAuthClient::new(
        OAuthClientConfig {
            client_id: args.client_id.clone(),
            client_secret: args.client_secret.clone(),
            redirect_uri: args.redirect_uri.clone(),
        },
        timeout,
    )
    .context("invalid Google OAuth endpoint")?;

    let credentials = Arc::new(CredentialService::new(store, Arc::new(oauth), scopes));
    tracing::debug!(scopes = ?credentials.scopes(), "Configured Google scopes");
    let connector = Arc::new(GoogleRestConnector::new(timeout));
    let factory = Arc::new(ServiceFactory::new(Arc::clone(&credentials), connector));
    let bridge = Arc::new(BridgeService::new(factory));

    match credentials.status().await {
        Ok(status) if status.authenticated => {
            tracing::info!(expires_at = ?status.expires_at, "Loaded stored Google credential")
        }
        Ok(_) => tracing::info!("No usable Google credential yet; visit /auth to sign in"),
        Err(e) => tracing::warn!("Could not read credential store: {}", e),
    }

    let state = AppState::new(credentials, bridge, args.session_mode, args.public_url.clone());

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(
        addr = %args.bind,
        public_url = %args.public_url,
        backend = ?args.credential_backend,
        session_mode = ?args.session_mode,
        "Drive bridge listening"
    );

    http::serve(listener, state, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

// ============================================================================
// CHAT
// ============================================================================

fn build_dispatcher(args: &ChatArgs, timeout: Duration) -> Dispatcher {
    let provider: Box<dyn AiProvider> = Box::new(OpenAiClient::new(
        args.openai_api_key.clone(),
        args.openai_base_url.clone(),
        timeout,
    ));
    let bridge = HttpBridgeClient::new(args.bridge_url.clone(), timeout);
    let config = AiConfig {
        model: args.model.clone(),
        temperature: 0.7,
        max_tokens: None,
    };
    ChatDispatcher::new(provider, bridge, config)
}

async fn run_chat(args: ChatArgs, timeout: Duration) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(&args, timeout);

    match dispatcher.is_authenticated().await {
        Ok(true) => println!("✅ The bridge is signed in to Google."),
        Ok(false) => println!(
            "⚠️ The bridge is not signed in yet. Open {}/auth?redirect=true to authenticate.",
            args.bridge_url.trim_end_matches('/')
        ),
        Err(e) => println!("⚠️ Could not reach the bridge at {}: {}", args.bridge_url, e),
    }
    println!("Ask me to create or fill a Google Doc or Sheet. Type 'exit' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nYou: ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit") {
            break;
        }

        let outcome = if is_content_plan_request(text) {
            dispatcher.content_plan(&plan_topic(text)).await
        } else {
            dispatcher.handle(text).await
        };

        match outcome {
            Ok(outcome) => println!("Bot: {}", outcome.reply),
            Err(e) => {
                tracing::warn!("Chat turn failed: {}", e);
                println!("Bot: ❌ {}", e);
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn run_plan(args: ChatArgs, topic: String, timeout: Duration) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(&args, timeout);
    let outcome = dispatcher
        .content_plan(&topic)
        .await
        .context("content plan generation failed")?;
    println!("{}", outcome.reply);
    Ok(())
}
