// Command line and environment configuration.
//
// Every flag can also be set through the environment (optionally from a
// .env file, which main() loads before parsing).

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::infra::ai::openai_client::OPENAI_BASE_URL;

pub const DEFAULT_SCOPES: &str = "https://www.googleapis.com/auth/drive.file,\
https://www.googleapis.com/auth/documents,\
https://www.googleapis.com/auth/spreadsheets";

#[derive(Debug, Parser)]
#[command(name = "drive-bridge", version, about = "HTTP bridge between chat clients and Google Docs/Sheets")]
pub struct Cli {
    /// Timeout for every outbound call (Google, OpenAI, the bridge).
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 15, global = true)]
    pub upstream_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP bridge.
    Serve(ServeArgs),
    /// Interactive chat that drives the bridge through the model.
    Chat(ChatArgs),
    /// Generate a content plan sheet in one shot.
    Plan {
        #[command(flatten)]
        chat: ChatArgs,
        /// What the plan is about, e.g. "fitness coaching".
        #[arg(default_value = "")]
        topic: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CredentialBackend {
    Memory,
    File,
}

/// How the OAuth callback's `state` is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionMode {
    /// Server-side pending states only.
    Token,
    /// Also bind the state to a browser cookie set on `/auth`.
    Cookie,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, env = "BRIDGE_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub client_id: String,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    #[arg(
        long,
        env = "GOOGLE_REDIRECT_URI",
        default_value = "http://localhost:8000/oauth2callback"
    )]
    pub redirect_uri: String,

    #[arg(long, env = "GOOGLE_SCOPES", value_delimiter = ',', default_value = DEFAULT_SCOPES)]
    pub scopes: Vec<String>,

    #[arg(long, env = "CREDENTIAL_BACKEND", value_enum, default_value_t = CredentialBackend::File)]
    pub credential_backend: CredentialBackend,

    #[arg(long, env = "CREDENTIAL_PATH", default_value = "data/credential.json")]
    pub credential_path: PathBuf,

    #[arg(long, env = "SESSION_MODE", value_enum, default_value_t = SessionMode::Token)]
    pub session_mode: SessionMode,

    /// Where browsers reach this bridge. In cookie mode, auth-required
    /// results point at `{public_url}/auth?redirect=true`.
    #[arg(long, env = "BRIDGE_PUBLIC_URL", default_value = "http://localhost:8000")]
    pub public_url: String,
}

impl ServeArgs {
    /// Scopes with blanks and duplicates removed.
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        for scope in self.scopes.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if !scopes.iter().any(|s| s == scope) {
                scopes.push(scope.to_string());
            }
        }
        scopes
    }
}

#[derive(Debug, Clone, Args)]
pub struct ChatArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = OPENAI_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, env = "BRIDGE_URL", default_value = "http://localhost:8000")]
    pub bridge_url: String,
}
