pub mod ai_service;
pub mod dispatcher;
pub mod formatting;
pub mod models;

pub use ai_service::{AiError, AiProvider};
pub use dispatcher::{BridgeClient, BridgeClientError, ChatDispatcher};
pub use models::AiConfig;
