// The core module contains all business logic.
// Each feature gets its own submodule; nothing in here knows about HTTP
// or which Google/OpenAI client sits behind the traits.

#[path = "auth/credential_service.rs"]
pub mod auth;

#[path = "google/service_factory.rs"]
pub mod google;

#[path = "bridge/mod.rs"]
pub mod bridge;

#[path = "ai/mod.rs"]
pub mod ai;
