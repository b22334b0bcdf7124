// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "auth/mod.rs"]
pub mod auth;

#[path = "google/mod.rs"]
pub mod google;

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "bridge/mod.rs"]
pub mod bridge;
