pub mod client;
pub mod mock;
pub mod rest;

pub use client::{CompletionClient, CompletionRequest};
pub use mock::ScriptedCompletionClient;
pub use rest::RestCompletionClient;
