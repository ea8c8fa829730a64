// Core Gemini API functionality for the simulator suite:
// - API client for Gemini
// - Request/response data structures
// - Bound chat context (history owned by one conversation)
// - Configuration loading
// - Shared error types

// Export client module - API client for Gemini
pub mod client;
pub use client::*;

// Export chat module - provider trait and bound context
pub mod chat;
pub use chat::*;

// Export types module - Request/response data structures
pub mod types;
pub use types::*;

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;
