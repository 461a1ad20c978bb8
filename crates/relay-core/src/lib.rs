//! Core types and error definitions for the Relay gateway.
//!
//! This crate provides the foundational types shared across all Relay crates,
//! including error handling, the chat message representation, and validation
//! of inbound chat requests.
//!
//! # Main types
//!
//! - [`RelayError`]: Unified error enum for all Relay subsystems.
//! - [`RelayResult`]: Convenience alias for `Result<T, RelayError>`.
//! - [`Role`]: Message role (system, user, assistant).
//! - [`ChatMessage`]: A single message within a chat request.
//! - [`validate_chat_request`]: Turns an untyped JSON payload into messages.

/// Error types shared by every Relay crate.
pub mod error;
/// Chat message types.
pub mod message;
/// Validation of inbound chat payloads.
pub mod validation;

pub use error::{RelayError, RelayResult};
pub use message::{ChatMessage, Role};
pub use validation::validate_chat_request;
