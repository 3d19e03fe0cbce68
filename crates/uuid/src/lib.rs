//! Session identifier utilities.
//!
//! Every in-progress form owns a temporary directory named after its session identifier. To keep
//! that directory name safe to join onto a filesystem path, FormFlash uses a *canonical*
//! identifier representation: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! This is the same value you would get from `Uuid::new_v4().simple().to_string()`.
//! Externally supplied identifiers (CLI arguments, cookies) must already be canonical; use
//! [`SessionId::parse`] to validate them.

mod session;

pub use session::{SessionId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
