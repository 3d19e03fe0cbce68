//! FormFlash temporary file storage
//!
//! This crate owns the bytes of uploads attached to a form that has not been submitted yet.
//!
//! ## Design Principles
//!
//! - One [`TempFileStore`] is bound to exactly one session directory
//! - The directory is created lazily, on the first write
//! - Files are addressed by [`Basename`] only; nothing outside the directory is reachable
//! - Removal is idempotent: deleting a missing file is not an error
//! - Metadata about the files lives elsewhere (see `flash-core`)
//!
//! ## Session Layout
//!
//! ```text
//! <tmp_root>/
//! └── forms/
//!     └── <session_id>/
//!         ├── index.yaml      # metadata document, written by flash-core
//!         ├── phpA1b2C3       # adopted upload bytes
//!         └── phpD4e5F6
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use flash_files::TempFileStore;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = TempFileStore::new(Path::new("/var/tmp/forms/550e8400e29b41d4a716446655440000"))?;
//! let basename = store.adopt(Path::new("/tmp/phpA1b2C3"))?;
//! assert!(store.contains(&basename));
//! # Ok(())
//! # }
//! ```

mod constants;
mod store;

pub use constants::INDEX_FILENAME;
pub use flash_types::Basename;
pub use store::TempFileStore;

/// Errors that can occur during temporary file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// The session directory path is unusable (relative, or exists but is not a directory)
    #[error("Invalid session directory: {0}")]
    InvalidDirectory(String),

    /// The upload to adopt does not exist
    #[error("Source file not found: {0}")]
    SourceMissing(String),

    /// Path validation failed (no usable file name, or a name that escapes the directory)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for temporary file operations.
pub type FilesResult<T> = Result<T, FilesError>;
