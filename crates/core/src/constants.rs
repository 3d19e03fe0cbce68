//! Constants used throughout the FormFlash core crate.
//!
//! This module contains all path and key constants to keep the on-disk layout consistent.

pub use flash_files::INDEX_FILENAME;

/// Directory under the temporary root that holds one sub-directory per form session.
pub const FORMS_DIR_NAME: &str = "forms";

/// Default temporary root when no explicit directory is configured.
pub const DEFAULT_TMP_DIR: &str = "tmp";

/// Suffix of the derived field key naming the pristine, pre-crop version of a field's files.
pub const ORIGINAL_SUFFIX: &str = "/original";

/// Separator that marks a field key as belonging to a derived namespace.
pub const FIELD_NAMESPACE_SEPARATOR: char = '/';
