//! Constants shared with the metadata layer.

/// Filename of the metadata document kept inside every session directory.
///
/// The store never hands this name out from [`crate::TempFileStore::adopt`], so an upload can
/// never overwrite the document.
pub const INDEX_FILENAME: &str = "index.yaml";
