//! Session-scoped temporary file store implementation
//!
//! [`TempFileStore`] is the only component that touches upload bytes on disk. It moves incoming
//! uploads into the session directory ("adoption"), deletes superseded files, and removes the
//! whole directory when the session ends.
//!
//! # Failure model
//!
//! - [`TempFileStore::adopt`] either leaves a complete file in the directory or reports an error;
//!   a partially copied file is removed before the error is returned
//! - [`TempFileStore::remove`] and [`TempFileStore::wipe`] are idempotent, a missing target is
//!   reported as `Ok(false)` rather than an error
//!
//! # Implementation Notes
//!
//! - Construction performs validation only; the directory is created by
//!   [`TempFileStore::ensure_directory`] (called implicitly by `adopt`)
//! - Adoption prefers `rename`, falling back to copy-then-delete when the source lives on another
//!   filesystem
//! - The service implements `Debug` but not `Clone` (single-owner semantics)

use crate::{Basename, FilesError, FilesResult, INDEX_FILENAME};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const MAX_NAME_SUFFIX: usize = 1_000;

/// Byte storage for a single form session.
#[derive(Debug)]
pub struct TempFileStore {
    /// Absolute path of the session directory (may not exist yet)
    directory: PathBuf,
}

impl TempFileStore {
    /// Creates a store bound to `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidDirectory`] if:
    /// - `directory` is not absolute
    /// - `directory` exists but is not a directory
    pub fn new(directory: &Path) -> FilesResult<Self> {
        if !directory.is_absolute() {
            return Err(FilesError::InvalidDirectory(format!(
                "Session directory must be absolute: {}",
                directory.display()
            )));
        }

        if directory.exists() && !directory.is_dir() {
            return Err(FilesError::InvalidDirectory(format!(
                "Path exists but is not a directory: {}",
                directory.display()
            )));
        }

        Ok(Self {
            directory: directory.to_path_buf(),
        })
    }

    /// Returns the session directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns `directory/basename`.
    #[must_use]
    pub fn path_of(&self, basename: &Basename) -> PathBuf {
        self.directory.join(basename.as_str())
    }

    /// Returns true if `basename` currently exists as a file in the session directory.
    #[must_use]
    pub fn contains(&self, basename: &Basename) -> bool {
        self.path_of(basename).is_file()
    }

    /// Creates the session directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Io`] if the directory cannot be created.
    pub fn ensure_directory(&self) -> FilesResult<()> {
        fs::create_dir_all(&self.directory).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create session directory {}: {}",
                    self.directory.display(),
                    e
                ),
            ))
        })
    }

    /// Moves an incoming upload into the session directory.
    ///
    /// The file keeps its own basename unless that name is already taken in the session
    /// directory, in which case a numeric suffix is appended (`phpA1b2C3-1`, `phpA1b2C3-2`, ...).
    /// Every adoption therefore yields a basename no other file in the directory uses.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `source_path` does not exist ([`FilesError::SourceMissing`])
    /// - `source_path` has no usable file name, or is named like the metadata document
    ///   ([`FilesError::InvalidPath`])
    /// - the directory cannot be created, no free name is left, or the move fails
    ///   ([`FilesError::Io`])
    pub fn adopt(&self, source_path: &Path) -> FilesResult<Basename> {
        if !source_path.is_file() {
            return Err(FilesError::SourceMissing(source_path.display().to_string()));
        }

        let basename = source_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                FilesError::InvalidPath(format!(
                    "Source has no UTF-8 file name: {}",
                    source_path.display()
                ))
            })
            .and_then(|n| {
                Basename::new(n).map_err(|e| FilesError::InvalidPath(e.to_string()))
            })?;

        if basename.as_str() == INDEX_FILENAME {
            return Err(FilesError::InvalidPath(format!(
                "'{}' is reserved for the session index",
                INDEX_FILENAME
            )));
        }

        self.ensure_directory()?;

        let basename = self.unused_basename(basename)?;
        let target = self.path_of(&basename);
        if let Err(rename_error) = fs::rename(source_path, &target) {
            tracing::debug!(
                "rename {} -> {} failed ({}), falling back to copy",
                source_path.display(),
                target.display(),
                rename_error
            );
            self.copy_then_unlink(source_path, &target)?;
        }

        tracing::debug!("adopted {} as {}", source_path.display(), basename);
        Ok(basename)
    }

    /// Deletes `basename` from the session directory.
    ///
    /// An empty name, or a file that is not there, is a no-op.
    ///
    /// # Returns
    ///
    /// `true` if a file was deleted, `false` if there was nothing to delete.
    ///
    /// # Errors
    ///
    /// - [`FilesError::InvalidPath`] if `basename` is not a plain file name
    /// - [`FilesError::Io`] if the file exists but cannot be deleted
    pub fn remove(&self, basename: &str) -> FilesResult<bool> {
        if basename.is_empty() {
            return Ok(false);
        }

        let basename =
            Basename::new(basename).map_err(|e| FilesError::InvalidPath(e.to_string()))?;
        let path = self.path_of(&basename);
        if !path.is_file() {
            return Ok(false);
        }

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to remove {}: {}", path.display(), e),
            ))),
        }
    }

    /// Deletes the whole session directory, if present.
    ///
    /// # Returns
    ///
    /// `true` if a directory was removed.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Io`] if the directory exists but cannot be removed.
    pub fn wipe(&self) -> FilesResult<bool> {
        if !self.directory.exists() {
            return Ok(false);
        }

        match fs::remove_dir_all(&self.directory) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FilesError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to remove session directory {}: {}",
                    self.directory.display(),
                    e
                ),
            ))),
        }
    }

    /// Lists the adopted files present on disk, sorted by name.
    ///
    /// The metadata document and any sub-directories are not included. A missing directory
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Io`] if the directory cannot be read.
    pub fn list(&self) -> FilesResult<Vec<Basename>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FilesError::Io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name == INDEX_FILENAME {
                continue;
            }
            if let Ok(basename) = Basename::new(name) {
                names.push(basename);
            }
        }

        names.sort();
        Ok(names)
    }

    fn unused_basename(&self, wanted: Basename) -> FilesResult<Basename> {
        if !self.path_of(&wanted).exists() {
            return Ok(wanted);
        }

        for n in 1..=MAX_NAME_SUFFIX {
            let candidate = Basename::new(format!("{}-{}", wanted, n))
                .map_err(|e| FilesError::InvalidPath(e.to_string()))?;
            if !self.path_of(&candidate).exists() {
                return Ok(candidate);
            }
        }

        Err(FilesError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!(
                "no free name derived from '{}' after {} attempts",
                wanted, MAX_NAME_SUFFIX
            ),
        )))
    }

    fn copy_then_unlink(&self, source_path: &Path, target: &Path) -> FilesResult<()> {
        if let Err(e) = fs::copy(source_path, target) {
            // Never leave a truncated copy behind.
            let _ = fs::remove_file(target);
            return Err(FilesError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to move {} to {}: {}",
                    source_path.display(),
                    target.display(),
                    e
                ),
            )));
        }

        if let Err(e) = fs::remove_file(source_path) {
            tracing::warn!(
                "adopted copy of {} but could not delete the source: {}",
                source_path.display(),
                e
            );
        }

        Ok(())
    }
}
