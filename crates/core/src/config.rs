//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services, so no
//! operation reads process-wide environment variables while a form session is being mutated.

use crate::constants::{DEFAULT_TMP_DIR, FORMS_DIR_NAME};
use crate::{FlashError, FlashResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    tmp_dir: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `tmp_dir` must be absolute; use [`resolve_tmp_dir`] to turn a configured value into one.
    pub fn new(tmp_dir: PathBuf) -> FlashResult<Self> {
        if !tmp_dir.is_absolute() {
            return Err(FlashError::InvalidInput(format!(
                "tmp_dir must be absolute, got: {}",
                tmp_dir.display()
            )));
        }

        if tmp_dir.exists() && !tmp_dir.is_dir() {
            return Err(FlashError::InvalidInput(format!(
                "tmp_dir exists but is not a directory: {}",
                tmp_dir.display()
            )));
        }

        Ok(Self { tmp_dir })
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Parent directory of every session directory.
    pub fn forms_dir(&self) -> PathBuf {
        self.tmp_dir.join(FORMS_DIR_NAME)
    }
}

/// Resolve the temporary root from an optional configured value.
///
/// If `value` is `None` or empty/whitespace, [`DEFAULT_TMP_DIR`] is used. Relative values are
/// anchored at `base_dir` (normally the current working directory).
pub fn resolve_tmp_dir(value: Option<String>, base_dir: &Path) -> PathBuf {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_TMP_DIR.to_string());

    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}
