//! Session directory resolution.
//!
//! [`FormFlash`](crate::FormFlash) never computes its own storage location. It asks a
//! [`NamespaceResolver`] supplied by the caller, which keeps the mapping from a session id to a
//! filesystem path in one place and lets tests point sessions at a throwaway directory.

use crate::config::CoreConfig;
use crate::{FlashError, FlashResult};
use flash_uuid::SessionId;
use std::fs;
use std::path::{Path, PathBuf};

/// Maps a session identifier to the absolute path of its temporary directory.
pub trait NamespaceResolver {
    /// Returns the session directory for `session_id`.
    ///
    /// With `create` set the directory is created if missing; creating an existing directory is
    /// not an error. Without it the path is returned whether or not it exists.
    fn session_dir(&self, session_id: &SessionId, create: bool) -> FlashResult<PathBuf>;
}

/// Resolves sessions to `<tmp_dir>/forms/<session_id>`.
#[derive(Clone, Debug)]
pub struct TmpNamespace {
    forms_dir: PathBuf,
}

impl TmpNamespace {
    pub fn new(cfg: &CoreConfig) -> Self {
        Self {
            forms_dir: cfg.forms_dir(),
        }
    }

    pub fn forms_dir(&self) -> &Path {
        &self.forms_dir
    }
}

impl NamespaceResolver for TmpNamespace {
    fn session_dir(&self, session_id: &SessionId, create: bool) -> FlashResult<PathBuf> {
        let dir = session_id.dir_in(&self.forms_dir);
        if create {
            fs::create_dir_all(&dir).map_err(FlashError::SessionDirResolve)?;
        }
        Ok(dir)
    }
}

impl<R: NamespaceResolver + ?Sized> NamespaceResolver for &R {
    fn session_dir(&self, session_id: &SessionId, create: bool) -> FlashResult<PathBuf> {
        (**self).session_dir(session_id, create)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn namespace(temp: &TempDir) -> TmpNamespace {
        TmpNamespace::new(&CoreConfig::new(temp.path().to_path_buf()).unwrap())
    }

    #[test]
    fn session_dir_without_create_does_not_touch_disk() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);
        let id = SessionId::new();

        let dir = ns.session_dir(&id, false).unwrap();

        assert_eq!(dir, temp.path().join("forms").join(id.to_string()));
        assert!(!dir.exists());
    }

    #[test]
    fn session_dir_with_create_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);
        let id = SessionId::new();

        let first = ns.session_dir(&id, true).unwrap();
        let second = ns.session_dir(&id, true).unwrap();

        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn distinct_sessions_get_distinct_dirs() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);

        let a = ns.session_dir(&SessionId::new(), false).unwrap();
        let b = ns.session_dir(&SessionId::new(), false).unwrap();

        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(ns.forms_dir()));
    }
}
