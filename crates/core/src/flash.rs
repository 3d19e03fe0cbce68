//! The staging area façade.
//!
//! A [`FormFlash`] is the state of one form instance within one session: which files are staged
//! for which field, what the user typed so far, and who they are. Its files live in
//! `<session_dir>/<unique_id>/` next to the `index.yaml` document describing them, so a session
//! can hold several forms at once and [`FormFlash::clear_session`] removes them all.
//!
//! All mutation goes through `&mut self`; the type assumes one writer per session.

use crate::index::{read_index, write_index, SessionIndex};
use crate::ledger::{FieldBucket, Ledger, LegacyFiles};
use crate::locator::NamespaceResolver;
use crate::record::{CropDescriptor, IncomingUpload, UploadRecord};
use crate::user::{FlashUser, User};
use crate::{FlashError, FlashResult};
use chrono::{DateTime, Utc};
use flash_files::TempFileStore;
use flash_types::Basename;
use flash_uuid::SessionId;
use std::path::Path;

#[derive(Debug)]
pub struct FormFlash {
    session_id: SessionId,
    unique_id: Basename,
    form_name: String,
    url: Option<String>,
    user: Option<FlashUser>,
    data: Option<serde_yaml::Value>,
    ledger: Ledger,
    store: TempFileStore,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    exists: bool,
}

impl FormFlash {
    /// Opens the staging area of form `unique_id` in `session_id`.
    ///
    /// If an `index.yaml` was saved earlier it is loaded and [`FormFlash::exists`] returns
    /// `true`; otherwise the form starts empty. Nothing is created on disk.
    ///
    /// # Errors
    ///
    /// - [`FlashError::InvalidInput`] if `form_name` is blank
    /// - [`FlashError::Text`] if `unique_id` is not a plain file name
    /// - [`FlashError::SessionDir`] if the form directory exists but is not a directory
    /// - index read/parse errors
    pub fn new<R: NamespaceResolver + ?Sized>(
        resolver: &R,
        session_id: SessionId,
        unique_id: &str,
        form_name: &str,
    ) -> FlashResult<Self> {
        let form_name = form_name.trim();
        if form_name.is_empty() {
            return Err(FlashError::InvalidInput("form name cannot be empty".into()));
        }
        let unique_id = Basename::new(unique_id)?;

        let form_dir = resolver
            .session_dir(&session_id, false)?
            .join(unique_id.as_str());
        let store = TempFileStore::new(&form_dir).map_err(FlashError::SessionDir)?;

        let now = Utc::now();
        let mut flash = Self {
            session_id,
            unique_id,
            form_name: form_name.to_owned(),
            url: None,
            user: None,
            data: None,
            ledger: Ledger::new(),
            store,
            created_at: now,
            updated_at: now,
            exists: false,
        };

        if let Some(index) = read_index(&form_dir)? {
            if index.form != flash.form_name || index.unique_id != flash.unique_id.as_str() {
                tracing::warn!(
                    "index in {} belongs to form '{}' ({}), opened as '{}' ({})",
                    form_dir.display(),
                    index.form,
                    index.unique_id,
                    flash.form_name,
                    flash.unique_id
                );
            }
            flash.url = index.url;
            flash.user = index.user;
            flash.data = index.data;
            flash.ledger = Ledger::from_parts(index.files, index.originals);
            flash.created_at = index.created_at;
            flash.updated_at = index.updated_at;
            flash.exists = true;
        }

        Ok(flash)
    }

    /// Removes every form staged under `session_id`.
    ///
    /// Clearing a session that has nothing on disk is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`FlashError::SessionClear`] if the directory exists but cannot be removed.
    pub fn clear_session<R: NamespaceResolver + ?Sized>(
        resolver: &R,
        session_id: &SessionId,
    ) -> FlashResult<()> {
        let dir = resolver.session_dir(session_id, false)?;
        let store = TempFileStore::new(&dir).map_err(FlashError::SessionDir)?;

        let removed = store.wipe().map_err(|source| FlashError::SessionClear {
            path: dir.clone(),
            source,
        })?;
        if removed {
            tracing::info!("cleared form session {}", session_id);
        }
        Ok(())
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn unique_id(&self) -> &str {
        self.unique_id.as_str()
    }

    pub fn form_name(&self) -> &str {
        &self.form_name
    }

    /// `true` once the form has been saved (or was loaded from a saved index).
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Directory holding this form's temp files.
    pub fn tmp_dir(&self) -> &Path {
        self.store.directory()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn set_url(&mut self, url: Option<String>) -> &mut Self {
        self.url = url;
        self
    }

    pub fn data(&self) -> Option<&serde_yaml::Value> {
        self.data.as_ref()
    }

    pub fn set_data(&mut self, data: Option<serde_yaml::Value>) -> &mut Self {
        self.data = data;
        self
    }

    pub fn user(&self) -> Option<&FlashUser> {
        self.user.as_ref()
    }

    /// Records who is editing the form, or forgets it.
    ///
    /// Only the username and email are kept; a user without a username clears the identity.
    pub fn set_user(&mut self, user: Option<&User>) -> &mut Self {
        self.user = FlashUser::snapshot(user);
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Current records staged for `field`.
    pub fn files_by_field(&self, field: &str) -> Option<&FieldBucket> {
        self.ledger.field(field)
    }

    /// The pristine, pre-crop record of (field, filename), if it was ever cropped.
    pub fn original(&self, field: &str, filename: &str) -> Option<&UploadRecord> {
        self.ledger.original(field, filename)
    }

    /// Stages `upload` as (field, filename), replacing any earlier version and crop history.
    ///
    /// See [`Ledger::admit_upload`].
    pub fn admit_upload(
        &mut self,
        field: &str,
        filename: &str,
        upload: &IncomingUpload,
    ) -> FlashResult<()> {
        self.ledger
            .admit_upload(&self.store, field, filename, upload)?;
        self.touch();
        Ok(())
    }

    /// Stages a cropped rendition of (field, filename).
    ///
    /// See [`Ledger::apply_crop`].
    pub fn apply_crop(
        &mut self,
        field: &str,
        filename: &str,
        upload: &IncomingUpload,
        crop: CropDescriptor,
    ) -> FlashResult<()> {
        self.ledger
            .apply_crop(&self.store, field, filename, upload, crop)?;
        self.touch();
        Ok(())
    }

    /// Un-stages (field, filename) together with its original. Returns `true` if it was staged.
    pub fn remove_file(&mut self, field: &str, filename: &str) -> bool {
        let removed = self.ledger.remove(&self.store, field, filename);
        if removed {
            self.touch();
        }
        removed
    }

    /// Un-stages every file.
    pub fn clear_files(&mut self) {
        if !self.ledger.is_empty() {
            self.ledger.clear(&self.store);
            self.touch();
        }
    }

    /// Flattened view of the current files with absolute temp paths.
    ///
    /// Kept for consumers written against the pre-ledger layout; new code should use
    /// [`FormFlash::files_by_field`] and [`FormFlash::original`].
    pub fn legacy_view(&self) -> LegacyFiles {
        self.ledger.legacy_view(self.store.directory())
    }

    /// Temp files present on disk that no record references.
    pub fn orphans(&self) -> FlashResult<Vec<Basename>> {
        let referenced = self.ledger.referenced_tmp_names();
        let on_disk = self.store.list().map_err(FlashError::SessionDir)?;
        Ok(on_disk
            .into_iter()
            .filter(|name| !referenced.contains(name))
            .collect())
    }

    /// Persists the form to `index.yaml`.
    ///
    /// A form with no staged files and no data has nothing worth keeping; saving it removes its
    /// directory instead.
    pub fn save(&mut self) -> FlashResult<()> {
        if self.ledger.is_empty() && self.data.is_none() {
            return self.delete();
        }

        let index = SessionIndex {
            form: self.form_name.clone(),
            unique_id: self.unique_id.as_str().to_owned(),
            url: self.url.clone(),
            user: self.user.clone(),
            data: self.data.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            files: self.ledger.current_map().clone(),
            originals: self.ledger.originals_map().clone(),
        };
        write_index(self.store.directory(), &index)?;
        self.exists = true;
        Ok(())
    }

    /// Removes this form's directory and forgets every staged file.
    pub fn delete(&mut self) -> FlashResult<()> {
        let dir = self.store.directory().to_path_buf();
        self.store
            .wipe()
            .map_err(|source| FlashError::SessionClear { path: dir, source })?;
        self.ledger = Ledger::new();
        self.exists = false;
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::locator::TmpNamespace;
    use std::fs;
    use tempfile::TempDir;

    fn namespace(temp: &TempDir) -> TmpNamespace {
        TmpNamespace::new(&CoreConfig::new(temp.path().join("tmp")).unwrap())
    }

    fn incoming(temp: &TempDir, name: &str, content: &[u8]) -> IncomingUpload {
        let dir = temp.path().join("incoming");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        IncomingUpload::new(path, "photo.jpg", "image/jpeg")
    }

    #[test]
    fn new_form_starts_empty_and_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);

        let flash = FormFlash::new(&ns, SessionId::new(), "f1", "contact").unwrap();

        assert!(!flash.exists());
        assert!(flash.ledger().is_empty());
        assert!(!flash.tmp_dir().exists());
        assert!(flash.tmp_dir().ends_with("f1"));
    }

    #[test]
    fn new_rejects_blank_form_and_bad_unique_id() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);

        assert!(matches!(
            FormFlash::new(&ns, SessionId::new(), "f1", " "),
            Err(FlashError::InvalidInput(_))
        ));
        assert!(matches!(
            FormFlash::new(&ns, SessionId::new(), "../f1", "contact"),
            Err(FlashError::Text(_))
        ));
    }

    #[test]
    fn save_and_reopen_restores_state() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);
        let session = SessionId::new();

        let mut flash = FormFlash::new(&ns, session.clone(), "f1", "contact").unwrap();
        flash
            .admit_upload("img", "a.jpg", &incoming(&temp, "php1", b"X"))
            .unwrap();
        flash
            .apply_crop(
                "img",
                "a.jpg",
                &incoming(&temp, "php2", b"Y"),
                CropDescriptor::new().with("w", 100),
            )
            .unwrap();
        flash
            .set_user(Some(&User::new("alice", None)))
            .set_url(Some("/contact".into()));
        flash.save().unwrap();

        let reopened = FormFlash::new(&ns, session, "f1", "contact").unwrap();

        assert!(reopened.exists());
        assert_eq!(reopened.ledger(), flash.ledger());
        assert_eq!(reopened.user().unwrap().username.as_str(), "alice");
        assert_eq!(reopened.url(), Some("/contact"));
        assert_eq!(reopened.created_at(), flash.created_at());
    }

    #[test]
    fn save_with_nothing_staged_removes_directory() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);
        let mut flash = FormFlash::new(&ns, SessionId::new(), "f1", "contact").unwrap();
        flash
            .admit_upload("img", "a.jpg", &incoming(&temp, "php1", b"X"))
            .unwrap();
        flash.save().unwrap();
        assert!(flash.exists());

        assert!(flash.remove_file("img", "a.jpg"));
        flash.save().unwrap();

        assert!(!flash.exists());
        assert!(!flash.tmp_dir().exists());
    }

    #[test]
    fn set_user_without_username_clears_identity() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);
        let mut flash = FormFlash::new(&ns, SessionId::new(), "f1", "contact").unwrap();

        flash.set_user(Some(&User::new("alice", Some("a@example.com".into()))));
        assert_eq!(flash.user().unwrap().email, "a@example.com");

        flash.set_user(Some(&User::new("", None)));
        assert!(flash.user().is_none());
    }

    #[test]
    fn orphans_reports_unreferenced_files() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);
        let mut flash = FormFlash::new(&ns, SessionId::new(), "f1", "contact").unwrap();
        flash
            .admit_upload("img", "a.jpg", &incoming(&temp, "php1", b"X"))
            .unwrap();
        flash.save().unwrap();
        fs::write(flash.tmp_dir().join("stray"), b"?").unwrap();

        let orphans: Vec<String> = flash
            .orphans()
            .unwrap()
            .into_iter()
            .map(|b| b.as_str().to_owned())
            .collect();

        assert_eq!(orphans, vec!["stray".to_string()]);
    }

    #[test]
    fn clear_session_removes_every_form() {
        let temp = TempDir::new().unwrap();
        let ns = namespace(&temp);
        let session = SessionId::new();

        for unique_id in ["f1", "f2"] {
            let mut flash = FormFlash::new(&ns, session.clone(), unique_id, "contact").unwrap();
            flash
                .admit_upload("img", "a.jpg", &incoming(&temp, unique_id, b"X"))
                .unwrap();
            flash.save().unwrap();
        }

        FormFlash::clear_session(&ns, &session).unwrap();

        assert!(!ns.session_dir(&session, false).unwrap().exists());
    }
}
