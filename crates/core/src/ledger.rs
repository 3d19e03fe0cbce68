//! Upload ledger: which staged file is current, and which is the pristine original.
//!
//! The ledger is a two-level map, field → filename → [`UploadRecord`], kept twice:
//!
//! - `current` holds the latest version of every staged file (the "bare" bucket)
//! - `originals` holds the version a file had before its first crop
//!
//! ## Mutation protocol
//!
//! [`Ledger::admit_upload`] and [`Ledger::apply_crop`] share one shape: the incoming bytes are
//! adopted into the [`TempFileStore`] first, and the maps are only touched once that succeeded.
//! A storage failure therefore leaves the ledger exactly as it was.
//!
//! After the maps are updated, every temp file no longer referenced by a record is removed.
//! Those removals are best effort: a failure is logged and the operation still succeeds, because
//! the new record is already valid.
//!
//! ## Invariants
//!
//! - At most one current and one original record per (field, filename)
//! - An original is created at most once per lineage and only its `crop` changes afterwards
//! - A temp file is referenced by at most one record
//! - Admitting a fresh upload drops the original (and its bytes) for that pair

use crate::constants::{FIELD_NAMESPACE_SEPARATOR, ORIGINAL_SUFFIX};
use crate::record::{CropDescriptor, IncomingUpload, LegacyUpload, UploadRecord};
use crate::{FlashError, FlashResult};
use flash_files::TempFileStore;
use flash_types::{Basename, NonEmptyText};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Display filename → record, for one field.
pub type FieldBucket = BTreeMap<String, UploadRecord>;

/// Field → filename → legacy record, as returned by [`Ledger::legacy_view`].
pub type LegacyFiles = BTreeMap<String, BTreeMap<String, LegacyUpload>>;

/// Returns the derived key naming `field`'s original bucket, e.g. `avatar/original`.
pub fn original_key(field: &str) -> String {
    format!("{field}{ORIGINAL_SUFFIX}")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    current: BTreeMap<String, FieldBucket>,
    originals: BTreeMap<String, FieldBucket>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        current: BTreeMap<String, FieldBucket>,
        originals: BTreeMap<String, FieldBucket>,
    ) -> Self {
        let mut ledger = Self { current, originals };
        ledger.prune_empty_fields();
        ledger
    }

    pub(crate) fn current_map(&self) -> &BTreeMap<String, FieldBucket> {
        &self.current
    }

    pub(crate) fn originals_map(&self) -> &BTreeMap<String, FieldBucket> {
        &self.originals
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.originals.is_empty()
    }

    /// Current record for (field, filename).
    ///
    /// Keys are matched the way they were stored: surrounding whitespace is ignored.
    pub fn current(&self, field: &str, filename: &str) -> Option<&UploadRecord> {
        self.current.get(field.trim())?.get(filename.trim())
    }

    /// Original record for (field, filename).
    pub fn original(&self, field: &str, filename: &str) -> Option<&UploadRecord> {
        self.originals.get(field.trim())?.get(filename.trim())
    }

    /// Current records of one field.
    pub fn field(&self, field: &str) -> Option<&FieldBucket> {
        self.current.get(field.trim())
    }

    /// Original records of one field.
    pub fn original_field(&self, field: &str) -> Option<&FieldBucket> {
        self.originals.get(field.trim())
    }

    /// Names of every field that has at least one current record.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.current.keys().map(String::as_str)
    }

    /// Every temp file referenced by a live record, current or original.
    pub fn referenced_tmp_names(&self) -> BTreeSet<&Basename> {
        self.current
            .values()
            .chain(self.originals.values())
            .flat_map(|bucket| bucket.values())
            .filter_map(|record| record.tmp_name.as_ref())
            .collect()
    }

    /// Stages a freshly uploaded file as the current version of (field, filename).
    ///
    /// Any previous current version and any preserved original for the pair are dropped and
    /// their bytes deleted: a new upload starts a new crop lineage.
    ///
    /// # Errors
    ///
    /// - [`FlashError::InvalidInput`] if `field` or `filename` is blank
    /// - [`FlashError::Store`] if the upload cannot be adopted; the ledger is unchanged
    pub fn admit_upload(
        &mut self,
        store: &TempFileStore,
        field: &str,
        filename: &str,
        upload: &IncomingUpload,
    ) -> FlashResult<()> {
        let (field, name) = validate_key(field, filename)?;
        let record = adopt(store, name, upload)?;

        if let Some(previous) = self.take_current(&field, record.name.as_str()) {
            discard_tmp(store, previous.tmp_name.as_ref());
        }

        if let Some(original) = self.take_original(&field, record.name.as_str()) {
            discard_tmp(store, original.tmp_name.as_ref());
        }

        tracing::debug!(
            "admitted {}/{} as {:?}",
            field,
            record.name,
            record.tmp_name.as_ref().map(Basename::as_str)
        );
        self.insert_current(field, record);
        Ok(())
    }

    /// Stages a cropped rendition as the current version of (field, filename).
    ///
    /// - First crop of a staged file: the current version becomes the original, `crop` attached,
    ///   and its bytes are kept.
    /// - Later crops: the original keeps its bytes and only takes the new `crop`; the replaced
    ///   current version was itself a crop output and its bytes are deleted.
    /// - Crop with nothing staged: a byte-less original placeholder records the crop.
    ///
    /// # Errors
    ///
    /// - [`FlashError::InvalidInput`] if `field` or `filename` is blank
    /// - [`FlashError::Store`] if the upload cannot be adopted; the ledger is unchanged
    pub fn apply_crop(
        &mut self,
        store: &TempFileStore,
        field: &str,
        filename: &str,
        upload: &IncomingUpload,
        crop: CropDescriptor,
    ) -> FlashResult<()> {
        let (field, name) = validate_key(field, filename)?;
        let record = adopt(store, name.clone(), upload)?;

        let previous = self.take_current(&field, name.as_str());
        if let Some(original) = self.original_mut(&field, name.as_str()) {
            // The pristine copy is already preserved; whatever was current is an earlier crop.
            original.crop = Some(crop);
            if let Some(previous) = previous {
                discard_tmp(store, previous.tmp_name.as_ref());
            }
        } else {
            let original = match previous {
                Some(mut demoted) => {
                    demoted.crop = Some(crop);
                    demoted
                }
                None => UploadRecord::placeholder(name, upload.mime_type.clone(), crop),
            };
            self.insert_original(field.clone(), original);
        }

        tracing::debug!(
            "cropped {}/{} into {:?}",
            field,
            record.name,
            record.tmp_name.as_ref().map(Basename::as_str)
        );
        self.insert_current(field, record);
        Ok(())
    }

    /// Drops the current and original records of (field, filename) and deletes their bytes.
    ///
    /// Returns `true` if any record existed.
    pub fn remove(&mut self, store: &TempFileStore, field: &str, filename: &str) -> bool {
        let (field, filename) = (field.trim(), filename.trim());
        let current = self.take_current(field, filename);
        let original = self.take_original(field, filename);

        for record in current.iter().chain(original.iter()) {
            discard_tmp(store, record.tmp_name.as_ref());
        }

        current.is_some() || original.is_some()
    }

    /// Drops every record and deletes every referenced temp file.
    pub fn clear(&mut self, store: &TempFileStore) {
        let current = std::mem::take(&mut self.current);
        let originals = std::mem::take(&mut self.originals);

        for record in current
            .values()
            .chain(originals.values())
            .flat_map(|bucket| bucket.values())
        {
            discard_tmp(store, record.tmp_name.as_ref());
        }
    }

    /// Compatibility projection for consumers that predate the ledger.
    ///
    /// Returns only current records, skips any field whose key contains a namespace separator,
    /// and rewrites `tmp_name` to a full path inside `directory`. Prefer [`Ledger::field`] and
    /// [`Ledger::original`] in new code.
    pub fn legacy_view(&self, directory: &Path) -> LegacyFiles {
        self.current
            .iter()
            .filter(|(field, _)| !field.contains(FIELD_NAMESPACE_SEPARATOR))
            .map(|(field, bucket)| {
                let files = bucket
                    .iter()
                    .map(|(filename, record)| {
                        let legacy = LegacyUpload {
                            name: record.name.clone(),
                            mime_type: record.mime_type.clone(),
                            tmp_name: record
                                .tmp_name
                                .as_ref()
                                .map(|basename| directory.join(basename.as_str())),
                            crop: record.crop.clone(),
                        };
                        (filename.clone(), legacy)
                    })
                    .collect();
                (field.clone(), files)
            })
            .collect()
    }

    fn take_current(&mut self, field: &str, filename: &str) -> Option<UploadRecord> {
        take_from(&mut self.current, field, filename)
    }

    fn take_original(&mut self, field: &str, filename: &str) -> Option<UploadRecord> {
        take_from(&mut self.originals, field, filename)
    }

    fn original_mut(&mut self, field: &str, filename: &str) -> Option<&mut UploadRecord> {
        self.originals.get_mut(field)?.get_mut(filename)
    }

    fn insert_current(&mut self, field: String, record: UploadRecord) {
        self.current
            .entry(field)
            .or_default()
            .insert(record.name.as_str().to_owned(), record);
    }

    fn insert_original(&mut self, field: String, record: UploadRecord) {
        self.originals
            .entry(field)
            .or_default()
            .insert(record.name.as_str().to_owned(), record);
    }

    fn prune_empty_fields(&mut self) {
        self.current.retain(|_, bucket| !bucket.is_empty());
        self.originals.retain(|_, bucket| !bucket.is_empty());
    }
}

/// Field and filename keys are stored trimmed; every lookup trims the same way.
fn validate_key(field: &str, filename: &str) -> FlashResult<(String, NonEmptyText)> {
    let field = NonEmptyText::new(field)
        .map_err(|_| FlashError::InvalidInput("field name cannot be empty".into()))?;
    let filename = NonEmptyText::new(filename)
        .map_err(|_| FlashError::InvalidInput("filename cannot be empty".into()))?;
    Ok((field.as_str().to_owned(), filename))
}

fn adopt(
    store: &TempFileStore,
    name: NonEmptyText,
    upload: &IncomingUpload,
) -> FlashResult<UploadRecord> {
    let basename = store.adopt(&upload.tmp_path).map_err(FlashError::Store)?;
    Ok(UploadRecord::stored(
        name,
        upload.mime_type.clone(),
        basename,
    ))
}

fn take_from(
    map: &mut BTreeMap<String, FieldBucket>,
    field: &str,
    filename: &str,
) -> Option<UploadRecord> {
    let bucket = map.get_mut(field)?;
    let record = bucket.remove(filename);
    if bucket.is_empty() {
        map.remove(field);
    }
    record
}

/// Deletes a superseded temp file, logging instead of failing.
fn discard_tmp(store: &TempFileStore, tmp_name: Option<&Basename>) {
    let Some(basename) = tmp_name else {
        return;
    };

    match store.remove(basename.as_str()) {
        Ok(true) => tracing::debug!("removed superseded temp file {}", basename),
        Ok(false) => {}
        Err(source) => {
            let err = FlashError::OrphanCleanup {
                name: basename.as_str().to_owned(),
                source,
            };
            tracing::warn!("{}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Harness {
        temp: TempDir,
        store: TempFileStore,
        ledger: Ledger,
        counter: usize,
    }

    impl Harness {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let store = TempFileStore::new(&temp.path().join("session")).unwrap();
            Self {
                temp,
                store,
                ledger: Ledger::new(),
                counter: 0,
            }
        }

        /// Writes an incoming upload with a unique transport-level name
        fn upload(&mut self, content: &[u8]) -> IncomingUpload {
            self.counter += 1;
            let incoming = self.temp.path().join("incoming");
            fs::create_dir_all(&incoming).unwrap();
            let path = incoming.join(format!("php{:04}", self.counter));
            fs::write(&path, content).unwrap();
            IncomingUpload::new(path, "client.jpg", "image/jpeg")
        }

        fn bytes_of(&self, record: &UploadRecord) -> Vec<u8> {
            let basename = record.tmp_name.as_ref().expect("record has bytes");
            fs::read(self.store.path_of(basename)).unwrap()
        }

        fn on_disk(&self) -> Vec<String> {
            self.store
                .list()
                .unwrap()
                .into_iter()
                .map(|b| b.as_str().to_owned())
                .collect()
        }

        fn referenced(&self) -> Vec<String> {
            self.ledger
                .referenced_tmp_names()
                .into_iter()
                .map(|b| b.as_str().to_owned())
                .collect()
        }
    }

    #[test]
    fn admit_records_current_version() {
        let mut h = Harness::new();
        let upload = h.upload(b"X");

        h.ledger
            .admit_upload(&h.store, "img", "a.jpg", &upload)
            .unwrap();

        let record = h.ledger.current("img", "a.jpg").unwrap();
        assert_eq!(record.name.as_str(), "a.jpg");
        assert_eq!(record.mime_type, "image/jpeg");
        assert!(record.crop.is_none());
        assert_eq!(h.bytes_of(record), b"X");
        assert!(h.ledger.original("img", "a.jpg").is_none());
    }

    #[test]
    fn admit_with_missing_source_leaves_ledger_untouched() {
        let mut h = Harness::new();
        let first = h.upload(b"X");
        h.ledger.admit_upload(&h.store, "img", "a.jpg", &first).unwrap();
        let before = h.ledger.clone();

        let missing = IncomingUpload::new(h.temp.path().join("gone"), "a.jpg", "image/png");
        let err = h
            .ledger
            .admit_upload(&h.store, "img", "a.jpg", &missing)
            .expect_err("adoption must fail");

        assert!(matches!(err, FlashError::Store(_)));
        assert_eq!(h.ledger, before);
        assert_eq!(h.on_disk(), h.referenced());
    }

    #[test]
    fn admit_rejects_blank_field_or_filename() {
        let mut h = Harness::new();
        let upload = h.upload(b"X");

        assert!(matches!(
            h.ledger.admit_upload(&h.store, " ", "a.jpg", &upload),
            Err(FlashError::InvalidInput(_))
        ));
        assert!(matches!(
            h.ledger.admit_upload(&h.store, "img", "", &upload),
            Err(FlashError::InvalidInput(_))
        ));
        assert!(upload.tmp_path.exists(), "nothing adopted on invalid input");
    }

    #[test]
    fn admit_twice_deletes_first_bytes() {
        let mut h = Harness::new();
        let first = h.upload(b"X");
        let second = h.upload(b"X2");

        h.ledger.admit_upload(&h.store, "img", "a.jpg", &first).unwrap();
        h.ledger.admit_upload(&h.store, "img", "a.jpg", &second).unwrap();

        let record = h.ledger.current("img", "a.jpg").unwrap();
        assert_eq!(h.bytes_of(record), b"X2");
        assert_eq!(h.on_disk(), vec!["php0002".to_string()]);
    }

    #[test]
    fn first_crop_demotes_current_to_original() {
        let mut h = Harness::new();
        let x = h.upload(b"X");
        let y = h.upload(b"Y");
        let crop = CropDescriptor::new().with("w", 100).with("h", 100);

        h.ledger.admit_upload(&h.store, "img", "a.jpg", &x).unwrap();
        h.ledger
            .apply_crop(&h.store, "img", "a.jpg", &y, crop.clone())
            .unwrap();

        let original = h.ledger.original("img", "a.jpg").unwrap();
        assert_eq!(h.bytes_of(original), b"X");
        assert_eq!(original.crop.as_ref(), Some(&crop));

        let current = h.ledger.current("img", "a.jpg").unwrap();
        assert_eq!(h.bytes_of(current), b"Y");
        assert!(current.crop.is_none());
        assert_eq!(h.on_disk(), h.referenced());
    }

    #[test]
    fn second_crop_keeps_original_bytes_and_updates_crop() {
        let mut h = Harness::new();
        let x = h.upload(b"X");
        let y = h.upload(b"Y");
        let z = h.upload(b"Z");
        let first = CropDescriptor::new().with("w", 100).with("h", 100);
        let second = CropDescriptor::new().with("w", 50).with("h", 50);

        h.ledger.admit_upload(&h.store, "img", "a.jpg", &x).unwrap();
        h.ledger.apply_crop(&h.store, "img", "a.jpg", &y, first).unwrap();
        let original_tmp = h.ledger.original("img", "a.jpg").unwrap().tmp_name.clone();

        h.ledger
            .apply_crop(&h.store, "img", "a.jpg", &z, second.clone())
            .unwrap();

        let original = h.ledger.original("img", "a.jpg").unwrap();
        assert_eq!(original.tmp_name, original_tmp);
        assert_eq!(original.crop.as_ref(), Some(&second));
        assert_eq!(h.bytes_of(h.ledger.current("img", "a.jpg").unwrap()), b"Z");
        assert_eq!(h.on_disk(), vec!["php0001".to_string(), "php0003".to_string()]);
    }

    #[test]
    fn crop_without_prior_upload_records_placeholder() {
        let mut h = Harness::new();
        let bytes = h.upload(b"B");
        let crop = CropDescriptor::new().with("rotate", 90);

        h.ledger
            .apply_crop(&h.store, "img", "b.jpg", &bytes, crop.clone())
            .unwrap();

        let original = h.ledger.original("img", "b.jpg").unwrap();
        assert_eq!(original.name.as_str(), "b.jpg");
        assert_eq!(original.mime_type, "image/jpeg");
        assert!(original.tmp_name.is_none());
        assert_eq!(original.crop.as_ref(), Some(&crop));
        assert_eq!(h.bytes_of(h.ledger.current("img", "b.jpg").unwrap()), b"B");
    }

    #[test]
    fn crop_after_placeholder_deletes_intermediate() {
        let mut h = Harness::new();
        let first = h.upload(b"B1");
        let second = h.upload(b"B2");

        h.ledger
            .apply_crop(&h.store, "img", "b.jpg", &first, CropDescriptor::new().with("rotate", 90))
            .unwrap();
        h.ledger
            .apply_crop(&h.store, "img", "b.jpg", &second, CropDescriptor::new().with("rotate", 180))
            .unwrap();

        let original = h.ledger.original("img", "b.jpg").unwrap();
        assert!(original.tmp_name.is_none());
        assert_eq!(original.crop.as_ref().unwrap().get("rotate"), Some(&Value::from(180)));
        assert_eq!(h.on_disk(), vec!["php0002".to_string()]);
    }

    #[test]
    fn admit_after_crop_resets_lineage() {
        let mut h = Harness::new();
        let x = h.upload(b"X");
        let y = h.upload(b"Y");
        let fresh = h.upload(b"F");

        h.ledger.admit_upload(&h.store, "img", "a.jpg", &x).unwrap();
        h.ledger
            .apply_crop(&h.store, "img", "a.jpg", &y, CropDescriptor::new().with("w", 1))
            .unwrap();
        h.ledger.admit_upload(&h.store, "img", "a.jpg", &fresh).unwrap();

        assert!(h.ledger.original("img", "a.jpg").is_none());
        assert!(h.ledger.original_field("img").is_none());
        assert_eq!(h.on_disk(), vec!["php0003".to_string()]);
    }

    #[test]
    fn pairs_are_independent() {
        let mut h = Harness::new();
        let a = h.upload(b"A");
        let b = h.upload(b"B");
        let c = h.upload(b"C");

        h.ledger.admit_upload(&h.store, "img", "a.jpg", &a).unwrap();
        h.ledger.admit_upload(&h.store, "img", "b.jpg", &b).unwrap();
        h.ledger.admit_upload(&h.store, "doc", "a.jpg", &c).unwrap();

        assert_eq!(h.ledger.field("img").unwrap().len(), 2);
        assert_eq!(h.bytes_of(h.ledger.current("doc", "a.jpg").unwrap()), b"C");
        assert_eq!(h.ledger.fields().collect::<Vec<_>>(), vec!["doc", "img"]);
    }

    #[test]
    fn remove_drops_both_versions_and_bytes() {
        let mut h = Harness::new();
        let x = h.upload(b"X");
        let y = h.upload(b"Y");
        h.ledger.admit_upload(&h.store, "img", "a.jpg", &x).unwrap();
        h.ledger
            .apply_crop(&h.store, "img", "a.jpg", &y, CropDescriptor::new().with("w", 1))
            .unwrap();

        assert!(h.ledger.remove(&h.store, "img", "a.jpg"));
        assert!(!h.ledger.remove(&h.store, "img", "a.jpg"));
        assert!(h.ledger.is_empty());
        assert!(h.on_disk().is_empty());
    }

    #[test]
    fn clear_deletes_every_referenced_file() {
        let mut h = Harness::new();
        let a = h.upload(b"A");
        let b = h.upload(b"B");
        h.ledger.admit_upload(&h.store, "img", "a.jpg", &a).unwrap();
        h.ledger
            .apply_crop(&h.store, "img", "a.jpg", &b, CropDescriptor::new().with("w", 1))
            .unwrap();

        h.ledger.clear(&h.store);

        assert!(h.ledger.is_empty());
        assert!(h.on_disk().is_empty());
    }

    #[test]
    fn legacy_view_resolves_paths_and_skips_namespaced_fields() {
        let mut h = Harness::new();
        let a = h.upload(b"A");
        let b = h.upload(b"B");
        h.ledger.admit_upload(&h.store, "img", "a.jpg", &a).unwrap();
        h.ledger.admit_upload(&h.store, "img/thumbs", "a.jpg", &b).unwrap();
        let c = h.upload(b"C");
        h.ledger
            .apply_crop(&h.store, "img", "a.jpg", &c, CropDescriptor::new().with("w", 1))
            .unwrap();

        let view = h.ledger.legacy_view(h.store.directory());

        assert_eq!(view.keys().collect::<Vec<_>>(), vec!["img"]);
        let entry = &view["img"]["a.jpg"];
        let expected: PathBuf = h.store.directory().join("php0003");
        assert_eq!(entry.tmp_name.as_deref(), Some(expected.as_path()));
    }

    #[test]
    fn original_key_appends_suffix() {
        assert_eq!(original_key("avatar"), "avatar/original");
    }

    #[test]
    fn padded_names_resolve_to_the_same_entry() {
        let mut h = Harness::new();
        let upload = h.upload(b"X");
        h.ledger
            .admit_upload(&h.store, " img ", " a.jpg", &upload)
            .unwrap();

        assert!(h.ledger.current(" img ", " a.jpg").is_some());
        assert!(h.ledger.current("img", "a.jpg").is_some());
        assert!(h.ledger.field(" img").unwrap().contains_key("a.jpg"));

        assert!(h.ledger.remove(&h.store, " img ", " a.jpg"));
        assert!(h.ledger.is_empty());
        assert!(h.on_disk().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn failed_cleanup_does_not_fail_the_call() {
        use std::os::unix::fs::PermissionsExt;

        let mut h = Harness::new();
        let upload = h.upload(b"X");
        h.ledger.admit_upload(&h.store, "img", "a.jpg", &upload).unwrap();

        let dir = h.store.directory().to_path_buf();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();
        let canary = dir.join("canary");
        if fs::write(&canary, b"").is_ok() {
            // Permissions are not enforced (running as root).
            fs::remove_file(&canary).unwrap();
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let removed = h.ledger.remove(&h.store, "img", "a.jpg");
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(removed);
        assert!(h.ledger.is_empty());
        assert_eq!(h.on_disk(), vec!["php0001".to_string()]);
    }
}
