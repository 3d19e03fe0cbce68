//! The per-session metadata document (`index.yaml`).
//!
//! The document is the serialised form of a [`FormFlash`](crate::FormFlash): form identity,
//! the redacted user, free-form data, and the ledger. It is read once when a session is opened
//! and written on save; it is never re-read in the middle of an operation, so several writes
//! within the same second cannot observe a stale copy.
//!
//! ```yaml
//! form: contact
//! unique_id: 5f2b7c
//! created_at: 2026-01-11T14:35:22Z
//! updated_at: 2026-01-11T14:36:01Z
//! files:
//!   img:
//!     a.jpg: { name: a.jpg, type: image/jpeg, tmp_name: php0003 }
//! originals:
//!   img:
//!     a.jpg: { name: a.jpg, type: image/jpeg, tmp_name: php0001, crop: { w: 100, h: 100 } }
//! ```

use crate::constants::INDEX_FILENAME;
use crate::ledger::FieldBucket;
use crate::user::FlashUser;
use crate::{FlashError, FlashResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// On-disk representation of a session.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct SessionIndex {
    pub form: String,
    pub unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<FlashUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_yaml::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub files: BTreeMap<String, FieldBucket>,
    #[serde(default)]
    pub originals: BTreeMap<String, FieldBucket>,
}

/// Parse an index document, reporting the path of the first schema mismatch.
pub(crate) fn index_parse(yaml_text: &str) -> FlashResult<SessionIndex> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);

    serde_path_to_error::deserialize::<_, SessionIndex>(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() {
            "<root>".to_string()
        } else {
            path
        };
        FlashError::YamlDeserialization { path, source }
    })
}

pub(crate) fn index_render(index: &SessionIndex) -> FlashResult<String> {
    serde_yaml::to_string(index).map_err(FlashError::YamlSerialization)
}

/// Reads `<session_dir>/index.yaml`; `Ok(None)` when it does not exist.
pub(crate) fn read_index(session_dir: &Path) -> FlashResult<Option<SessionIndex>> {
    let path = session_dir.join(INDEX_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(FlashError::IndexRead(e)),
    };
    index_parse(&content).map(Some)
}

/// Writes `<session_dir>/index.yaml`, creating the directory if needed.
pub(crate) fn write_index(session_dir: &Path, index: &SessionIndex) -> FlashResult<()> {
    let content = index_render(index)?;
    fs::create_dir_all(session_dir).map_err(FlashError::IndexWrite)?;
    fs::write(session_dir.join(INDEX_FILENAME), content).map_err(FlashError::IndexWrite)
}
